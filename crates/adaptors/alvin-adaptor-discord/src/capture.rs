//! Per-user audio capture and utterance flushing
//!
//! Discord delivers decoded 48 kHz stereo PCM roughly every 20 ms per
//! speaking user. Each user gets an own [`UserAudioBuffer`]; a buffer is
//! flushed as one utterance when the user has been silent for the
//! configured interval, or immediately when the buffered audio reaches the
//! duration cap. The songbird event handler only appends samples - it never
//! awaits - so an in-flight API call for one user cannot delay capture for
//! another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alvin_provider_voice::{downmix_to_16k_mono, AudioData, SpeechEngine, TranscriptionConfig};
use songbird::events::context_data::VoiceTick;
use songbird::events::{Event, EventContext, EventHandler};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Utterances shorter than this are treated as noise and discarded
pub const MIN_UTTERANCE_MS: u64 = 500;

/// How often completed buffers are checked for
const SWEEP_INTERVAL_MS: u64 = 500;

/// Audio buffer for accumulating voice data from one user
#[derive(Debug)]
pub struct UserAudioBuffer {
    /// User ID
    pub user_id: u64,
    /// Accumulated PCM samples (16-bit signed, 48kHz stereo from Discord)
    pub samples: Vec<i16>,
    /// Last time audio was received
    pub last_audio: Instant,
    /// Silence duration (ms) after which the utterance is complete
    pub silence_threshold_ms: u64,
    /// Cap on buffered audio duration (ms); reaching it forces a flush
    pub max_utterance_ms: u64,
}

impl UserAudioBuffer {
    pub fn new(user_id: u64, silence_threshold_ms: u64, max_utterance_ms: u64) -> Self {
        Self {
            user_id,
            samples: Vec::new(),
            last_audio: Instant::now(),
            silence_threshold_ms,
            max_utterance_ms,
        }
    }

    /// Add audio samples to the buffer
    pub fn push_samples(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
        self.last_audio = Instant::now();
    }

    /// Duration of buffered audio in milliseconds (48kHz stereo)
    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / (48000 * 2)
    }

    /// Whether the user has stopped speaking
    pub fn has_silence(&self) -> bool {
        self.last_audio.elapsed().as_millis() as u64 > self.silence_threshold_ms
    }

    /// Whether the buffer holds enough audio to be worth transcribing
    pub fn has_enough_audio(&self) -> bool {
        self.duration_ms() >= MIN_UTTERANCE_MS
    }

    /// Whether the duration cap has been reached
    pub fn is_full(&self) -> bool {
        self.duration_ms() >= self.max_utterance_ms
    }

    /// Take the buffered audio as one 16 kHz mono utterance, clearing the
    /// buffer
    pub fn take_utterance(&mut self) -> Vec<i16> {
        let mono = downmix_to_16k_mono(&self.samples);
        self.samples.clear();
        mono
    }
}

/// Captures audio for one guild and turns completed utterances into
/// transcripts
pub struct VoiceReceiver {
    /// Guild this receiver belongs to
    pub guild_id: u64,
    buffers: parking_lot::RwLock<HashMap<u64, UserAudioBuffer>>,
    ssrc_map: parking_lot::RwLock<HashMap<u32, u64>>,
    transcript_tx: mpsc::Sender<(u64, String)>,
    stt: Arc<dyn SpeechEngine>,
    stt_config: TranscriptionConfig,
    enabled: AtomicBool,
    silence_threshold_ms: u64,
    max_utterance_ms: u64,
}

impl VoiceReceiver {
    pub fn new(
        guild_id: u64,
        stt: Arc<dyn SpeechEngine>,
        stt_config: TranscriptionConfig,
        transcript_tx: mpsc::Sender<(u64, String)>,
        silence_threshold_ms: u64,
        max_utterance_ms: u64,
    ) -> Self {
        Self {
            guild_id,
            buffers: parking_lot::RwLock::new(HashMap::new()),
            ssrc_map: parking_lot::RwLock::new(HashMap::new()),
            transcript_tx,
            stt,
            stt_config,
            enabled: AtomicBool::new(true),
            silence_threshold_ms,
            max_utterance_ms,
        }
    }

    /// Toggle capture without tearing the receiver down
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Record the ssrc -> user mapping from a speaking-state update
    pub fn note_speaker(&self, ssrc: u32, user_id: u64) {
        self.ssrc_map.write().insert(ssrc, user_id);
    }

    /// Append a tick worth of decoded audio for one source
    pub fn process_audio(&self, ssrc: u32, audio: &[i16]) {
        if !self.is_enabled() {
            return;
        }
        // Fall back to the raw ssrc until a speaking update names the user
        let user_id = self
            .ssrc_map
            .read()
            .get(&ssrc)
            .copied()
            .unwrap_or(ssrc as u64);

        let mut buffers = self.buffers.write();
        let buffer = buffers.entry(user_id).or_insert_with(|| {
            UserAudioBuffer::new(user_id, self.silence_threshold_ms, self.max_utterance_ms)
        });
        buffer.push_samples(audio);
    }

    /// Collect utterances that are complete (silence gap or full buffer)
    ///
    /// Buffers that went silent without reaching the minimum duration are
    /// discarded as noise.
    pub fn drain_completed(&self) -> Vec<(u64, Vec<i16>)> {
        let mut buffers = self.buffers.write();
        let mut completed = Vec::new();
        for (user_id, buffer) in buffers.iter_mut() {
            if buffer.is_full() || (buffer.has_silence() && buffer.has_enough_audio()) {
                completed.push((*user_id, buffer.take_utterance()));
            } else if buffer.has_silence() && !buffer.samples.is_empty() {
                debug!(user_id, "Discarding too-short utterance");
                buffer.samples.clear();
            }
        }
        completed
    }

    /// Transcribe completed utterances and forward the transcripts
    ///
    /// A failed or empty transcription drops the utterance; the user is
    /// back at idle either way.
    pub async fn check_and_transcribe(&self) {
        for (user_id, samples) in self.drain_completed() {
            let audio = AudioData::from_pcm_samples(&samples, 16000);
            match self.stt.transcribe(&audio, &self.stt_config).await {
                Ok(result) if !result.is_empty() => {
                    info!(
                        guild_id = self.guild_id,
                        user_id,
                        text = %result.text,
                        "Transcribed user speech"
                    );
                    if self.transcript_tx.send((user_id, result.text)).await.is_err() {
                        return;
                    }
                }
                Ok(_) => {
                    debug!(user_id, "No speech recognized in utterance");
                }
                Err(e) => {
                    warn!(error = %e, user_id, "Transcription failed, dropping utterance");
                }
            }
        }
    }

    /// Spawn the periodic task that flushes completed utterances
    ///
    /// Exits once capture is disabled or the pipeline side of the
    /// transcript channel is gone, dropping this task's sender so the
    /// pipeline task can finish too.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let receiver = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(SWEEP_INTERVAL_MS)).await;
                if !receiver.is_enabled() || receiver.transcript_tx.is_closed() {
                    debug!(guild_id = receiver.guild_id, "Capture stopped, sweeper exiting");
                    break;
                }
                receiver.check_and_transcribe().await;
            }
        })
    }
}

/// Songbird event handler feeding the receiver
pub struct CaptureHandler {
    pub receiver: Arc<VoiceReceiver>,
}

#[async_trait::async_trait]
impl EventHandler for CaptureHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::VoiceTick(VoiceTick { speaking, .. }) => {
                for (&ssrc, data) in speaking.iter() {
                    if let Some(audio) = &data.decoded_voice {
                        if !audio.is_empty() {
                            self.receiver.process_audio(ssrc, audio);
                        }
                    } else {
                        // DecodeMode::Decode not active - raw packets only
                        debug!(ssrc, "VoiceTick without decoded audio");
                    }
                }
            }
            EventContext::SpeakingStateUpdate(state) => {
                if let Some(user) = state.user_id {
                    debug!(ssrc = state.ssrc, user_id = user.0, "Speaking state update");
                    self.receiver.note_speaker(state.ssrc, user.0);
                }
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alvin_core::Result;
    use alvin_provider_voice::TranscriptionResult;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// One second of 48kHz stereo audio
    fn one_second() -> Vec<i16> {
        vec![100; 96000]
    }

    fn backdate(buffer: &mut UserAudioBuffer, ms: u64) {
        buffer.last_audio = Instant::now() - Duration::from_millis(ms);
    }

    struct EchoStt {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechEngine for EchoStt {
        fn name(&self) -> &str {
            "echo"
        }

        async fn transcribe(
            &self,
            audio: &AudioData,
            _config: &TranscriptionConfig,
        ) -> Result<TranscriptionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TranscriptionResult::new(format!("{} samples", audio.size() / 2)))
        }

        async fn is_ready(&self) -> bool {
            true
        }
    }

    struct FailingStt;

    #[async_trait]
    impl SpeechEngine for FailingStt {
        fn name(&self) -> &str {
            "failing"
        }

        async fn transcribe(
            &self,
            _audio: &AudioData,
            _config: &TranscriptionConfig,
        ) -> Result<TranscriptionResult> {
            Err(alvin_provider_voice::VoiceError::Transcription("boom".to_string()).into())
        }

        async fn is_ready(&self) -> bool {
            false
        }
    }

    fn test_receiver(
        stt: Arc<dyn SpeechEngine>,
    ) -> (Arc<VoiceReceiver>, mpsc::Receiver<(u64, String)>) {
        let (tx, rx) = mpsc::channel(8);
        let receiver = Arc::new(VoiceReceiver::new(
            1,
            stt,
            TranscriptionConfig::default(),
            tx,
            1500,
            6000,
        ));
        (receiver, rx)
    }

    #[test]
    fn test_buffer_keeps_samples_in_order() {
        let mut buffer = UserAudioBuffer::new(7, 1500, 6000);
        buffer.push_samples(&[1, 2, 3, 4]);
        buffer.push_samples(&[5, 6]);
        assert_eq!(buffer.samples, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_buffer_silence_and_minimum() {
        let mut buffer = UserAudioBuffer::new(7, 1500, 6000);
        buffer.push_samples(&one_second());
        assert!(!buffer.has_silence());
        assert!(buffer.has_enough_audio());
        assert!(!buffer.is_full());

        backdate(&mut buffer, 2000);
        assert!(buffer.has_silence());
    }

    #[test]
    fn test_buffer_full_at_cap() {
        let mut buffer = UserAudioBuffer::new(7, 1500, 3000);
        buffer.push_samples(&one_second());
        buffer.push_samples(&one_second());
        assert!(!buffer.is_full());
        buffer.push_samples(&one_second());
        assert!(buffer.is_full());
    }

    #[test]
    fn test_take_utterance_downmixes_and_clears() {
        let mut buffer = UserAudioBuffer::new(7, 1500, 6000);
        buffer.push_samples(&one_second());
        let mono = buffer.take_utterance();
        // 96000 stereo samples -> 48000 mono -> 16000 after decimation
        assert_eq!(mono.len(), 16000);
        assert!(buffer.samples.is_empty());
        assert_eq!(buffer.duration_ms(), 0);
    }

    #[tokio::test]
    async fn test_gapless_frames_flush_as_one_utterance() {
        let stt = Arc::new(EchoStt { calls: AtomicUsize::new(0) });
        let (receiver, mut rx) = test_receiver(stt.clone());

        // frames arrive back to back with no silence gap
        for _ in 0..3 {
            receiver.process_audio(10, &one_second()[..32000]);
        }
        // nothing completes while the user is still speaking
        assert!(receiver.drain_completed().is_empty());

        {
            let mut buffers = receiver.buffers.write();
            backdate(buffers.get_mut(&10).unwrap(), 2000);
        }
        receiver.check_and_transcribe().await;

        let (user_id, text) = rx.try_recv().unwrap();
        assert_eq!(user_id, 10);
        // all 96000 stereo samples survived into one 16k mono utterance
        assert_eq!(text, "16000 samples");
        assert_eq!(stt.calls.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_gap_splits_into_two_utterances() {
        let stt = Arc::new(EchoStt { calls: AtomicUsize::new(0) });
        let (receiver, mut rx) = test_receiver(stt.clone());

        receiver.process_audio(10, &one_second());
        {
            let mut buffers = receiver.buffers.write();
            backdate(buffers.get_mut(&10).unwrap(), 2000);
        }
        receiver.check_and_transcribe().await;

        receiver.process_audio(10, &one_second()[..48000]);
        {
            let mut buffers = receiver.buffers.write();
            backdate(buffers.get_mut(&10).unwrap(), 2000);
        }
        receiver.check_and_transcribe().await;

        assert_eq!(rx.try_recv().unwrap().1, "16000 samples");
        assert_eq!(rx.try_recv().unwrap().1, "8000 samples");
        assert_eq!(stt.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_noise_is_discarded() {
        let stt = Arc::new(EchoStt { calls: AtomicUsize::new(0) });
        let (receiver, mut rx) = test_receiver(stt.clone());

        // 100ms of audio, below MIN_UTTERANCE_MS
        receiver.process_audio(10, &one_second()[..9600]);
        {
            let mut buffers = receiver.buffers.write();
            backdate(buffers.get_mut(&10).unwrap(), 2000);
        }
        receiver.check_and_transcribe().await;

        assert!(rx.try_recv().is_err());
        assert_eq!(stt.calls.load(Ordering::SeqCst), 0);
        // buffer was cleared, user is back at idle
        assert!(receiver.buffers.read().get(&10).unwrap().samples.is_empty());
    }

    #[tokio::test]
    async fn test_failed_transcription_drops_utterance() {
        let (receiver, mut rx) = test_receiver(Arc::new(FailingStt));

        receiver.process_audio(10, &one_second());
        {
            let mut buffers = receiver.buffers.write();
            backdate(buffers.get_mut(&10).unwrap(), 2000);
        }
        receiver.check_and_transcribe().await;

        // no transcript, no crash, buffer back at idle
        assert!(rx.try_recv().is_err());
        assert!(receiver.buffers.read().get(&10).unwrap().samples.is_empty());
    }

    #[tokio::test]
    async fn test_buffers_are_per_user() {
        let stt = Arc::new(EchoStt { calls: AtomicUsize::new(0) });
        let (receiver, mut rx) = test_receiver(stt);

        receiver.process_audio(10, &one_second());
        receiver.process_audio(20, &one_second()[..48000]);
        {
            let mut buffers = receiver.buffers.write();
            backdate(buffers.get_mut(&10).unwrap(), 2000);
        }
        receiver.check_and_transcribe().await;

        // only user 10 flushed; user 20 is still speaking
        let (user_id, _) = rx.try_recv().unwrap();
        assert_eq!(user_id, 10);
        assert!(rx.try_recv().is_err());
        assert!(!receiver.buffers.read().get(&20).unwrap().samples.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_receiver_ignores_audio() {
        let stt = Arc::new(EchoStt { calls: AtomicUsize::new(0) });
        let (receiver, _rx) = test_receiver(stt);

        receiver.set_enabled(false);
        receiver.process_audio(10, &one_second());
        assert!(receiver.buffers.read().is_empty());
    }

    #[tokio::test]
    async fn test_ssrc_mapping() {
        let stt = Arc::new(EchoStt { calls: AtomicUsize::new(0) });
        let (receiver, _rx) = test_receiver(stt);

        receiver.note_speaker(555, 777);
        receiver.process_audio(555, &one_second()[..9600]);
        assert!(receiver.buffers.read().contains_key(&777));

        // unmapped ssrc falls back to the raw value
        receiver.process_audio(556, &one_second()[..9600]);
        assert!(receiver.buffers.read().contains_key(&556));
    }
}
