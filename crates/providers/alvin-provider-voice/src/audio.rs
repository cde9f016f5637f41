//! Audio sample conversion and text segmentation helpers

/// Wrap raw PCM audio data in a minimal WAV header
///
/// The Whisper endpoint rejects bare PCM, so flushed utterances are shipped
/// as WAV.
pub fn wrap_pcm_in_wav(pcm_data: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let byte_rate = sample_rate * (channels as u32) * (bits_per_sample as u32) / 8;
    let block_align = channels * bits_per_sample / 8;
    let data_size = pcm_data.len() as u32;
    let file_size = 36 + data_size;

    let mut wav = Vec::with_capacity(44 + pcm_data.len());

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt subchunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // Subchunk1Size (16 for PCM)
    wav.extend_from_slice(&1u16.to_le_bytes()); // AudioFormat (1 = PCM)
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data subchunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    wav.extend_from_slice(pcm_data);

    wav
}

/// Convert 48 kHz stereo samples (Discord's decode format) to 16 kHz mono
pub fn downmix_to_16k_mono(stereo_48k: &[i16]) -> Vec<i16> {
    // Average stereo channels
    let mono: Vec<i16> = stereo_48k
        .chunks(2)
        .map(|chunk| {
            if chunk.len() == 2 {
                ((chunk[0] as i32 + chunk[1] as i32) / 2) as i16
            } else {
                chunk[0]
            }
        })
        .collect();

    // Downsample 48kHz -> 16kHz (factor of 3)
    mono.iter().step_by(3).copied().collect()
}

/// Split text into sentences, keeping the terminating punctuation
pub fn segment_sentences(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let segment = text[start..end].trim();
            if !segment.is_empty() {
                segments.push(segment.to_string());
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        segments.push(tail.to_string());
    }
    segments
}

/// Group sentences into synthesis chunks of `chunk_size` sentences each
///
/// Keeping chunks short lets playback of the first chunk start while the
/// next one is still being synthesized.
pub fn chunk_sentences(text: &str, chunk_size: usize) -> Vec<String> {
    segment_sentences(text)
        .chunks(chunk_size.max(1))
        .map(|group| group.join(" "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_layout() {
        let pcm = vec![0u8; 3200];
        let wav = wrap_pcm_in_wav(&pcm, 16000, 1, 16);

        assert_eq!(wav.len(), 44 + 3200);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        // sample rate field
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16000);
        // byte rate = 16000 * 1 * 16 / 8
        assert_eq!(u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]), 32000);
        // data size
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 3200);
    }

    #[test]
    fn test_downmix_halves_and_decimates() {
        // 6 stereo sample pairs -> 6 mono samples -> 2 after decimation by 3
        let stereo: Vec<i16> = vec![100, 200, 0, 0, 0, 0, 300, 500, 0, 0, 0, 0];
        let mono = downmix_to_16k_mono(&stereo);
        assert_eq!(mono, vec![150, 400]);
    }

    #[test]
    fn test_segment_sentences() {
        let segments = segment_sentences("Hello there! How are you? Fine");
        assert_eq!(segments, vec!["Hello there!", "How are you?", "Fine"]);

        assert!(segment_sentences("").is_empty());
        assert_eq!(segment_sentences("No terminator"), vec!["No terminator"]);
    }

    #[test]
    fn test_chunk_sentences_pairs() {
        let chunks = chunk_sentences("One. Two. Three. Four. Five.", 2);
        assert_eq!(chunks, vec!["One. Two.", "Three. Four.", "Five."]);
    }
}
