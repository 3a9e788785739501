//! WAV emission for transcription windows.
//!
//! Windows leave the core as standard RIFF/WAVE files (44-byte header,
//! mono, 16 kHz, 16-bit PCM) at unique temp paths. Ownership of the file
//! transfers with the window task; whoever consumes it deletes it.
//!
//! Also hosts the synthetic PCM generators used by tests and benches.

use crate::defaults::{BYTES_PER_SEC, SAMPLE_RATE};
use crate::error::{Result, StreamscribeError};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// The fixed output format of every emitted window.
pub fn window_spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Writes PCM bytes as a WAV file at a unique path inside `dir`.
///
/// `pcm` must hold whole little-endian 16-bit samples; a trailing half
/// sample is truncated rather than written.
pub fn write_window_wav(dir: &Path, pcm: &[u8]) -> Result<PathBuf> {
    let temp = tempfile::Builder::new()
        .prefix("window-")
        .suffix(".wav")
        .tempfile_in(dir)
        .map_err(|e| StreamscribeError::WavWrite {
            message: format!("could not create temp file in {}: {}", dir.display(), e),
        })?;
    let (file, path) = temp.keep().map_err(|e| StreamscribeError::WavWrite {
        message: format!("could not persist temp file: {}", e),
    })?;

    let mut writer =
        WavWriter::new(BufWriter::new(file), window_spec()).map_err(|e| {
            StreamscribeError::WavWrite {
                message: e.to_string(),
            }
        })?;

    for pair in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        writer
            .write_sample(sample)
            .map_err(|e| StreamscribeError::WavWrite {
                message: e.to_string(),
            })?;
    }
    writer.finalize().map_err(|e| StreamscribeError::WavWrite {
        message: e.to_string(),
    })?;

    Ok(path)
}

/// Reads all samples from a 16-bit WAV file.
pub fn read_wav_samples(path: &Path) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::open(path).map_err(|e| StreamscribeError::WavRead {
        message: format!("{}: {}", path.display(), e),
    })?;
    reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StreamscribeError::WavRead {
            message: format!("{}: {}", path.display(), e),
        })
}

/// PCM bytes for `duration_sec` of a sine tone at the given normalized
/// amplitude (1.0 = full scale).
pub fn sine_pcm(freq_hz: f64, amplitude: f64, duration_sec: f64) -> Vec<u8> {
    let samples = (duration_sec * SAMPLE_RATE as f64).round() as usize;
    (0..samples)
        .flat_map(|i| {
            let phase = 2.0 * std::f64::consts::PI * freq_hz * i as f64 / SAMPLE_RATE as f64;
            let value = (phase.sin() * amplitude * i16::MAX as f64) as i16;
            value.to_le_bytes()
        })
        .collect()
}

/// PCM bytes for `duration_sec` of digital silence.
pub fn silence_pcm(duration_sec: f64) -> Vec<u8> {
    vec![0u8; ((duration_sec * BYTES_PER_SEC as f64).round() as usize) & !1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_wav_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let pcm = sine_pcm(440.0, 0.1, 0.05);

        let path = write_window_wav(dir.path(), &pcm).unwrap();
        assert!(path.exists());
        assert!(path.extension().is_some_and(|e| e == "wav"));

        let samples = read_wav_samples(&path).unwrap();
        assert_eq!(samples.len(), pcm.len() / 2);
        let expected: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn header_declares_window_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_window_wav(dir.path(), &silence_pcm(0.01)).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, SampleFormat::Int);
    }

    #[test]
    fn file_size_is_header_plus_even_data() {
        let dir = tempfile::tempdir().unwrap();
        let pcm = silence_pcm(0.02); // 640 bytes
        let path = write_window_wav(dir.path(), &pcm).unwrap();

        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size, 44 + pcm.len() as u64);
    }

    #[test]
    fn trailing_half_sample_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let mut pcm = silence_pcm(0.01);
        pcm.push(0x7f); // stray half sample

        let path = write_window_wav(dir.path(), &pcm).unwrap();
        let samples = read_wav_samples(&path).unwrap();
        assert_eq!(samples.len(), (pcm.len() - 1) / 2);
    }

    #[test]
    fn unique_paths_for_consecutive_windows() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_window_wav(dir.path(), &silence_pcm(0.01)).unwrap();
        let b = write_window_wav(dir.path(), &silence_pcm(0.01)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn write_to_missing_dir_fails() {
        let result = write_window_wav(Path::new("/nonexistent/streamscribe"), &silence_pcm(0.01));
        assert!(matches!(result, Err(StreamscribeError::WavWrite { .. })));
    }

    #[test]
    fn read_missing_file_fails() {
        let result = read_wav_samples(Path::new("/nonexistent/window.wav"));
        assert!(matches!(result, Err(StreamscribeError::WavRead { .. })));
    }

    #[test]
    fn sine_pcm_has_expected_level() {
        let pcm = sine_pcm(440.0, 0.1, 0.1);
        let level = crate::audio::vad::rms_bytes(&pcm);
        // RMS of a sine is amplitude / sqrt(2).
        assert!((level - 0.1 / std::f64::consts::SQRT_2 as f32).abs() < 0.005);
    }

    #[test]
    fn silence_pcm_is_flat() {
        let pcm = silence_pcm(0.1);
        assert!(pcm.iter().all(|&b| b == 0));
        assert_eq!(pcm.len() % 2, 0);
    }
}
