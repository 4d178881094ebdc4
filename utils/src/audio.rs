use std::collections::VecDeque;

use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Chunk size used when resampling decoded playback audio.
pub const DECODE_CHUNK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("audio payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("audio payload ends with a partial sample ({0} bytes)")]
    TruncatedSample(usize),
    #[error("failed to resample audio: {0}")]
    Resample(String),
}

/// A wire-ready block of audio: base64 PCM16 little-endian at `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBlock {
    data: String,
    sample_rate: u32,
}

impl EncodedBlock {
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn into_data(self) -> String {
        self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Planar decoded audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wraps mono samples, duplicating them across `channel_count` channels.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32, channel_count: usize) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = Vec::with_capacity(channel_count);
        for _ in 1..channel_count {
            channels.push(samples.clone());
        }
        channels.push(samples);
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples of channel `index`, clamped to the last channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        let index = index.min(self.channels.len().saturating_sub(1));
        self.channels.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of sample frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Creates a new ring buffer on the heap for shared audio data.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Encodes mono f32 samples captured at `source_rate` into a wire block.
/// Empty input produces an empty block.
pub fn encode(samples: &[f32], source_rate: u32) -> EncodedBlock {
    EncodedBlock {
        data: encode_f32(samples),
        sample_rate: source_rate,
    }
}

/// Encodes a slice of f32 samples into a base64 PCM16 string.
pub fn encode_f32(pcm32: &[f32]) -> String {
    if pcm32.is_empty() {
        return String::new();
    }
    base64::engine::general_purpose::STANDARD.encode(pcm32.to_binary())
}

/// Decodes a base64 PCM16 payload into f32 samples in `[-1.0, 1.0]`.
pub fn decode_f32(base64_fragment: &str) -> Result<Vec<f32>, CodecError> {
    let pcm16 = base64::engine::general_purpose::STANDARD.decode(base64_fragment)?;
    if pcm16.len() % 2 != 0 {
        return Err(CodecError::TruncatedSample(pcm16.len()));
    }
    Ok(pcm16
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect())
}

/// One-shot decode of a wire block into a playable buffer.
///
/// Builds a fresh resampler when the rates differ and flushes it; streaming
/// callers should hold a [`Decoder`] instead so no audio is lost between
/// blocks.
pub fn decode(
    base64_fragment: &str,
    source_rate: u32,
    target_rate: u32,
    channel_count: usize,
) -> Result<AudioBuffer, CodecError> {
    let mut decoder = Decoder::new(source_rate, target_rate, channel_count)?;
    let mut samples = decoder.process(decode_f32(base64_fragment)?)?;
    samples.extend(decoder.drain()?);
    Ok(AudioBuffer::from_mono(samples, target_rate, channel_count))
}

/// Stateful decoder for a stream of wire blocks at a fixed source rate.
///
/// When resampling, input is fed to the resampler in whole chunks only. The
/// remainder of each block is carried into the next one, so consecutive
/// blocks join without a gap; [`Decoder::flush`] plays out the carry at the
/// end of a stream.
pub struct Decoder {
    source_rate: u32,
    target_rate: u32,
    channel_count: usize,
    resampler: Option<FastFixedIn<f32>>,
    carry: VecDeque<f32>,
    /// Output frames still owed to the resampler's delay line.
    delay: usize,
    frames_in: usize,
    frames_out: usize,
}

impl Decoder {
    pub fn new(source_rate: u32, target_rate: u32, channel_count: usize) -> Result<Self, CodecError> {
        let resampler = if source_rate != target_rate {
            let resampler = create_resampler(source_rate as f64, target_rate as f64, DECODE_CHUNK_SIZE)
                .map_err(|e| CodecError::Resample(e.to_string()))?;
            Some(resampler)
        } else {
            None
        };
        let delay = resampler.as_ref().map_or(0, |r| r.output_delay());
        Ok(Self {
            source_rate,
            target_rate,
            channel_count,
            resampler,
            carry: VecDeque::with_capacity(DECODE_CHUNK_SIZE * 2),
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Input samples waiting for a full resampler chunk.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    pub fn decode(&mut self, base64_fragment: &str) -> Result<AudioBuffer, CodecError> {
        let samples = decode_f32(base64_fragment)?;
        let samples = self.process(samples)?;
        Ok(AudioBuffer::from_mono(samples, self.target_rate, self.channel_count))
    }

    /// Plays out the carried input and the resampler's delay line, then
    /// starts a fresh stream.
    pub fn flush(&mut self) -> Result<AudioBuffer, CodecError> {
        let samples = self.drain()?;
        Ok(AudioBuffer::from_mono(samples, self.target_rate, self.channel_count))
    }

    fn process(&mut self, samples: Vec<f32>) -> Result<Vec<f32>, CodecError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples);
        };
        self.carry.extend(samples);
        let mut out = Vec::new();
        loop {
            let chunk_size = resampler.input_frames_next();
            if self.carry.len() < chunk_size {
                break;
            }
            let chunk: Vec<f32> = self.carry.drain(..chunk_size).collect();
            let resampled = resampler
                .process(&[chunk.as_slice()], None)
                .map_err(|e| CodecError::Resample(e.to_string()))?;
            self.frames_in += chunk_size;
            if let Some(channel) = resampled.first() {
                out.extend_from_slice(channel);
            }
        }
        let skip = self.delay.min(out.len());
        self.delay -= skip;
        out.drain(..skip);
        self.frames_out += out.len();
        Ok(out)
    }

    fn drain(&mut self) -> Result<Vec<f32>, CodecError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        if self.frames_in == 0 && self.carry.is_empty() {
            return Ok(Vec::new());
        }
        let rest: Vec<f32> = self.carry.drain(..).collect();
        self.frames_in += rest.len();
        let ratio = self.target_rate as f64 / self.source_rate as f64;
        let expected = (self.frames_in as f64 * ratio).round() as usize;

        let wave_in: [&[f32]; 1] = [rest.as_slice()];
        let mut out = Vec::new();
        let partial = resampler
            .process_partial(Some(&wave_in[..]), None)
            .map_err(|e| CodecError::Resample(e.to_string()))?;
        out.extend(partial.into_iter().next().unwrap_or_default());
        // the delay line still holds the tail of the stream
        while self.frames_out + out.len().saturating_sub(self.delay) < expected {
            let tail = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| CodecError::Resample(e.to_string()))?;
            match tail.into_iter().next() {
                Some(channel) if !channel.is_empty() => out.extend(channel),
                _ => break,
            }
        }
        let skip = self.delay.min(out.len());
        out.drain(..skip);
        out.truncate(expected.saturating_sub(self.frames_out));

        resampler.reset();
        self.delay = resampler.output_delay();
        self.frames_in = 0;
        self.frames_out = 0;
        Ok(out)
    }
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Downmixes interleaved frames to mono by averaging the channels.
pub fn downmix(data: &[f32], channel_count: usize) -> Vec<f32> {
    if channel_count <= 1 {
        return data.to_vec();
    }
    data.chunks(channel_count)
        .map(|c| c.iter().sum::<f32>() / channel_count as f32)
        .collect()
}

/// A trait for converting audio sample types to a binary representation (Vec<u8>).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| {
                let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                v.to_le_bytes()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_empty_input() {
        let block = encode(&[], 16_000);
        assert!(block.is_empty());
        assert_eq!(block.sample_rate(), 16_000);

        let buffer = decode("", 24_000, 24_000, 1).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration(), 0.0);
    }

    #[test]
    fn test_encode_is_little_endian_pcm16() {
        let block = encode(&[0.0, 0.5, -1.0], 16_000);
        let bytes = base64::engine::general_purpose::STANDARD.decode(block.data()).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x40, 0x00, 0x80]);
    }

    #[test]
    fn test_encode_clamps_out_of_range_samples() {
        let pcm16 = convert_f32_to_i16(&[1.5, -2.0]);
        assert_eq!(pcm16, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(matches!(decode_f32("not base64!"), Err(CodecError::InvalidBase64(_))));
        // three bytes: one full sample and a dangling byte
        let odd = base64::engine::general_purpose::STANDARD.encode([0u8, 0, 1]);
        assert!(matches!(decode_f32(&odd), Err(CodecError::TruncatedSample(3))));
    }

    #[test]
    fn test_decode_duration_and_channels() {
        let samples = vec![0.25f32; 2400];
        let block = encode(&samples, 24_000);
        let buffer = decode(block.data(), 24_000, 24_000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2400);
        assert!((buffer.duration() - 0.1).abs() < 1e-9);
        assert!((buffer.channel(1)[0] - 0.25).abs() < 1e-4);
        // out-of-range channel indexes fall back to the last channel
        assert_eq!(buffer.channel(5).len(), 2400);
    }

    #[test]
    fn test_decoder_resamples_to_target_rate() {
        let samples = vec![0.1f32; 4800];
        let block = encode(&samples, 24_000);
        let mut decoder = Decoder::new(24_000, 48_000, 1).unwrap();
        let head = decoder.decode(block.data()).unwrap();
        let tail = decoder.flush().unwrap();
        assert_eq!(head.sample_rate(), 48_000);
        assert_eq!(head.frames() + tail.frames(), 9600);
        assert_eq!(decoder.pending(), 0);

        let buffer = decode(block.data(), 24_000, 48_000, 1).unwrap();
        assert_eq!(buffer.frames(), 9600);
        assert!((buffer.duration() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_consecutive_blocks_join_without_gaps() {
        let block = encode(&[0.5; 2400], 24_000);
        let mut decoder = Decoder::new(24_000, 48_000, 1).unwrap();
        let mut joined = Vec::new();
        for _ in 0..3 {
            let buffer = decoder.decode(block.data()).unwrap();
            joined.extend_from_slice(buffer.channel(0));
            assert!(decoder.pending() < DECODE_CHUNK_SIZE);
        }
        // only the very start of the stream sees the resampler warming up
        let deviating: Vec<(usize, f32)> = joined
            .iter()
            .copied()
            .enumerate()
            .skip(64)
            .filter(|(_, v)| (v - 0.5).abs() > 1e-3)
            .collect();
        assert!(deviating.is_empty(), "{:?}", &deviating[..deviating.len().min(8)]);
        assert!(joined.len() > 4800 * 2);

        let tail = decoder.flush().unwrap();
        assert_eq!(joined.len() + tail.frames(), 14_400);
        // the next stream starts from a clean resampler
        let next = decoder.decode(block.data()).unwrap();
        assert!(next.frames() > 0);
    }

    #[test]
    fn test_flush_without_resampling_is_empty() {
        let mut decoder = Decoder::new(24_000, 24_000, 1).unwrap();
        let buffer = decoder.decode(encode(&[0.2; 100], 24_000).data()).unwrap();
        assert_eq!(buffer.frames(), 100);
        assert!(decoder.flush().unwrap().is_empty());
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.3, 0.2], 1), vec![0.3, 0.2]);
    }
}
