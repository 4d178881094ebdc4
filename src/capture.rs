use std::collections::VecDeque;

use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc;
use voice_session_types::audio::INPUT_SAMPLE_RATE;
use voice_session_utils::audio::{create_resampler, encode, CodecError, EncodedBlock};

use crate::client::AudioSender;

/// Samples per outbound frame, at the endpoint's input rate.
pub const FRAME_SIZE: usize = 4096;
/// Samples fed to the resampler per call, at the device rate.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Device callbacks that may be waiting for the capture task.
pub const CAPTURE_QUEUE: usize = 64;

/// Cuts a continuous sample stream into frames of exactly `frame_size`.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Appends `samples` and returns every frame completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.frame_size {
                frames.push(std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size)));
            }
        }
        frames
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Turns raw mono device samples into encoded 16 kHz frames.
pub struct CapturePipeline {
    resampler: Option<FastFixedIn<f32>>,
    buffer: VecDeque<f32>,
    frames: FrameAssembler,
}

impl CapturePipeline {
    pub fn new(device_rate: u32) -> Result<Self, CodecError> {
        let resampler = if device_rate != INPUT_SAMPLE_RATE {
            let resampler = create_resampler(device_rate as f64, INPUT_SAMPLE_RATE as f64, INPUT_CHUNK_SIZE)
                .map_err(|e| CodecError::Resample(e.to_string()))?;
            Some(resampler)
        } else {
            None
        };
        Ok(Self {
            resampler,
            buffer: VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2),
            frames: FrameAssembler::new(FRAME_SIZE),
        })
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<EncodedBlock> {
        let resampled = match self.resampler.as_mut() {
            None => samples.to_vec(),
            Some(resampler) => {
                self.buffer.extend(samples.iter().copied());
                let mut resampled: Vec<f32> = vec![];
                while self.buffer.len() >= INPUT_CHUNK_SIZE {
                    let audio: Vec<f32> = self.buffer.drain(..INPUT_CHUNK_SIZE).collect();
                    match resampler.process(&[audio.as_slice()], None) {
                        Ok(resamples) => {
                            if let Some(resamples) = resamples.first() {
                                resampled.extend(resamples.iter().cloned());
                            }
                        }
                        Err(e) => tracing::warn!("failed to resample input: {}", e),
                    }
                }
                resampled
            }
        };
        self.frames
            .push(&resampled)
            .iter()
            .map(|frame| encode(frame, INPUT_SAMPLE_RATE))
            .collect()
    }
}

/// Forwards device samples through `pipeline` to `sender` until the device
/// side hangs up.
pub(crate) fn spawn(
    mut pipeline: CapturePipeline,
    mut samples: mpsc::Receiver<Vec<f32>>,
    sender: AudioSender,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = samples.recv().await {
            for block in pipeline.process(&chunk) {
                sender.send(block);
            }
        }
        tracing::debug!("capture stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_emits_exact_frames() {
        let mut frames = FrameAssembler::new(4);
        assert!(frames.push(&[1.0, 2.0, 3.0]).is_empty());
        let out = frames.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(out, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(frames.pending_len(), 1);
        assert!(frames.push(&[]).is_empty());
    }

    #[test]
    fn test_native_rate_passes_through() {
        let mut pipeline = CapturePipeline::new(INPUT_SAMPLE_RATE).unwrap();
        assert!(pipeline.process(&[0.0; 4000]).is_empty());
        let blocks = pipeline.process(&[0.0; 200]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sample_rate(), INPUT_SAMPLE_RATE);
        // 4096 PCM16 samples, base64 encoded
        assert_eq!(blocks[0].data().len(), (FRAME_SIZE * 2).div_ceil(3) * 4);
    }

    #[test]
    fn test_device_rate_is_resampled() {
        let mut pipeline = CapturePipeline::new(48_000).unwrap();
        // one second at 48 kHz is 16000 samples at the input rate: three full frames
        let mut blocks = Vec::new();
        for _ in 0..48 {
            blocks.extend(pipeline.process(&[0.1; 1000]));
        }
        assert_eq!(blocks.len(), 3);
    }
}
