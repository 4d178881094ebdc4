use tokio::sync::mpsc;
use voice_session_types::audio::{parse_pcm_rate, OUTPUT_SAMPLE_RATE};
use voice_session_types::Blob;
use voice_session_utils::audio::{AudioBuffer, CodecError, Decoder};

/// Result of decoding one inbound audio chunk, tagged with the audio epoch
/// it was requested in.
#[derive(Debug)]
pub(crate) struct Decoded {
    pub epoch: u64,
    pub result: Result<AudioBuffer, CodecError>,
}

enum Request {
    Chunk { epoch: u64, blob: Blob },
    /// End of an audio stream: play out what the resampler still holds.
    Flush { epoch: u64 },
}

/// Decodes inbound chunks off the session task, one at a time and in the
/// order they were submitted.
pub(crate) struct DecodeWorker {
    tx: mpsc::UnboundedSender<Request>,
    handle: tokio::task::JoinHandle<()>,
}

impl DecodeWorker {
    pub(crate) fn spawn<T>(target_rate: u32, channel_count: usize, results: mpsc::UnboundedSender<T>) -> Self
    where
        T: From<Decoded> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        let handle = tokio::spawn(async move {
            let mut decoder: Option<Decoder> = None;
            let mut current_epoch = 0;
            while let Some(request) = rx.recv().await {
                let epoch = match &request {
                    Request::Chunk { epoch, .. } | Request::Flush { epoch } => *epoch,
                };
                if epoch != current_epoch {
                    // input carried over from an interrupted turn is never played
                    decoder = None;
                    current_epoch = epoch;
                }
                let result = match request {
                    Request::Chunk { blob, .. } => {
                        let source_rate = parse_pcm_rate(blob.mime_type()).unwrap_or(OUTPUT_SAMPLE_RATE);
                        decode_with(&mut decoder, source_rate, target_rate, channel_count, blob.data())
                    }
                    Request::Flush { .. } => match decoder.as_mut() {
                        Some(decoder) => decoder.flush(),
                        None => continue,
                    },
                };
                if matches!(&result, Ok(buffer) if buffer.is_empty()) {
                    continue;
                }
                if results.send(Decoded { epoch, result }.into()).is_err() {
                    break;
                }
            }
            tracing::debug!("decode worker stopped");
        });
        Self { tx, handle }
    }

    pub(crate) fn submit(&self, epoch: u64, blob: Blob) {
        if self.tx.send(Request::Chunk { epoch, blob }).is_err() {
            tracing::warn!("decode worker is gone, dropping audio chunk");
        }
    }

    /// Marks the end of the current turn's audio.
    pub(crate) fn flush(&self, epoch: u64) {
        if self.tx.send(Request::Flush { epoch }).is_err() {
            tracing::debug!("decode worker is gone, nothing to flush");
        }
    }

    pub(crate) fn stop(self) {
        self.handle.abort();
    }
}

// Reuses the resampler while the source rate stays the same.
fn decode_with(
    decoder: &mut Option<Decoder>,
    source_rate: u32,
    target_rate: u32,
    channel_count: usize,
    data: &str,
) -> Result<AudioBuffer, CodecError> {
    let reusable = decoder.as_ref().is_some_and(|d| d.source_rate() == source_rate);
    if !reusable {
        if decoder.is_some() {
            tracing::debug!(source_rate, "audio rate changed, restarting decoder");
        }
        *decoder = Some(Decoder::new(source_rate, target_rate, channel_count)?);
    }
    match decoder.as_mut() {
        Some(decoder) => decoder.decode(data),
        None => Err(CodecError::Resample("decoder unavailable".to_string())),
    }
}
