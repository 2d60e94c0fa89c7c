//! Chunked PCM delivery to the host's streaming sink.

use tokio_util::sync::CancellationToken;

use crate::SynthesisResult;

/// Bytes per sink write.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl AudioFormat {
    pub fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            bits_per_sample: 16,
            channels: 1,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Sink rejected audio format: {0}")]
    FormatRejected(String),
    #[error("Sink rejected audio chunk: {0}")]
    WriteRejected(String),
}

/// The host side of a synthesis call.
///
/// A call announces the format once, writes zero or more chunks and then
/// ends with exactly one of `done` or `error`, unless it is cancelled, in
/// which case it simply stops.
#[async_trait::async_trait]
pub trait AudioSink: Send {
    async fn start(&mut self, format: AudioFormat) -> Result<(), SinkError>;

    async fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError>;

    async fn done(&mut self);

    /// Generic failure signal; no further audio follows.
    async fn error(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Completed { bytes: usize, chunks: usize },
    Cancelled { bytes_written: usize },
}

/// Little-endian byte pairs for 16-bit samples.
pub fn pcm_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Streams a finished sample buffer to a sink in fixed-size chunks.
#[derive(Debug, Clone, Copy)]
pub struct AudioDelivery {
    chunk_size: usize,
}

impl Default for AudioDelivery {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl AudioDelivery {
    /// `chunk_size` is rounded down to whole samples, minimum one sample.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: (chunk_size & !1).max(2),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Announce the format, write every chunk, then signal `done`.
    ///
    /// `cancel` is checked before each chunk, so a cancellation stops the
    /// stream within one chunk. A rejected format or chunk signals `error`
    /// to the sink and is returned; nothing is retried.
    pub async fn deliver<S>(
        &self,
        audio: &SynthesisResult,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, SinkError>
    where
        S: AudioSink + ?Sized,
    {
        if cancel.is_cancelled() {
            return Ok(DeliveryOutcome::Cancelled { bytes_written: 0 });
        }

        if let Err(e) = sink.start(AudioFormat::pcm16_mono(audio.sample_rate)).await {
            log::error!("Sink refused format: {e}");
            sink.error().await;
            return Err(e);
        }

        let bytes = pcm_to_le_bytes(&audio.samples);
        let mut written = 0usize;
        let mut chunks = 0usize;

        for chunk in bytes.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                log::debug!("Delivery cancelled after {written} of {} bytes", bytes.len());
                return Ok(DeliveryOutcome::Cancelled {
                    bytes_written: written,
                });
            }
            if let Err(e) = sink.write(chunk).await {
                log::warn!("Sink rejected chunk {chunks} after {written} bytes: {e}");
                sink.error().await;
                return Err(e);
            }
            written += chunk.len();
            chunks += 1;
        }

        sink.done().await;
        Ok(DeliveryOutcome::Completed {
            bytes: written,
            chunks,
        })
    }
}
