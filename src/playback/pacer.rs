//! Real-time pacing of a byte source
//!
//! A chunk is released only once the wall clock has caught up with the
//! audio it contains: after emitting `n` bytes total, at least
//! `n * 8 / bitrate` seconds have elapsed since the first read.

use bytes::Bytes;
use futures_util::Stream;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

/// Throttles a finite byte source to its playback bitrate
pub struct Pacer<R> {
    source: R,
    bits_per_second: u64,
    buffer: Vec<u8>,
    emitted: u64,
    started: Option<Instant>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> Pacer<R> {
    pub fn new(source: R, bits_per_second: u32, chunk_size: usize) -> Self {
        Self {
            source,
            bits_per_second: u64::from(bits_per_second.max(1)),
            buffer: vec![0u8; chunk_size.max(1)],
            emitted: 0,
            started: None,
            finished: false,
        }
    }

    /// Next paced chunk, or `None` once the source is exhausted.
    ///
    /// Every chunk except possibly the last is exactly `chunk_size` bytes.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        let started = *self.started.get_or_insert_with(Instant::now);

        let len = self.fill().await?;
        if len == 0 {
            self.finished = true;
            return Ok(None);
        }

        self.emitted += len as u64;
        tokio::time::sleep_until(started + self.playback_time(self.emitted)).await;

        Ok(Some(Bytes::copy_from_slice(&self.buffer[..len])))
    }

    /// Total bytes released so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Playback duration of `bytes` at this pacer's bitrate, rounded up
    pub fn playback_time(&self, bytes: u64) -> Duration {
        let bits = u128::from(bytes) * 8 * 1_000_000_000;
        let rate = u128::from(self.bits_per_second);
        let nanos = bits.div_ceil(rate);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Read until the buffer is full or the source ends
    async fn fill(&mut self) -> io::Result<usize> {
        let mut len = 0;
        while len < self.buffer.len() {
            let n = self.source.read(&mut self.buffer[len..]).await?;
            if n == 0 {
                break;
            }
            len += n;
        }
        Ok(len)
    }

    /// Lazy sequence of paced chunks
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> {
        futures_util::stream::unfold(self, |mut pacer| async move {
            match pacer.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), pacer)),
                Ok(None) => None,
                Err(e) => {
                    pacer.finished = true;
                    Some((Err(e), pacer))
                }
            }
        })
    }
}
