//! Bounded byte pipes between chained stages.
//!
//! Every pipe has exactly one writer (the upstream stage's stdout copier) and
//! one reader (the downstream stage's stdin feeder).
//!
//! ```text
//!   PipeWriter ──▶ [VecDeque<u8>, capacity N] ──▶ PipeReader
//!                  ├── full  → writer parks until the reader drains
//!                  ├── empty → reader parks until data or EOF
//!                  ├── writer shutdown/drop → EOF after the buffer drains
//!                  └── reader drop → writes fail with BrokenPipe
//! ```
//!
//! State lives under a `std::sync::Mutex`: critical sections are a few
//! VecDeque operations, and Drop must stay synchronous. Wakers are registered
//! under the same lock so a wake cannot slip between check and park.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Default pipe capacity, the size of a Linux kernel pipe buffer.
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

struct Chamber {
    bytes: VecDeque<u8>,
    capacity: usize,
    writer_open: bool,
    reader_open: bool,
    reader_waker: Option<Waker>,
    writer_waker: Option<Waker>,
}

struct Shared {
    chamber: Mutex<Chamber>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Chamber> {
        self.chamber.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Write end of a pipe.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

/// Read end of a pipe.
pub struct PipeReader {
    shared: Arc<Shared>,
}

/// Create a pipe holding at most `capacity` bytes in flight.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        chamber: Mutex::new(Chamber {
            bytes: VecDeque::with_capacity(capacity.min(8192)),
            capacity,
            writer_open: true,
            reader_open: true,
            reader_waker: None,
            writer_waker: None,
        }),
    });

    (
        PipeWriter { shared: Arc::clone(&shared) },
        PipeReader { shared },
    )
}

impl PipeWriter {
    /// Signal EOF to the reader. Idempotent.
    pub fn close(&self) {
        let mut chamber = self.shared.lock();
        chamber.writer_open = false;
        if let Some(waker) = chamber.reader_waker.take() {
            waker.wake();
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut chamber = self.shared.lock();

        if !chamber.reader_open {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "downstream stage closed its input",
            )));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let room = chamber.capacity.saturating_sub(chamber.bytes.len());
        if room == 0 {
            chamber.writer_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.len().min(room);
        chamber.bytes.extend(&buf[..n]);
        if let Some(waker) = chamber.reader_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.close();
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut chamber = self.shared.lock();

        if chamber.bytes.is_empty() {
            if chamber.writer_open {
                chamber.reader_waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
            // EOF: nothing buffered and no writer left
            return Poll::Ready(Ok(()));
        }

        let n = buf.remaining().min(chamber.bytes.len());
        let (front, back) = chamber.bytes.as_slices();
        if n <= front.len() {
            buf.put_slice(&front[..n]);
        } else {
            buf.put_slice(front);
            buf.put_slice(&back[..n - front.len()]);
        }
        chamber.bytes.drain(..n);

        if let Some(waker) = chamber.writer_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut chamber = self.shared.lock();
        chamber.reader_open = false;
        chamber.bytes.clear();
        if let Some(waker) = chamber.writer_waker.take() {
            waker.wake();
        }
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn bytes_arrive_in_order() {
        let (mut tx, mut rx) = pipe(1024);
        tx.write_all(b"hello ").await.unwrap();
        tx.write_all(b"world").await.unwrap();
        drop(tx);

        let mut out = String::new();
        rx.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn writer_parks_until_reader_drains() {
        let (mut tx, mut rx) = pipe(8);
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let writer = tokio::spawn(async move {
            tx.write_all(&data).await.unwrap();
            tx.shutdown().await.unwrap();
        });

        let mut out = Vec::new();
        rx.read_to_end(&mut out).await.unwrap();
        writer.await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn closed_writer_reads_as_eof() {
        let (tx, mut rx) = pipe(16);
        tx.close();

        let mut buf = [0u8; 4];
        assert_eq!(rx.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reader_waits_for_late_writer() {
        let (mut tx, mut rx) = pipe(16);
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            rx.read_to_end(&mut out).await.unwrap();
            out
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.write_all(b"late").await.unwrap();
        drop(tx);

        let out = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .expect("reader hung after writer closed")
            .unwrap();
        assert_eq!(out, b"late");
    }

    #[tokio::test]
    async fn dropped_reader_breaks_blocked_writer() {
        let (mut tx, rx) = pipe(4);
        let writer = tokio::spawn(async move {
            let err = tx.write_all(&[0u8; 64]).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
            let again = tx.write(b"x").await.unwrap_err();
            assert_eq!(again.kind(), io::ErrorKind::BrokenPipe);
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("writer hung after reader dropped")
            .unwrap();
    }
}
