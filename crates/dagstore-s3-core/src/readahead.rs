//! Double-buffered read-ahead for large uploads.
//!
//! A background task fills one chunk while the consumer (the DAG builder)
//! drains the previous one, so network reads overlap with chunking and
//! hashing. The channel between them holds a single chunk: together with
//! the chunk being filled that gives two buffers in flight.

use std::io;

use bytes::Bytes;
use dagstore_pool::DagReader;
use futures::StreamExt;
use futures::stream;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::trace;

/// Wrap `reader` so it is read ahead in `chunk_size` pieces on a separate task.
///
/// The background task stops at end of stream, on the first read error
/// (which is forwarded to the consumer) or when the returned reader is
/// dropped.
///
/// # Panics
///
/// Must be called within a Tokio runtime.
#[must_use]
pub fn read_ahead(mut reader: DagReader, chunk_size: usize) -> DagReader {
    let chunk_size = chunk_size.max(1);
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);

    tokio::spawn(async move {
        let mut total = 0u64;
        loop {
            let mut chunk = Vec::with_capacity(chunk_size);
            match (&mut reader).take(chunk_size as u64).read_to_end(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    total += n as u64;
                    if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
        trace!(total, "read-ahead finished");
    });

    let chunks = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Box::new(StreamReader::new(chunks.boxed()))
}
