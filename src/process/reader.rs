//! Pipe reader task.
//!
//! One task per output channel drives a [`FramedRead`] over the pipe with
//! [`ChunkCodec`] and forwards every chunk into the shared event queue,
//! followed by a single [`StreamEvent::Eof`] for its channel once the pipe
//! closes.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::ChunkCodec;
use super::{Channel, StreamEvent};

/// Read `stream` to EOF, forwarding chunks tagged with `channel`.
///
/// # Cancellation
///
/// Respects `cancel`: when the token fires the reader exits without
/// emitting an EOF marker. A closed queue stops the reader the same way.
pub async fn run_pump<R>(
    channel: Channel,
    stream: R,
    events: mpsc::UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stream, ChunkCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(?channel, "pipe reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => {
                match item {
                    None => break,
                    Some(Ok(text)) => {
                        if events.send(StreamEvent::Chunk { channel, text }).is_err() {
                            debug!(?channel, "pipe reader: queue closed, stopping");
                            return;
                        }
                    }
                    Some(Err(err)) => {
                        // Treat a broken pipe like EOF so the consumer can settle.
                        warn!(?channel, %err, "pipe reader: read error, closing channel");
                        break;
                    }
                }
            }
        }
    }

    debug!(?channel, "pipe reader: EOF detected");
    if events.send(StreamEvent::Eof { channel }).is_err() {
        debug!(?channel, "pipe reader: queue closed before EOF could be delivered");
    }
}
