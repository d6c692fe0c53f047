use crate::wire::{read_fully, Message, LENGTH_PREFIX_LEN};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Maximum decoded messages queued per session before the reader
/// suspends and waits for the consumer to drain
pub const MESSAGE_BACKLOG: usize = 10;

/// Background worker that pulls framed messages off a readable stream
/// and publishes them to the owning session's bounded queue.
///
/// All socket reading happens here so the consumer never blocks on I/O;
/// a full queue suspends this worker rather than dropping messages.
pub struct MessageReader<R> {
    stream: R,
    queue: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(stream: R, queue: mpsc::Sender<Message>, cancel: CancellationToken) -> Self {
        Self {
            stream,
            queue,
            cancel,
        }
    }

    /// Run the read loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut len_buf = [0u8; LENGTH_PREFIX_LEN];

        loop {
            // Cancellation is observed once per frame; an in-flight read
            // may still complete after stop is requested.
            if self.cancel.is_cancelled() {
                debug!("Reader stopped");
                return;
            }

            // Read length prefix
            let read = match read_fully(&mut self.stream, &mut len_buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Read failed: {}", e);
                    return;
                }
            };
            if read == 0 {
                debug!("Connection closed by peer");
                return;
            }
            if read < LENGTH_PREFIX_LEN {
                error!(
                    "Frame desynchronization: got {} of {} length-prefix bytes",
                    read, LENGTH_PREFIX_LEN
                );
                return;
            }

            let length = u32::from_be_bytes(len_buf) as usize;

            // Read payload
            let mut payload = vec![0u8; length];
            let read = match read_fully(&mut self.stream, &mut payload).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Read failed: {}", e);
                    return;
                }
            };

            let message = if read < length {
                // Forward what arrived; keeping the declared length makes
                // the mismatch visible downstream.
                warn!("Short read: expected {} payload bytes, got {}", length, read);
                payload.truncate(read);
                Message::from_parts(length as u32, payload)
            } else {
                // Reassemble the full frame and decode it
                let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + length);
                frame.extend_from_slice(&len_buf);
                frame.extend_from_slice(&payload);
                match Message::decode(&frame) {
                    Ok(message) => message,
                    Err(e) => {
                        error!("Undecodable frame: {}", e);
                        return;
                    }
                }
            };

            // Publish, suspending while the queue is at capacity
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Reader stopped while publishing");
                    return;
                }
                sent = self.queue.send(message) => {
                    if sent.is_err() {
                        // consumer dropped its receiver
                        debug!("Message queue closed");
                        return;
                    }
                }
            }

            if read < length {
                // the stream ended mid-frame, nothing more to read
                return;
            }
        }
    }
}
