//! Messaging strategy behind a live stream
//!
//! The live source knows nothing about the transport; it is handed a
//! [`Subscriber`] and blocks on it for the next raw frame.

use bsp_core::{BspError, BspResult};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::debug;

/// Blocking source of raw frames
pub trait Subscriber: Send {
    /// Wait for the next frame. Returns `StreamClosed` once the publisher
    /// has gone away or the wait timed out.
    fn receive(&self) -> BspResult<Vec<u8>>;
}

/// In-process subscriber fed through a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    receiver: Receiver<Vec<u8>>,
    timeout: Option<Duration>,
}

/// Create a connected publisher end and subscriber. `capacity == 0` gives
/// an unbounded queue.
pub fn channel(capacity: usize) -> (Sender<Vec<u8>>, ChannelSubscriber) {
    let (sender, receiver) = if capacity == 0 { unbounded() } else { bounded(capacity) };
    (sender, ChannelSubscriber::new(receiver))
}

impl ChannelSubscriber {
    pub fn new(receiver: Receiver<Vec<u8>>) -> Self {
        Self {
            receiver,
            timeout: None,
        }
    }

    /// Give up waiting after `timeout` and treat the stream as closed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Subscriber for ChannelSubscriber {
    fn receive(&self) -> BspResult<Vec<u8>> {
        match self.timeout {
            None => self.receiver.recv().map_err(|_| BspError::StreamClosed {
                reason: "publisher disconnected".to_string(),
            }),
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(frame) => Ok(frame),
                Err(RecvTimeoutError::Timeout) => {
                    debug!(?timeout, "No frame before timeout");
                    Err(BspError::StreamClosed {
                        reason: format!("no frame within {:?}", timeout),
                    })
                }
                Err(RecvTimeoutError::Disconnected) => Err(BspError::StreamClosed {
                    reason: "publisher disconnected".to_string(),
                }),
            },
        }
    }
}
