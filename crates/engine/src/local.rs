// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! In-process consumer channel.
//!
//! Deliveries go through a zero-capacity `flume` channel: `deliver` completes
//! only once the receiving side has taken the delivery. Nothing is buffered
//! between broker and consumer, so a consumer that goes away cannot strand
//! deliveries that were accepted but never seen. A cancelled `deliver` (for
//! example on timeout) leaves nothing behind.
//!
//! The channel closes when either side calls `close()` or when the receiver
//! is dropped. Closing wakes a pending `deliver` or `recv`. Closed hooks run
//! once, on the thread that closed the channel.

use crate::channel::{ClosedHook, ConsumerChannel, Delivery, SessionId};
use crate::error::DeliveryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Creates a connected in-process consumer channel.
///
/// The [`LocalConsumer`] half is registered with the broker; the
/// [`LocalConsumerReceiver`] half is read by the consuming code.
pub fn local_consumer(
    session_id: impl Into<SessionId>,
) -> (Arc<LocalConsumer>, LocalConsumerReceiver) {
    let (sender, receiver) = flume::bounded(0);
    let close_state = Arc::new(CloseState::default());
    (
        Arc::new(LocalConsumer {
            session_id: session_id.into(),
            sender,
            close_state: Arc::clone(&close_state),
        }),
        LocalConsumerReceiver {
            receiver,
            close_state,
        },
    )
}

#[derive(Default)]
struct CloseState {
    inner: Mutex<CloseStateInner>,
    signal: CancellationToken,
}

#[derive(Default)]
struct CloseStateInner {
    closed: bool,
    hooks: Vec<ClosedHook>,
}

impl CloseState {
    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn close(&self) {
        let hooks = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            std::mem::take(&mut inner.hooks)
        };
        self.signal.cancel();
        for hook in hooks {
            hook();
        }
    }

    fn register(&self, hook: ClosedHook) {
        let mut inner = self.inner.lock();
        if inner.closed {
            drop(inner);
            hook();
        } else {
            inner.hooks.push(hook);
        }
    }
}

/// Broker-side half of an in-process consumer channel.
pub struct LocalConsumer {
    session_id: SessionId,
    sender: flume::Sender<Delivery>,
    close_state: Arc<CloseState>,
}

impl LocalConsumer {
    /// Closes the channel and runs the closed hooks.
    pub fn close(&self) {
        self.close_state.close();
    }

    /// Whether the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_state.is_closed()
    }
}

#[async_trait]
impl ConsumerChannel for LocalConsumer {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    async fn deliver(&self, delivery: Delivery) -> Result<(), DeliveryError> {
        if self.close_state.is_closed() {
            return Err(DeliveryError::ChannelClosed);
        }
        tokio::select! {
            biased;
            () = self.close_state.signal.cancelled() => Err(DeliveryError::ChannelClosed),
            result = self.sender.send_async(delivery) => {
                result.map_err(|_| DeliveryError::ChannelClosed)
            }
        }
    }

    fn on_closed(&self, hook: ClosedHook) {
        self.close_state.register(hook);
    }
}

impl std::fmt::Debug for LocalConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConsumer")
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer-side half of an in-process consumer channel.
pub struct LocalConsumerReceiver {
    receiver: flume::Receiver<Delivery>,
    close_state: Arc<CloseState>,
}

impl LocalConsumerReceiver {
    /// Waits for the next delivery. Returns `None` once the channel is closed.
    pub async fn recv(&self) -> Option<Delivery> {
        if self.close_state.is_closed() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.close_state.signal.cancelled() => None,
            result = self.receiver.recv_async() => result.ok(),
        }
    }

    /// Takes a delivery if one is being offered right now.
    #[must_use]
    pub fn try_recv(&self) -> Option<Delivery> {
        if self.close_state.is_closed() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Closes the channel and runs the closed hooks.
    pub fn close(&self) {
        self.close_state.close();
    }
}

impl Drop for LocalConsumerReceiver {
    fn drop(&mut self) {
        self.close_state.close();
    }
}
