//! FrameChannel: drop-oldest frame relay between a producer and one viewer.
//!
//! Video here is a live view, not a reliable transport: a stale frame is worse
//! than a lost one.  [`FrameChannel::put`] therefore never blocks and never
//! queues behind a slow viewer.  When a frame is still buffered as a new one
//! arrives, the buffered frame is discarded first, so a viewer that falls
//! behind jumps straight to the freshest image.
//!
//! ```text
//! put(A)            [A]
//! put(B)            [B]      A dropped
//! put(C)            [C]      B dropped
//! get()  → C        []
//! ```
//!
//! [`FrameHub`] fans one producer out to many viewers: every viewer owns its
//! own channel, and the hub only holds weak references so a disconnected
//! viewer's channel is freed with its HTTP response.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use mirror_core::Frame;
use tokio::sync::Notify;

/// Frames a viewer can see at once: the one it has taken plus at most one
/// buffered behind it.  A `get` is therefore never older than the two most
/// recent `put`s.
pub const FRAME_CHANNEL_SLOTS: usize = 2;

/// Frames held inside the channel.  The other slot is the reader's.
const BUFFERED_FRAMES: usize = FRAME_CHANNEL_SLOTS - 1;

/// Bounded, non-blocking, freshest-first frame relay.
#[derive(Debug, Default)]
pub struct FrameChannel {
    slots: Mutex<VecDeque<Frame>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl FrameChannel {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(VecDeque::with_capacity(BUFFERED_FRAMES)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Stores `frame`, discarding any frame still buffered.  Never blocks.
    pub fn put(&self, frame: Frame) {
        {
            let mut slots = self.lock_slots();
            while slots.len() >= BUFFERED_FRAMES {
                slots.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            slots.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Takes the buffered frame, if any, without waiting.
    pub fn try_get(&self) -> Option<Frame> {
        self.lock_slots().pop_front()
    }

    /// Waits up to `timeout` for a frame.
    ///
    /// Returns `None` when the timeout elapses with nothing buffered.
    pub async fn get(&self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.recv()).await.ok()
    }

    async fn recv(&self) -> Frame {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a put between the check
            // and the await still wakes us.
            notified.as_mut().enable();
            if let Some(frame) = self.try_get() {
                return frame;
            }
            notified.await;
        }
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames discarded by the drop-oldest policy.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, VecDeque<Frame>> {
        // A panic while holding this lock cannot leave the deque inconsistent,
        // so a poisoned lock is still safe to use.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fans frames from one producer out to every subscribed viewer channel.
#[derive(Debug, Default)]
pub struct FrameHub {
    subscribers: Mutex<Vec<Weak<FrameChannel>>>,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new viewer and returns its private channel.
    pub fn subscribe(&self) -> Arc<FrameChannel> {
        let channel = Arc::new(FrameChannel::new());
        self.lock_subscribers().push(Arc::downgrade(&channel));
        channel
    }

    /// Puts `frame` into every live viewer channel and prunes dead ones.
    ///
    /// Returns the number of viewers that received the frame.
    pub fn publish(&self, frame: &Frame) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|weak| match weak.upgrade() {
            Some(channel) => {
                channel.put(frame.clone());
                true
            }
            None => false,
        });
        subscribers.len()
    }

    /// Number of live viewer channels.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|weak| weak.strong_count() > 0);
        subscribers.len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Weak<FrameChannel>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
