//! Thread-safe bridge between transport I/O tasks and the tick consumer.
//!
//! Transports signal connection lifecycle and data events from whatever
//! task or thread their network library runs on. Application callbacks must
//! only ever run on the single thread that calls `tick()`. The bridge is
//! the one structure both sides touch: producers append, the consumer
//! drains, and ordering is preserved end to end.
//!
//! The queue is unbounded on purpose. Dropping a `Disconnected` or `Error`
//! event under pressure would corrupt the connection state machine, so a
//! full queue degrades to growth rather than loss.

use crate::events::InboundEvent;
use crossbeam::queue::SegQueue;

/// Order-preserving, thread-safe event queue.
///
/// `enqueue` may be called from any thread and never blocks or invokes
/// user code. `drain` must only be called from the consumer thread.
#[derive(Debug, Default)]
pub struct EventBridge {
    queue: SegQueue<InboundEvent>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    /// Appends an event. Safe from any thread.
    pub fn enqueue(&self, event: InboundEvent) {
        self.queue.push(event);
    }

    /// Removes and returns the events queued at the time of the call, in
    /// FIFO order.
    ///
    /// The returned iterator is lazy but finite: events enqueued after
    /// `drain` is called are left for the next drain, so a producer racing
    /// the consumer cannot turn one tick into an unbounded loop.
    pub fn drain(&self) -> Drain<'_> {
        Drain {
            queue: &self.queue,
            remaining: self.queue.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Lazy draining iterator returned by [`EventBridge::drain`].
pub struct Drain<'a> {
    queue: &'a SegQueue<InboundEvent>,
    remaining: usize,
}

impl Iterator for Drain<'_> {
    type Item = InboundEvent;

    fn next(&mut self) -> Option<InboundEvent> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.queue.pop()
    }
}
