use std::sync::Arc;

use bitflags::bitflags;
use crossbeam_queue::ArrayQueue;

bitflags! {
    /// GPIO edge mask. The values match the hardware IRQ event encoding, so
    /// a raw triggered-events word can be taken apart directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EdgeSet: u32 {
        const FALLING = 0x4;
        const RISING = 0x8;
    }
}

/// Record of an accepted edge. Immutable once published; ownership moves to
/// the queue on enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotplugEvent {
    pub pin: u8,
    pub edges: EdgeSet,
}

impl HotplugEvent {
    pub fn is_insertion(&self) -> bool {
        self.edges.contains(EdgeSet::RISING)
    }

    pub fn is_removal(&self) -> bool {
        self.edges.contains(EdgeSet::FALLING)
    }
}

/// Bounded hand-off queue between the interrupt context and the
/// application loop.
///
/// Cloning yields another handle onto the same queue; construct it once and
/// pass handles to both the producer (detector) and the consumer. Publishing
/// never blocks: a full queue drops the event.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<ArrayQueue<HotplugEvent>>,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        EventQueue {
            inner: Arc::new(ArrayQueue::new(capacity)),
        }
    }

    /// Non-blocking enqueue; `false` means the queue was full and the event
    /// was dropped.
    pub fn try_publish(&self, event: HotplugEvent) -> bool {
        self.inner.push(event).is_ok()
    }

    pub fn pop(&self) -> Option<HotplugEvent> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
