use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use log::{debug, trace};

use carddock_core::device::StorageDevice;

use crate::debounce::Debouncer;
use crate::event::{EdgeSet, EventQueue, HotplugEvent};

/// Default refractory window between accepted edges.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

type BoundDevice = Weak<Mutex<dyn StorageDevice>>;

/// Detects card insertion/removal from debounced GPIO edges.
///
/// The detector consumes `(pin, triggered-edge-mask)` notifications from the
/// GPIO collaborator; it does not own pin configuration. Accepted edges are
/// published to the bounded [`EventQueue`] and handed to registered
/// reactions; with a bound device and auto-mount enabled, a rising edge
/// mounts the card and a falling edge unmounts it.
///
/// The device binding is weak: the detector never keeps a device alive, and
/// callers clear the binding before dropping the device they bound.
pub struct HotplugDetector {
    pin: u8,
    edges: EdgeSet,
    debouncer: Debouncer,
    queue: EventQueue,
    device: Option<BoundDevice>,
    auto_mount: bool,
    reactions: Vec<Box<dyn FnMut(&HotplugEvent) + Send>>,
}

impl HotplugDetector {
    /// Detector for `pin` with the usual card-socket profile: both edges of
    /// interest, a 100 ms debounce window and auto-mount enabled.
    pub fn new(pin: u8, queue: EventQueue) -> Self {
        HotplugDetector {
            pin,
            edges: EdgeSet::RISING | EdgeSet::FALLING,
            debouncer: Debouncer::new(DEFAULT_DEBOUNCE),
            queue,
            device: None,
            auto_mount: true,
            reactions: Vec::new(),
        }
    }

    pub fn with_edges(mut self, edges: EdgeSet) -> Self {
        self.edges = edges;
        self
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debouncer = Debouncer::new(window);
        self
    }

    pub fn with_auto_mount(mut self, enabled: bool) -> Self {
        self.auto_mount = enabled;
        self
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Binds the device whose lifecycle follows this socket. The reference
    /// held is weak; clear it before dropping the device.
    pub fn bind_device(&mut self, device: &Arc<Mutex<dyn StorageDevice>>) {
        self.device = Some(Arc::downgrade(device));
    }

    pub fn clear_device(&mut self) {
        self.device = None;
    }

    /// Registers a reaction invoked for every accepted edge, after the
    /// queue publish and any auto-mount call. Reactions run in registration
    /// order.
    pub fn add_reaction(&mut self, reaction: impl FnMut(&HotplugEvent) + Send + 'static) {
        self.reactions.push(Box::new(reaction));
    }

    /// Entry point for the GPIO collaborator's interrupt notification.
    /// Never blocks: a full event queue drops the event, and mount failures
    /// stay unreported on this path.
    pub fn handle_interrupt(&mut self, triggered: EdgeSet) {
        self.handle_interrupt_at(triggered, Instant::now());
    }

    /// Deterministic variant for callers that own timekeeping.
    pub fn handle_interrupt_at(&mut self, triggered: EdgeSet, now: Instant) {
        if !self.edges.intersects(triggered) {
            return;
        }
        if !self.debouncer.allow_at(now) {
            trace!("pin {}: edge inside debounce window, discarded", self.pin);
            return;
        }
        self.dispatch(triggered);
    }

    fn dispatch(&mut self, triggered: EdgeSet) {
        let event = HotplugEvent {
            pin: self.pin,
            edges: triggered,
        };
        if !self.queue.try_publish(event) {
            trace!("pin {}: event queue full, edge dropped", self.pin);
        }

        if self.auto_mount {
            if let Some(device) = self.device.as_ref().and_then(Weak::upgrade) {
                if let Ok(mut device) = device.lock() {
                    if triggered.contains(EdgeSet::RISING) {
                        debug!("pin {}: card inserted, mounting", self.pin);
                        device.mount();
                    } else if triggered.contains(EdgeSet::FALLING) {
                        debug!("pin {}: card removed, unmounting", self.pin);
                        device.unmount();
                    }
                }
            }
        }

        for reaction in &mut self.reactions {
            reaction(&event);
        }
    }
}
