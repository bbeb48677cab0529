use std::cell::RefCell;
use std::rc::{Rc, Weak};

use foundation::LatLng;

/// A click on the map, already converted to a geographic coordinate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MapClick {
    pub latlng: LatLng,
}

impl MapClick {
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            latlng: LatLng::new(lat, lng),
        }
    }
}

/// What a subscriber did with a click.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Let the click continue to the map's default handling.
    Ignored,
    /// Stop propagation; default map handling must not run.
    Consumed,
}

impl ClickOutcome {
    pub fn is_consumed(self) -> bool {
        self == ClickOutcome::Consumed
    }
}

pub type ClickHandler = Rc<dyn Fn(&MapClick) -> ClickOutcome>;

/// Capability to receive map clicks, handed to whoever needs it.
pub trait ClickSource {
    fn subscribe(&self, handler: ClickHandler) -> ClickSubscription;
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: Vec<(u64, ClickHandler)>,
}

impl Subscribers {
    fn contains(&self, id: u64) -> bool {
        self.handlers.iter().any(|(h, _)| *h == id)
    }
}

/// Host-side click dispatcher.
///
/// Handlers run in subscription order; the first one that consumes the click
/// stops propagation.
#[derive(Clone, Default)]
pub struct MapClickBus {
    inner: Rc<RefCell<Subscribers>>,
}

impl std::fmt::Debug for MapClickBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapClickBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl MapClickBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch(&self, click: MapClick) -> ClickOutcome {
        // Snapshot so handlers may subscribe/unsubscribe while we iterate.
        let snapshot: Vec<(u64, ClickHandler)> = self.inner.borrow().handlers.clone();
        for (id, handler) in snapshot {
            if !self.inner.borrow().contains(id) {
                continue;
            }
            if handler(&click).is_consumed() {
                return ClickOutcome::Consumed;
            }
        }
        ClickOutcome::Ignored
    }
}

impl ClickSource for MapClickBus {
    fn subscribe(&self, handler: ClickHandler) -> ClickSubscription {
        let mut subs = self.inner.borrow_mut();
        let id = subs.next_id;
        subs.next_id = subs.next_id.wrapping_add(1);
        subs.handlers.push((id, handler));
        ClickSubscription {
            id,
            bus: Rc::downgrade(&self.inner),
        }
    }
}

/// Registration guard; unsubscribes when released or dropped.
pub struct ClickSubscription {
    id: u64,
    bus: Weak<RefCell<Subscribers>>,
}

impl std::fmt::Debug for ClickSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickSubscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl ClickSubscription {
    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.borrow().contains(self.id))
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for ClickSubscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        if let Ok(mut subs) = bus.try_borrow_mut() {
            subs.handlers.retain(|(id, _)| *id != self.id);
        };
    }
}
