//! Cancellable single-flight operation slots.
//!
//! A slot holds at most one in-flight asynchronous operation. Starting an
//! operation hands out an [`OpTicket`] plus an abort registration; the owner
//! wraps its future with [`Abortable`] and, once the future resolves, applies
//! the result only if [`OpSlot::finish`] confirms the ticket is still current.
//! That identity check is what makes a late resolution after cancellation a
//! no-op even when the abort itself lost the race.

pub use futures_util::future::{AbortRegistration, Abortable, Aborted};

use futures_util::future::AbortHandle;
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpTicket(u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SlotBusy {
    pub label: &'static str,
}

impl std::fmt::Display for SlotBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} already in flight", self.label)
    }
}

impl std::error::Error for SlotBusy {}

#[derive(Debug)]
struct InFlight {
    ticket: OpTicket,
    abort: AbortHandle,
}

#[derive(Debug)]
pub struct OpSlot {
    label: &'static str,
    next: u64,
    in_flight: Option<InFlight>,
}

impl OpSlot {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next: 0,
            in_flight: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Starts a new operation. Fails while another one is in flight.
    pub fn begin(&mut self) -> Result<(OpTicket, AbortRegistration), SlotBusy> {
        if self.in_flight.is_some() {
            return Err(SlotBusy { label: self.label });
        }

        let ticket = OpTicket(self.next);
        self.next = self.next.wrapping_add(1);
        let (abort, registration) = AbortHandle::new_pair();
        self.in_flight = Some(InFlight { ticket, abort });
        Ok((ticket, registration))
    }

    pub fn is_current(&self, ticket: OpTicket) -> bool {
        self.in_flight.as_ref().is_some_and(|f| f.ticket == ticket)
    }

    /// Releases the slot if `ticket` still owns it.
    ///
    /// Returns `false` for stale tickets; their results must be dropped.
    pub fn finish(&mut self, ticket: OpTicket) -> bool {
        if !self.is_current(ticket) {
            debug!(slot = self.label, ?ticket, "dropping stale result");
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Aborts the in-flight operation, if any.
    pub fn cancel(&mut self) -> Option<OpTicket> {
        let in_flight = self.in_flight.take()?;
        in_flight.abort.abort();
        debug!(slot = self.label, ticket = ?in_flight.ticket, "cancelled");
        Some(in_flight.ticket)
    }
}
