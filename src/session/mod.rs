//! Live session registry and record fan-out.
//!
//! A session is one live viewer. Sessions are cheap and independent: the
//! registry only remembers, per session, the frame index of the last record it
//! handed over. Recent history lives in one shared replay ring that newly
//! joined sessions are backfilled from.
//!
//! Delivery itself is a one-way push through the [`Deliver`] seam, performed
//! outside the registry lock. [`Mailboxes`] is the in-process implementation;
//! a transport adapter can implement [`Deliver`] directly instead.
//!
//! ```text
//!    decode task ──► broadcast ──► distributor ──► SessionRegistry::publish
//!                                                     │ (lock: ring + markers)
//!                                                     ▼
//!                                    Deliver::deliver(key, record) per target
//! ```

mod mailbox;
mod registry;

use std::sync::Arc;

use crate::types::{IndexedRecord, SessionKey};

pub use mailbox::{Mailboxes, SessionFeed};
pub use registry::{PublishOutcome, ReplaySnapshot, SessionRegistry};

/// Result of pushing one record to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Record queued for the session
    Delivered,
    /// Record queued, but an older undelivered record was evicted to make room
    Overflowed,
    /// The session's target no longer exists; the registry drops the session
    Gone,
}

/// One-way push of a record to a session's consumer.
///
/// Implementations must not block: `deliver` is called from the distributor
/// for every target of every record.
pub trait Deliver: Send + Sync + 'static {
    fn deliver(&self, key: &SessionKey, record: &Arc<IndexedRecord>) -> Delivery;
}

impl<D: Deliver + ?Sized> Deliver for Arc<D> {
    fn deliver(&self, key: &SessionKey, record: &Arc<IndexedRecord>) -> Delivery {
        (**self).deliver(key, record)
    }
}
