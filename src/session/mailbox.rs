//! Per-session bounded mailboxes with drop-oldest overflow
//!
//! [`Mailboxes`] is the in-process [`Deliver`] implementation: every session
//! gets a small queue and a [`SessionFeed`] to read it. Pushing never waits. A
//! full queue evicts its oldest record, so a stalled reader loses history
//! instead of stalling the distributor.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::Stream;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::{Deliver, Delivery};
use crate::types::{IndexedRecord, SessionKey};

#[derive(Debug)]
struct Mailbox {
    queue: Mutex<VecDeque<Arc<IndexedRecord>>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns false if the oldest record had to be evicted.
    fn push(&self, record: Arc<IndexedRecord>) -> bool {
        let evicted = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if queue.len() >= self.capacity { queue.pop_front() } else { None };
            queue.push_back(record);
            evicted
        };

        self.notify.notify_one();

        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    fn pop(&self) -> Option<Arc<IndexedRecord>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Registry of per-session mailboxes.
#[derive(Debug)]
pub struct Mailboxes {
    capacity: usize,
    boxes: Mutex<HashMap<SessionKey, Arc<Mailbox>>>,
}

impl Mailboxes {
    /// Create mailboxes holding at most `capacity` undelivered records each.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), boxes: Mutex::new(HashMap::new()) }
    }

    /// Open a mailbox for `key`, closing any previous one for the same key.
    pub fn open(&self, key: SessionKey) -> SessionFeed {
        let mailbox = Arc::new(Mailbox::new(self.capacity));
        let previous = self
            .boxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::clone(&mailbox));

        if let Some(previous) = previous {
            debug!(session = %key, "Replacing existing mailbox");
            previous.close();
        }

        SessionFeed { key, mailbox }
    }

    /// Close and forget the mailbox for `key`. Returns whether one existed.
    pub fn close(&self, key: &SessionKey) -> bool {
        let removed = self.boxes.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        match removed {
            Some(mailbox) => {
                mailbox.close();
                true
            }
            None => false,
        }
    }

    /// Number of open mailboxes.
    pub fn len(&self) -> usize {
        self.boxes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &SessionKey) -> Option<Arc<Mailbox>> {
        let mut boxes = self.boxes.lock().unwrap_or_else(PoisonError::into_inner);
        match boxes.get(key) {
            Some(mailbox) if mailbox.is_closed() => {
                boxes.remove(key);
                None
            }
            Some(mailbox) => Some(Arc::clone(mailbox)),
            None => None,
        }
    }
}

impl Deliver for Mailboxes {
    fn deliver(&self, key: &SessionKey, record: &Arc<IndexedRecord>) -> Delivery {
        let Some(mailbox) = self.lookup(key) else {
            return Delivery::Gone;
        };

        if mailbox.push(Arc::clone(record)) {
            Delivery::Delivered
        } else {
            trace!(session = %key, frame = record.frame_index, "Mailbox full, oldest record dropped");
            Delivery::Overflowed
        }
    }
}

/// Reading end of one session's mailbox.
///
/// Dropping the feed closes the mailbox; the next delivery to it reports
/// [`Delivery::Gone`] and the registry forgets the session.
#[derive(Debug)]
pub struct SessionFeed {
    key: SessionKey,
    mailbox: Arc<Mailbox>,
}

impl SessionFeed {
    /// Wait for the next record. Returns `None` once the mailbox is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<Arc<IndexedRecord>> {
        loop {
            if let Some(record) = self.mailbox.pop() {
                return Some(record);
            }
            if self.mailbox.is_closed() {
                return None;
            }
            self.mailbox.notify.notified().await;
        }
    }

    /// Take the next record if one is queued.
    pub fn try_recv(&mut self) -> Option<Arc<IndexedRecord>> {
        self.mailbox.pop()
    }

    /// Records evicted from this mailbox because the reader fell behind.
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped.load(Ordering::Relaxed)
    }

    /// Records waiting to be read.
    pub fn queued(&self) -> usize {
        self.mailbox.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Consume the feed as a stream of records.
    pub fn into_stream(self) -> impl Stream<Item = Arc<IndexedRecord>> + Send + 'static {
        futures::stream::unfold(self, |mut feed| async move {
            let record = feed.recv().await?;
            Some((record, feed))
        })
    }
}

impl Drop for SessionFeed {
    fn drop(&mut self) {
        self.mailbox.close();
    }
}
