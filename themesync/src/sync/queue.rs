use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use super::file::FileEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Update,
    Delete,
    Get,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Get => "get",
        }
    }
}

/// One scheduled call against the remote store. Equal when kind and key are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    pub kind: OperationKind,
    pub file: FileEntry,
}

impl Operation {
    pub fn new(kind: OperationKind, file: FileEntry) -> Self {
        Self { kind, file }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.file.relative_path())
    }
}

/// Operations accepted but not yet completed. Every change publishes the new size.
#[derive(Debug)]
pub struct PendingSet {
    inner: Mutex<HashSet<Operation>>,
    size: watch::Sender<usize>,
}

impl Default for PendingSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingSet {
    pub fn new() -> Self {
        let (size, _) = watch::channel(0);
        Self {
            inner: Mutex::new(HashSet::new()),
            size,
        }
    }

    /// Inserts unless an equal operation is already pending. Check and insert are atomic.
    pub fn insert(&self, op: Operation) -> bool {
        let mut set = self.lock();
        let inserted = set.insert(op);
        if inserted {
            self.size.send_replace(set.len());
        }
        inserted
    }

    pub fn remove(&self, op: &Operation) -> bool {
        let mut set = self.lock();
        let removed = set.remove(op);
        if removed {
            self.size.send_replace(set.len());
        }
        removed
    }

    pub fn contains(&self, op: &Operation) -> bool {
        self.lock().contains(op)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.size.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Operation>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Closable multi-consumer FIFO. Closing drops the sender, so consumers see the remaining
/// items and then `None`.
#[derive(Debug)]
pub struct OperationQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Operation>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Operation>>,
    closed: watch::Sender<bool>,
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            closed,
        }
    }

    /// Returns `false` when the queue is closed and the operation was discarded.
    pub fn push(&self, op: Operation) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match sender.as_ref() {
            Some(sender) => sender.send(op).is_ok(),
            None => false,
        }
    }

    pub async fn pop(&self) -> Option<Operation> {
        self.receiver.lock().await.recv().await
    }

    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OperationKind, key: &str) -> Operation {
        Operation::new(kind, FileEntry::new(format!("/theme/{key}"), "/theme"))
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue = OperationQueue::new();
        assert!(queue.push(op(OperationKind::Update, "layout/theme.liquid")));
        assert!(queue.push(op(OperationKind::Delete, "assets/old.js")));

        let first = queue.pop().await.unwrap();
        let second = queue.pop().await.unwrap();

        assert_eq!(first.file.relative_path(), "layout/theme.liquid");
        assert_eq!(second.kind, OperationKind::Delete);
    }

    #[tokio::test]
    async fn close_drains_then_ends_and_rejects_new_items() {
        let queue = OperationQueue::new();
        queue.push(op(OperationKind::Update, "a.liquid"));
        queue.close();
        queue.close();

        assert!(queue.is_closed());
        assert!(!queue.push(op(OperationKind::Update, "b.liquid")));
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }

    #[test]
    fn pending_set_rejects_duplicates_by_kind_and_key() {
        let pending = PendingSet::new();
        let sizes = pending.subscribe();

        assert!(pending.insert(op(OperationKind::Update, "a.liquid")));
        assert!(!pending.insert(Operation::new(
            OperationKind::Update,
            FileEntry::new("/elsewhere/a.liquid", "/elsewhere"),
        )));
        assert!(pending.insert(op(OperationKind::Delete, "a.liquid")));

        assert_eq!(pending.len(), 2);
        assert_eq!(*sizes.borrow(), 2);

        assert!(pending.remove(&op(OperationKind::Update, "a.liquid")));
        assert!(!pending.remove(&op(OperationKind::Update, "a.liquid")));
        assert_eq!(pending.len(), 1);
        assert_eq!(*sizes.borrow(), 1);
        assert!(!pending.is_empty());
    }

    #[test]
    fn operation_display_names_kind_and_key() {
        assert_eq!(
            op(OperationKind::Get, "config/settings_data.json").to_string(),
            "get config/settings_data.json"
        );
    }
}
