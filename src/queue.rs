//! Bounded multi-producer/multi-consumer work queues.
//!
//! Stages communicate through a bounded channel so a slow consumer applies
//! back-pressure to its producer instead of letting requests pile up
//! unbounded in memory.

use crossbeam_channel::{bounded, Receiver, Sender};

/// A single bounded queue: producer `Sender`, consumer `Receiver`.
pub struct Queue<T> {
    pub sender: Sender<T>,
    pub receiver: Receiver<T>,
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Queue { sender, receiver }
    }
}

/// Lets one thread wait on several queues at once by racing their
/// receivers in a `crossbeam_channel::Select`. Used by indexer workers
/// that must react to both new requests and a quit signal.
pub struct MultiQueueWaiter<'a> {
    select: crossbeam_channel::Select<'a>,
    labels: Vec<&'static str>,
}

impl<'a> MultiQueueWaiter<'a> {
    pub fn new() -> Self {
        MultiQueueWaiter {
            select: crossbeam_channel::Select::new(),
            labels: Vec::new(),
        }
    }

    pub fn add<T>(&mut self, receiver: &'a Receiver<T>, label: &'static str) -> &mut Self {
        self.select.recv(receiver);
        self.labels.push(label);
        self
    }

    /// Block until any registered queue is ready, returning the label of
    /// the one that fired. Does not itself receive the value — callers
    /// call `try_recv` on the matching receiver afterward.
    pub fn wait(&mut self) -> &'static str {
        let oper = self.select.select();
        self.labels[oper.index()]
    }
}

impl<'a> Default for MultiQueueWaiter<'a> {
    fn default() -> Self {
        Self::new()
    }
}
