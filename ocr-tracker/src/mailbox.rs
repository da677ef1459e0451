// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded overwrite-oldest buffer with a wake-up signal.
//!
//! Decouples fast log delivery from arbitrarily slow consumption: `deliver`
//! never blocks and never awaits, while a draining task parks on
//! [`Mailbox::notified`]. When the queue is full the oldest pending value is
//! dropped to admit the newest - only the most recent value matters to the
//! consumer, so losing a stale intermediate is acceptable.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

pub struct Mailbox<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> Mailbox<T> {
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "mailbox capacity must be at least 1");
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Appends `value` and signals the drainer. Returns `true` if the append
    /// pushed the queue over capacity, in which case the oldest pending
    /// value was dropped to make room.
    pub fn deliver(&self, value: T) -> bool {
        let was_over_capacity = {
            let mut queue = self.queue.lock();
            queue.push_back(value);
            if queue.len() > self.capacity {
                queue.pop_front();
                true
            } else {
                false
            }
        };
        self.notify.notify_one();
        was_over_capacity
    }

    /// Pops the oldest pending value, if any.
    pub fn retrieve(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once a delivery has been signalled. A signal sent while no
    /// task is waiting is retained, so a delivery is never missed between
    /// drains.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
