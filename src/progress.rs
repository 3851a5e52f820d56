// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cancellation and progress
//!
//! The only thing another thread may do to a running carver is ask it
//! to stop.  The request is a flag stored with `Release` and read with
//! `Acquire` at the top of every seam; it only counts while a resize is
//! running.  The progress counters are plain relaxed counters for a
//! caller to poll.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    cancel: AtomicBool,
    busy: AtomicBool,
    done: AtomicU32,
    total: AtomicU32,
}

/// A cloneable, thread-safe view of one carver.
#[derive(Debug, Clone, Default)]
pub struct CarverHandle {
    shared: Arc<Shared>,
}

impl CarverHandle {
    pub fn new() -> Self {
        CarverHandle::default()
    }

    /// Ask the running resize to stop at the next seam boundary.  Never
    /// blocks.  Does nothing while the carver is idle.
    pub fn cancel(&self) {
        if self.is_busy() {
            self.shared.cancel.store(true, Ordering::Release);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Acquire)
    }

    /// Consume a pending request.
    pub(crate) fn take_cancel(&self) -> bool {
        self.shared.cancel.swap(false, Ordering::AcqRel)
    }

    /// True while a resize is running.
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Seams computed so far and seams expected by the running resize.
    pub fn progress(&self) -> (u32, u32) {
        (
            self.shared.done.load(Ordering::Relaxed),
            self.shared.total.load(Ordering::Relaxed),
        )
    }

    /// `progress` as a fraction in [0, 1].  A resize that needs no new
    /// seams reports 1.
    pub fn fraction(&self) -> f64 {
        match self.progress() {
            (_, 0) => 1.0,
            (done, total) => (done as f64 / total as f64).min(1.0),
        }
    }

    pub(crate) fn begin(&self) {
        // A request that raced the end of the previous resize.
        self.shared.cancel.store(false, Ordering::Release);
        self.shared.done.store(0, Ordering::Relaxed);
        self.shared.total.store(0, Ordering::Relaxed);
        self.shared.busy.store(true, Ordering::Release);
    }

    pub(crate) fn expect(&self, seams: u32) {
        self.shared.total.fetch_add(seams, Ordering::Relaxed);
    }

    pub(crate) fn advance(&self) {
        self.shared.done.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn end(&self) {
        self.shared.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn cancel_crosses_threads_and_is_consumed() {
        let handle = CarverHandle::new();
        handle.begin();
        let remote = handle.clone();
        thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(handle.is_cancelled());
        assert!(handle.take_cancel());
        assert!(!handle.take_cancel());
    }

    #[test]
    fn cancel_while_idle_is_ignored() {
        let handle = CarverHandle::new();
        handle.cancel();
        assert!(!handle.is_cancelled());

        handle.begin();
        handle.cancel();
        handle.end();
        handle.begin();
        assert!(!handle.take_cancel());
    }

    #[test]
    fn progress_counts_seams() {
        let handle = CarverHandle::new();
        assert_eq!(handle.fraction(), 1.0);
        handle.begin();
        handle.expect(4);
        handle.advance();
        assert_eq!(handle.progress(), (1, 4));
        assert_eq!(handle.fraction(), 0.25);
        assert!(handle.is_busy());
        handle.end();
        assert!(!handle.is_busy());
    }
}
