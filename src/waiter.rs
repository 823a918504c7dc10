// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-process adaptation of cpp-ipc's `waiter` (condition variable + mutex +
// quit flag). The original paired a named POSIX condvar/mutex pair living in
// shared memory; within a single process that collapses to `std::sync`'s
// `Mutex`/`Condvar`, which is what every blocking primitive in this crate
// (`BinarySemaphore`, `BoundedQueue`) is built on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A condition variable paired with a predicate-guarding mutex and a
/// one-shot "stop waiting" flag.
///
/// Mirrors `ipc::detail::waiter` from cpp-ipc, minus the shared-memory
/// naming: every field lives in-process.
pub struct Waiter {
    cond: Condvar,
    lock: Mutex<()>,
    quit: AtomicBool,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            cond: Condvar::new(),
            lock: Mutex::new(()),
            quit: AtomicBool::new(false),
        }
    }

    /// Block while `pred()` is true, or until `quit_waiting` is called.
    /// `timeout = None` waits indefinitely. Returns `false` on timeout,
    /// `true` if the predicate cleared (or quit was signalled) before then.
    pub fn wait_if<F>(&self, mut pred: F, timeout: Option<Duration>) -> bool
    where
        F: FnMut() -> bool,
    {
        let guard = self.lock.lock().unwrap();
        let deadline = timeout.map(|d| Instant::now().checked_add(d).unwrap_or_else(far_future));
        let mut guard = guard;
        while !self.quit.load(Ordering::Relaxed) && pred() {
            match deadline {
                None => {
                    guard = self.cond.wait(guard).unwrap();
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (g, res) = self.cond.wait_timeout(guard, deadline - now).unwrap();
                    guard = g;
                    if res.timed_out() && pred() && !self.quit.load(Ordering::Relaxed) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Wake one waiter.
    pub fn notify(&self) {
        let _g = self.lock.lock().unwrap();
        self.cond.notify_one();
    }

    /// Wake all waiters.
    pub fn broadcast(&self) {
        let _g = self.lock.lock().unwrap();
        self.cond.notify_all();
    }

    /// Signal quit and wake everyone blocked on this waiter.
    pub fn quit_waiting(&self) {
        self.quit.store(true, Ordering::Release);
        self.broadcast();
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Furthest deadline `Instant` can represent, used when `Instant::now() + d`
/// would overflow (e.g. a caller passes `Duration::MAX` instead of `None`
/// for "wait indefinitely"). `Instant` has no public "max value" constructor,
/// so derive it by probing downward from `Duration::MAX`.
fn far_future() -> Instant {
    let now = Instant::now();
    let mut d = Duration::MAX;
    loop {
        if let Some(t) = now.checked_add(d) {
            return t;
        }
        d /= 2;
    }
}
