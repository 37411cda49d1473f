// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Threads: identity, scheduling state, stack, and saved context.
//!
//! A [`Thread`] is one unit of execution multiplexed onto the process's
//! single kernel thread. Each carries its own 4 KiB stack, a
//! [`JumpBuffer`] holding its suspended CPU state, a count of the quanta
//! it has been elected for, and a sleep countdown measured in quanta.
//!
//! The main thread, the execution already in progress when the library
//! is initialised, is a `Thread` like any other, except that it has no
//! entry point and its context buffer stays empty until the first
//! preemption saves into it.

pub mod stack;

use crate::context::JumpBuffer;
use crate::thread::stack::Stack;

/// Uniquely identifies a thread for as long as it lives.
///
/// Ids are small non-negative integers; a terminated thread's id becomes
/// available for reuse.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) i32);

impl ThreadId {
    /// The id of the main thread.
    ///
    pub const MAIN: ThreadId = ThreadId(0);

    /// Converts a raw C-ABI id into a `ThreadId`, rejecting negative
    /// values.
    ///
    pub fn from_raw(raw: i32) -> Option<ThreadId> {
        if raw >= 0 {
            Some(ThreadId(raw))
        } else {
            None
        }
    }

    /// Returns the numeric form of the id.
    ///
    pub const fn as_i32(&self) -> i32 {
        self.0
    }
}

/// The scheduling state of a thread.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Eligible to run and waiting in the ready queue.
    Ready,

    /// Currently executing. At most one thread is in this state.
    Running,

    /// Suspended until an explicit resume. A blocked thread may also
    /// have a sleep countdown ticking; it stays blocked when the
    /// countdown expires.
    Blocked,

    /// Suspended until its sleep countdown reaches zero.
    Sleeping,
}

/// One user-level thread.
///
pub struct Thread {
    id: ThreadId,
    state: ThreadState,
    entry: Option<extern "C" fn()>,
    stack: Stack,
    context: JumpBuffer,
    run_quantums: i32,
    sleep_remaining: i32,
}

impl Thread {
    /// Creates a thread in the `Ready` state.
    ///
    /// With an entry point present, the context is synthesised so that
    /// the first jump into it starts the trampoline on this thread's own
    /// stack. The main thread passes no entry point and keeps an empty
    /// context; its stack field is allocated like any other thread's but
    /// execution stays on the process stack it was born with.
    ///
    pub fn new(id: ThreadId, entry: Option<extern "C" fn()>) -> Thread {
        let stack = Stack::new();
        let context = if entry.is_some() {
            JumpBuffer::for_entry(&stack, run_current_thread)
        } else {
            JumpBuffer::new()
        };

        Thread {
            id,
            state: ThreadState::Ready,
            entry,
            stack,
            context,
            run_quantums: 0,
            sleep_remaining: 0,
        }
    }

    /// Returns the thread's id.
    ///
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Returns the thread's scheduling state.
    ///
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Updates the thread's scheduling state.
    ///
    pub fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    /// Returns the thread's entry point, absent for the main thread.
    ///
    pub fn entry(&self) -> Option<extern "C" fn()> {
        self.entry
    }

    /// Returns the saved context for jumping.
    ///
    pub fn context(&self) -> &JumpBuffer {
        &self.context
    }

    /// Returns the saved context for saving into.
    ///
    pub fn context_mut(&mut self) -> &mut JumpBuffer {
        &mut self.context
    }

    /// Returns the number of quanta this thread has been elected for,
    /// including its first.
    ///
    pub fn run_quantums(&self) -> i32 {
        self.run_quantums
    }

    /// Credits the thread with one more quantum.
    ///
    pub fn increment_quantum(&mut self) {
        self.run_quantums += 1;
    }

    /// Returns whether a sleep countdown is still running.
    ///
    pub fn is_sleeping(&self) -> bool {
        self.sleep_remaining > 0
    }

    /// Starts a sleep countdown of `quantums` elections.
    ///
    pub fn set_sleep(&mut self, quantums: i32) {
        debug_assert!(quantums >= 1);
        self.sleep_remaining = quantums;
    }

    /// Advances the sleep countdown by one election, if one is running.
    ///
    pub fn tick_sleep(&mut self) {
        if self.sleep_remaining > 0 {
            self.sleep_remaining -= 1;
        }
    }
}

/// The first code every spawned thread executes.
///
/// Synthesised contexts point here rather than at the user's entry so
/// that an entry which returns tears its thread down instead of running
/// off the end of a fabricated stack frame. The trampoline looks its
/// entry point up through the scheduler, runs it with preemption
/// enabled, and then terminates the current thread.
///
pub(crate) extern "C" fn run_current_thread() -> ! {
    let entry = crate::with_scheduler(|scheduler| scheduler.current_entry());
    if let Ok(Some(entry)) = entry {
        entry();
    }

    // The entry returned; this thread is finished.
    let _ = crate::with_scheduler(|scheduler| {
        let current = scheduler.current_id();
        scheduler.terminate(current)
    });
    crate::error::fatal("terminated thread context was resumed");
}
