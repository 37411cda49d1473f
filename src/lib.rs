// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Preemptive user-level threading on a single kernel thread.
//!
//! This library multiplexes many lightweight threads onto the one kernel
//! thread it is initialised on. Threads are scheduled round-robin with a
//! fixed time quantum, enforced by a virtual-time interval timer whose
//! signal preempts the running thread. An application can spawn threads,
//! block and resume them, put the running thread to sleep for a number
//! of quanta, and terminate threads; quantum counters per thread and in
//! total expose the scheduling history.
//!
//! ## Initialisation and lifecycle
//!
//! [`init`] must be called exactly once, before anything else, with the
//! quantum length in microseconds. From that point the calling execution
//! is the main thread, with id 0. Terminating the main thread ends the
//! whole process.
//!
//! ## Shared state
//!
//! There is exactly one [`Scheduler`](scheduler::Scheduler) per process,
//! published through a process-wide pointer so that the preemption
//! signal handler, which receives no user context, can reach it
//! without allocating. Every other access goes through
//! [`with_scheduler`], which masks the preemption signal for the
//! duration of the call; masking the only preemptor is the library's
//! sole mutual-exclusion mechanism.
//!
//! ## The C surface
//!
//! The [`api`] module exports the same operations under a callable-
//! from-C ABI (`uthread_init`, `uthread_spawn`, …), returning `0`/ids on
//! success and `-1` on failure.

#![deny(clippy::wildcard_imports)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(unused_crate_dependencies)]

pub mod api;
mod context;
mod error;
mod scheduler;
mod signals;
mod thread;

pub use crate::error::{Error, Result};
pub use crate::scheduler::MAX_THREADS;
pub use crate::thread::stack::STACK_SIZE;
pub use crate::thread::{ThreadId, ThreadState};

use crate::scheduler::Scheduler;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// The process-wide scheduler, published by [`init`]. The signal handler
/// reads this pointer directly; everything else goes through
/// [`with_scheduler`].
///
static SCHEDULER: AtomicPtr<Scheduler> = AtomicPtr::new(ptr::null_mut());

/// Returns the raw scheduler pointer, null before [`init`].
///
pub(crate) fn scheduler_ptr() -> *mut Scheduler {
    SCHEDULER.load(Ordering::Acquire)
}

/// Runs `f` on the scheduler inside a signal-masked critical section.
///
/// Fails if the library has not been initialised. Any thread retired by
/// an earlier self-termination is released here, on the way in; by now
/// execution has long since left its stack.
///
pub(crate) fn with_scheduler<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut Scheduler) -> R,
{
    let pointer = scheduler_ptr();
    if pointer.is_null() {
        return Err(Error::Uninitialized);
    }
    Ok(signals::without_preemption(|| {
        // SAFETY: the preemption signal is masked and there is only one
        // kernel thread, so nothing else can be inside the scheduler.
        let scheduler = unsafe { &mut *pointer };
        scheduler.release_retired();
        f(scheduler)
    }))
}

/// Initialises the thread library.
///
/// The calling execution becomes the main thread (id 0), already
/// running and credited with the first quantum. The preemption timer is
/// armed with a quantum of `quantum_usecs` microseconds of virtual CPU
/// time.
///
/// Fails if the library is already initialised or the quantum is not
/// positive.
///
/// The library takes ownership of `SIGVTALRM`; a process that installs
/// its own handler for that signal cannot use this library.
///
pub fn init(quantum_usecs: i32) -> Result<()> {
    if quantum_usecs <= 0 {
        return Err(Error::InvalidQuantum(quantum_usecs));
    }
    if !scheduler_ptr().is_null() {
        return Err(Error::AlreadyInitialized);
    }

    let scheduler = Box::into_raw(Box::new(Scheduler::new(quantum_usecs)));
    // Publish before arming: once the timer is running, the handler can
    // fire at any moment and must find the scheduler.
    SCHEDULER.store(scheduler, Ordering::Release);
    // SAFETY: the pointer was just created and published; no handler has
    // run yet because the timer is not armed.
    unsafe { (*scheduler).start_preemption() };

    log::debug!("thread library initialised, quantum {quantum_usecs} us");
    Ok(())
}

/// Spawns a new thread that will execute `entry`, and returns its id.
///
/// The thread starts in the ready state, at the tail of the round-robin
/// queue. If `entry` ever returns, the thread is terminated as though it
/// had called [`terminate`] on itself.
///
pub fn spawn(entry: extern "C" fn()) -> Result<ThreadId> {
    with_scheduler(|scheduler| scheduler.spawn(entry))?
}

/// Terminates the given thread, releasing its resources.
///
/// Terminating the main thread (id 0) exits the whole process with
/// status 0. Terminating the calling thread does not return.
///
pub fn terminate(tid: ThreadId) -> Result<()> {
    if tid == ThreadId::MAIN {
        let pointer = scheduler_ptr();
        if pointer.is_null() {
            return Err(Error::Uninitialized);
        }
        signals::block_preemption();
        SCHEDULER.store(ptr::null_mut(), Ordering::Release);
        // SAFETY: the pointer came from Box::into_raw in init and was
        // just unpublished, so no other path can reach it again.
        unsafe { Box::from_raw(pointer) }.shutdown();
        log::debug!("thread library shut down by terminate(0)");
        std::process::exit(0);
    }
    with_scheduler(|scheduler| scheduler.terminate(tid))?
}

/// Blocks the given thread until it is resumed.
///
/// Blocking the calling thread switches away immediately; blocking an
/// already blocked thread is a no-op. The main thread cannot be blocked.
///
pub fn block(tid: ThreadId) -> Result<()> {
    with_scheduler(|scheduler| scheduler.block(tid))?
}

/// Makes a blocked thread eligible to run again.
///
/// Resuming a thread that is not blocked is a no-op. A thread that is
/// both blocked and sleeping stays ineligible until its sleep countdown
/// expires.
///
pub fn resume(tid: ThreadId) -> Result<()> {
    with_scheduler(|scheduler| scheduler.resume(tid))?
}

/// Puts the calling thread to sleep for `num_quantums` elections.
///
/// The caller is not elected during the next `num_quantums - 1`
/// elections and becomes eligible again at the one after. The main
/// thread cannot sleep.
///
pub fn sleep(num_quantums: i32) -> Result<()> {
    with_scheduler(|scheduler| scheduler.sleep(num_quantums))?
}

/// Returns the id of the calling thread.
///
pub fn current_thread_id() -> Result<ThreadId> {
    with_scheduler(|scheduler| scheduler.current_id())
}

/// Returns the number of elections since [`init`], the initial election
/// of the main thread included.
///
pub fn total_quantums() -> Result<i32> {
    with_scheduler(|scheduler| scheduler.total_quantums())
}

/// Returns the number of quanta the given thread has been elected for.
///
pub fn thread_quantums(tid: ThreadId) -> Result<i32> {
    with_scheduler(|scheduler| scheduler.quantums(tid))?
}
