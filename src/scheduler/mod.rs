// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The round-robin scheduler and its election algorithm.
//!
//! The scheduler owns every live [`Thread`], the FIFO ready queue, and
//! the quantum accounting. It is entered from two directions: the
//! preemption handler, fired by the [`VirtualTimer`](timer::VirtualTimer)
//! when the running thread's quantum expires, and voluntary switches,
//! when the running thread blocks itself, goes to sleep, or terminates
//! itself. Both directions converge on [`Scheduler::reschedule`], which
//! saves the outgoing context, elects the queue head, and jumps.
//!
//! ## The signal path
//!
//! [`preemption_handler`] runs with the preemption signal masked by the
//! kernel and must stay async-signal-safe: it performs no allocation
//! (the ready queue is pre-reserved and never grows past the thread
//! bound), takes no locks, and emits no output. Everything that
//! allocates or frees happens in API calls under an explicit signal
//! gate, never on the interrupt path.

pub mod timer;

use crate::context::SavePoint;
use crate::error::{fatal, Error, Result};
use crate::signals;
use crate::thread::{Thread, ThreadId, ThreadState};
use std::collections::{BTreeMap, VecDeque};
use self::timer::VirtualTimer;

/// The largest number of simultaneously live threads, the main thread
/// included. Ids live in `0..MAX_THREADS`, so the bound also caps the id
/// space.
///
pub const MAX_THREADS: usize = 100;

/// What the outgoing thread looks like when an election starts.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outgoing {
    /// The timer expired; the outgoing thread is still running and goes
    /// back to the tail of the ready queue.
    Preempted,

    /// The outgoing thread blocked itself or went to sleep; its state is
    /// already set and it must not be re-enqueued.
    Voluntary,

    /// The outgoing thread terminated itself and has already been
    /// removed; there is nothing to save a context into.
    Gone,
}

/// The round-robin thread scheduler.
///
/// Exactly one exists per process, reachable from the signal handler
/// through the pointer published by [`init`](crate::init).
///
pub struct Scheduler {
    /// Every live thread, owned exclusively by this map.
    threads: BTreeMap<ThreadId, Box<Thread>>,

    /// Ids of `Ready` threads, in election order. Pre-reserved to the
    /// thread bound so the preemption path never allocates.
    ready: VecDeque<ThreadId>,

    /// The id of the one `Running` thread.
    current: ThreadId,

    /// Cursor for id allocation; wraps within `1..MAX_THREADS`.
    next_id: i32,

    /// Elections performed since init, counting the implicit first
    /// election of the main thread.
    total_quantums: i32,

    timer: VirtualTimer,

    /// A thread that terminated itself. Its stack is still in use until
    /// the jump away from it completes, so destruction is deferred to
    /// the next scheduler entry.
    retired: Option<Box<Thread>>,
}

impl Scheduler {
    /// Builds a scheduler whose main thread (id 0) is running and has
    /// been credited with the first quantum. The timer is not armed
    /// until [`start_preemption`](Scheduler::start_preemption).
    ///
    pub(crate) fn new(quantum_usecs: i32) -> Scheduler {
        let mut main = Box::new(Thread::new(ThreadId::MAIN, None));
        main.set_state(ThreadState::Running);
        main.increment_quantum();

        let mut threads = BTreeMap::new();
        threads.insert(ThreadId::MAIN, main);

        Scheduler {
            threads,
            ready: VecDeque::with_capacity(MAX_THREADS),
            current: ThreadId::MAIN,
            next_id: 1,
            total_quantums: 1,
            timer: VirtualTimer::new(quantum_usecs),
            retired: None,
        }
    }

    /// Installs the preemption handler and arms the timer. Called once,
    /// after the scheduler pointer has been published, so that the first
    /// expiry already finds the scheduler.
    ///
    pub(crate) fn start_preemption(&self) {
        signals::install_preemption_handler(preemption_handler);
        self.timer.start();
    }

    /// Final teardown on the way out of the process: stop the timer and
    /// release the thread table. When the caller is a spawned thread the
    /// table owns the very stack we are standing on, so the memory is
    /// leaked instead; the process is about to exit either way.
    ///
    pub(crate) fn shutdown(self: Box<Self>) {
        self.timer.disarm();
        if self.current == ThreadId::MAIN {
            drop(self);
        } else {
            let _ = Box::leak(self);
        }
    }

    /// Drops a thread retired by a self-termination. Runs on every
    /// gate-protected scheduler entry; by then execution has left the
    /// retired thread's stack for good.
    ///
    pub(crate) fn release_retired(&mut self) {
        self.retired = None;
    }

    fn thread_mut(&mut self, id: ThreadId) -> &mut Thread {
        self.threads
            .get_mut(&id)
            .expect("scheduler invariant: id resolves to a live thread")
    }

    /// Allocates the next free id: monotonic, skipping live ids,
    /// wrapping within `1..MAX_THREADS`.
    ///
    fn allocate_id(&mut self) -> Result<ThreadId> {
        if self.threads.len() >= MAX_THREADS {
            return Err(Error::ThreadLimit);
        }
        loop {
            let candidate = ThreadId(self.next_id);
            self.next_id += 1;
            if self.next_id as usize >= MAX_THREADS {
                self.next_id = 1;
            }
            if !self.threads.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Creates a thread in the `Ready` state and appends it to the
    /// ready queue.
    ///
    pub(crate) fn spawn(&mut self, entry: extern "C" fn()) -> Result<ThreadId> {
        let id = self.allocate_id()?;
        let thread = Box::new(Thread::new(id, Some(entry)));
        self.threads.insert(id, thread);
        self.ready.push_back(id);
        log::debug!("spawned thread {}", id.as_i32());
        Ok(id)
    }

    /// Destroys the given thread. Terminating the current thread does
    /// not return: the thread is moved to the retired slot and an
    /// election with [`Outgoing::Gone`] jumps away from its stack.
    ///
    /// Termination of the main thread is a whole-process exit and is
    /// handled by the lifecycle layer before the scheduler is involved.
    ///
    pub(crate) fn terminate(&mut self, id: ThreadId) -> Result<()> {
        let thread = self
            .threads
            .remove(&id)
            .ok_or(Error::UnknownThread(id.as_i32()))?;
        self.ready.retain(|&queued| queued != id);
        log::debug!("terminated thread {}", id.as_i32());

        if id == self.current {
            self.retired = Some(thread);
            self.reschedule(Outgoing::Gone);
            unreachable!("terminated thread was re-elected");
        }

        Ok(())
    }

    /// Moves the given thread to the `Blocked` state. Blocking the
    /// current thread switches away immediately; blocking an already
    /// blocked thread is a no-op.
    ///
    pub(crate) fn block(&mut self, id: ThreadId) -> Result<()> {
        if id == ThreadId::MAIN {
            return Err(Error::MainUnblockable);
        }
        let state = self
            .threads
            .get(&id)
            .ok_or(Error::UnknownThread(id.as_i32()))?
            .state();

        match state {
            ThreadState::Blocked => {}
            ThreadState::Ready => {
                self.thread_mut(id).set_state(ThreadState::Blocked);
                self.ready.retain(|&queued| queued != id);
            }
            ThreadState::Sleeping => {
                // The countdown keeps ticking; expiry leaves the thread
                // blocked until an explicit resume.
                self.thread_mut(id).set_state(ThreadState::Blocked);
            }
            ThreadState::Running => {
                self.thread_mut(id).set_state(ThreadState::Blocked);
                self.reschedule(Outgoing::Voluntary);
            }
        }
        Ok(())
    }

    /// Makes a blocked thread eligible again. A thread whose sleep
    /// countdown is still running loses only its blocked flag and stays
    /// ineligible until the countdown expires. Resuming a thread that is
    /// not blocked is a no-op.
    ///
    pub(crate) fn resume(&mut self, id: ThreadId) -> Result<()> {
        let thread = self
            .threads
            .get_mut(&id)
            .ok_or(Error::UnknownThread(id.as_i32()))?;

        if thread.state() == ThreadState::Blocked {
            if thread.is_sleeping() {
                thread.set_state(ThreadState::Sleeping);
            } else {
                thread.set_state(ThreadState::Ready);
                self.ready.push_back(id);
            }
        }
        Ok(())
    }

    /// Puts the current thread to sleep for `num_quantums` elections and
    /// switches away. The caller becomes eligible again when the
    /// countdown, ticked once per election, reaches zero.
    ///
    pub(crate) fn sleep(&mut self, num_quantums: i32) -> Result<()> {
        if self.current == ThreadId::MAIN {
            return Err(Error::MainCannotSleep);
        }
        if num_quantums < 1 {
            return Err(Error::InvalidSleep(num_quantums));
        }

        let current = self.current;
        let thread = self.thread_mut(current);
        thread.set_sleep(num_quantums);
        thread.set_state(ThreadState::Sleeping);
        self.reschedule(Outgoing::Voluntary);
        Ok(())
    }

    /// Returns the id of the running thread.
    ///
    pub(crate) fn current_id(&self) -> ThreadId {
        self.current
    }

    /// Returns the running thread's entry point.
    ///
    pub(crate) fn current_entry(&self) -> Option<extern "C" fn()> {
        self.threads.get(&self.current).and_then(|thread| thread.entry())
    }

    /// Returns the number of elections since init.
    ///
    pub(crate) fn total_quantums(&self) -> i32 {
        self.total_quantums
    }

    /// Returns the number of quanta the given thread has run for.
    ///
    pub(crate) fn quantums(&self, id: ThreadId) -> Result<i32> {
        self.threads
            .get(&id)
            .map(|thread| thread.run_quantums())
            .ok_or(Error::UnknownThread(id.as_i32()))
    }

    /// Ticks every running sleep countdown. A countdown that reaches
    /// zero wakes its thread onto the ready queue, unless the thread is
    /// also blocked, in which case only the countdown clears.
    ///
    fn wake_sleepers(&mut self) {
        let Scheduler { threads, ready, .. } = self;
        for (&id, thread) in threads.iter_mut() {
            if thread.is_sleeping() {
                thread.tick_sleep();
                if !thread.is_sleeping() && thread.state() == ThreadState::Sleeping {
                    thread.set_state(ThreadState::Ready);
                    ready.push_back(id);
                }
            }
        }
    }

    /// The central election: hand off the CPU from the outgoing thread
    /// to the head of the ready queue.
    ///
    /// For the outgoing thread this returns twice. The first, direct
    /// pass saves its context and jumps away; the call then "returns"
    /// again when some later election jumps back, and control continues
    /// in whatever gate-protected path originally called in. The
    /// [`Outgoing::Gone`] variant never returns at all.
    ///
    pub(crate) fn reschedule(&mut self, outgoing: Outgoing) {
        self.wake_sleepers();

        if outgoing == Outgoing::Preempted {
            let outgoing_id = self.current;
            let thread = self.thread_mut(outgoing_id);
            if thread.state() == ThreadState::Running {
                thread.set_state(ThreadState::Ready);
                self.ready.push_back(outgoing_id);
            }
        }

        if outgoing != Outgoing::Gone {
            let outgoing_id = self.current;
            if self.thread_mut(outgoing_id).context_mut().save() == SavePoint::Resumed {
                // We are the thread just elected by a later election.
                signals::unblock_preemption();
                return;
            }
        }

        let elected = match self.ready.pop_front() {
            Some(id) => id,
            None => {
                if outgoing == Outgoing::Gone {
                    // Unreachable by construction: the main thread can
                    // neither block itself, sleep, nor self-terminate,
                    // so some schedulable thread always remains.
                    fatal("no runnable threads remain");
                }
                // Every other thread is blocked or sleeping; the
                // outgoing thread keeps the CPU.
                let outgoing_id = self.current;
                self.thread_mut(outgoing_id).set_state(ThreadState::Running);
                return;
            }
        };

        self.current = elected;
        self.total_quantums += 1;
        let thread = self.thread_mut(elected);
        thread.set_state(ThreadState::Running);
        thread.increment_quantum();
        self.timer.reset();

        let context = self
            .threads
            .get(&elected)
            .expect("scheduler invariant: elected thread is live")
            .context();
        // SAFETY: the context was filled either by the save above a
        // still-suspended election frame or by synthetic initialisation
        // over a stack this scheduler owns.
        unsafe { context.jump() }
    }
}

/// The preemption signal handler: the running thread's quantum is over.
///
/// Runs with the preemption signal masked by the kernel. Only
/// async-signal-safe operations are permitted here; in particular no
/// allocation and no logging.
///
pub(crate) extern "C" fn preemption_handler(_signal: libc::c_int) {
    let scheduler = crate::scheduler_ptr();
    if scheduler.is_null() {
        return;
    }
    // SAFETY: the pointer was published by init and is only unpublished
    // on the way out of the process; the gate discipline guarantees no
    // other access is in progress when the handler fires.
    unsafe { (*scheduler).reschedule(Outgoing::Preempted) }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop() {}

    fn scheduler() -> Scheduler {
        // The timer is never armed in these tests; all checks exercise
        // pure bookkeeping.
        Scheduler::new(100_000)
    }

    fn assert_queue_matches_states(scheduler: &Scheduler) {
        let queued: Vec<ThreadId> = scheduler.ready.iter().copied().collect();
        let mut unique = queued.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), queued.len(), "duplicate id in ready queue");

        for (&id, thread) in &scheduler.threads {
            let in_queue = queued.contains(&id);
            let should_be = thread.state() == ThreadState::Ready;
            assert_eq!(in_queue, should_be, "queue mismatch for {id:?}");
        }
    }

    #[test]
    fn init_state_counts_the_first_election_of_main() {
        let scheduler = scheduler();
        assert_eq!(scheduler.current_id(), ThreadId::MAIN);
        assert_eq!(scheduler.total_quantums(), 1);
        assert_eq!(scheduler.quantums(ThreadId::MAIN), Ok(1));
        assert_queue_matches_states(&scheduler);
    }

    #[test]
    fn spawned_ids_are_monotonic() {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.spawn(noop), Ok(ThreadId(1)));
        assert_eq!(scheduler.spawn(noop), Ok(ThreadId(2)));
        assert_eq!(scheduler.spawn(noop), Ok(ThreadId(3)));
        assert_queue_matches_states(&scheduler);
    }

    #[test]
    fn freed_ids_are_not_reused_until_the_cursor_wraps() {
        let mut scheduler = scheduler();
        for expected in 1..4 {
            assert_eq!(scheduler.spawn(noop), Ok(ThreadId(expected)));
        }
        scheduler.terminate(ThreadId(2)).unwrap();
        // The cursor is past 2, so the next id is 4, not the freed 2.
        assert_eq!(scheduler.spawn(noop), Ok(ThreadId(4)));
        assert_queue_matches_states(&scheduler);
    }

    #[test]
    fn id_allocation_wraps_over_freed_ids() {
        let mut scheduler = scheduler();
        for expected in 1..MAX_THREADS as i32 {
            assert_eq!(scheduler.spawn(noop), Ok(ThreadId(expected)));
        }
        assert_eq!(scheduler.spawn(noop), Err(Error::ThreadLimit));

        scheduler.terminate(ThreadId(5)).unwrap();
        assert_eq!(scheduler.spawn(noop), Ok(ThreadId(5)));
        assert_eq!(scheduler.spawn(noop), Err(Error::ThreadLimit));
    }

    #[test]
    fn terminating_a_queued_thread_removes_it_everywhere() {
        let mut scheduler = scheduler();
        let id = scheduler.spawn(noop).unwrap();
        scheduler.terminate(id).unwrap();
        assert_eq!(scheduler.quantums(id), Err(Error::UnknownThread(1)));
        assert_queue_matches_states(&scheduler);
    }

    #[test]
    fn terminating_an_unknown_thread_fails() {
        let mut scheduler = scheduler();
        assert_eq!(
            scheduler.terminate(ThreadId(42)),
            Err(Error::UnknownThread(42))
        );
    }

    #[test]
    fn block_removes_from_the_queue_and_resume_appends_at_the_tail() {
        let mut scheduler = scheduler();
        let first = scheduler.spawn(noop).unwrap();
        let second = scheduler.spawn(noop).unwrap();

        scheduler.block(first).unwrap();
        assert_queue_matches_states(&scheduler);
        assert_eq!(scheduler.ready.front(), Some(&second));

        scheduler.resume(first).unwrap();
        assert_queue_matches_states(&scheduler);
        // Resume re-enqueues at the tail, behind threads that were
        // already ready.
        assert_eq!(scheduler.ready.front(), Some(&second));
        assert_eq!(scheduler.ready.back(), Some(&first));
    }

    #[test]
    fn block_and_resume_are_idempotent() {
        let mut scheduler = scheduler();
        let id = scheduler.spawn(noop).unwrap();

        scheduler.block(id).unwrap();
        scheduler.block(id).unwrap();
        assert_queue_matches_states(&scheduler);

        scheduler.resume(id).unwrap();
        scheduler.resume(id).unwrap();
        assert_queue_matches_states(&scheduler);
        assert_eq!(scheduler.ready.iter().filter(|&&q| q == id).count(), 1);
    }

    #[test]
    fn main_cannot_be_blocked() {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.block(ThreadId::MAIN), Err(Error::MainUnblockable));
    }

    #[test]
    fn main_cannot_sleep() {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.sleep(3), Err(Error::MainCannotSleep));
    }

    #[test]
    fn sleeping_threads_wake_onto_the_queue_tail() {
        let mut scheduler = scheduler();
        let sleeper = scheduler.spawn(noop).unwrap();
        let other = scheduler.spawn(noop).unwrap();

        // Put the spawned thread to sleep by hand; sleep() itself only
        // acts on the current thread and would switch away.
        scheduler.ready.retain(|&queued| queued != sleeper);
        let thread = scheduler.thread_mut(sleeper);
        thread.set_sleep(2);
        thread.set_state(ThreadState::Sleeping);
        assert_queue_matches_states(&scheduler);

        scheduler.wake_sleepers();
        assert_queue_matches_states(&scheduler);
        assert_eq!(scheduler.quantums(sleeper), Ok(0));

        scheduler.wake_sleepers();
        assert_queue_matches_states(&scheduler);
        assert_eq!(scheduler.ready.front(), Some(&other));
        assert_eq!(scheduler.ready.back(), Some(&sleeper));
    }

    #[test]
    fn a_blocked_sleeper_stays_blocked_when_the_countdown_expires() {
        let mut scheduler = scheduler();
        let sleeper = scheduler.spawn(noop).unwrap();

        scheduler.ready.retain(|&queued| queued != sleeper);
        let thread = scheduler.thread_mut(sleeper);
        thread.set_sleep(1);
        thread.set_state(ThreadState::Sleeping);

        scheduler.block(sleeper).unwrap();
        scheduler.wake_sleepers();

        let thread = scheduler.thread_mut(sleeper);
        assert_eq!(thread.state(), ThreadState::Blocked);
        assert!(!thread.is_sleeping());
        assert_queue_matches_states(&scheduler);

        scheduler.resume(sleeper).unwrap();
        assert_eq!(scheduler.thread_mut(sleeper).state(), ThreadState::Ready);
        assert_queue_matches_states(&scheduler);
    }

    #[test]
    fn resuming_a_blocked_sleeper_leaves_it_ineligible() {
        let mut scheduler = scheduler();
        let sleeper = scheduler.spawn(noop).unwrap();

        scheduler.ready.retain(|&queued| queued != sleeper);
        let thread = scheduler.thread_mut(sleeper);
        thread.set_sleep(2);
        thread.set_state(ThreadState::Blocked);

        scheduler.resume(sleeper).unwrap();
        let thread = scheduler.thread_mut(sleeper);
        assert_eq!(thread.state(), ThreadState::Sleeping);
        assert!(thread.is_sleeping());
        assert_queue_matches_states(&scheduler);

        // The countdown finishes and the thread becomes eligible.
        scheduler.wake_sleepers();
        scheduler.wake_sleepers();
        assert_eq!(scheduler.thread_mut(sleeper).state(), ThreadState::Ready);
        assert_queue_matches_states(&scheduler);
    }

    #[test]
    fn resuming_a_non_blocked_thread_is_a_no_op() {
        let mut scheduler = scheduler();
        let id = scheduler.spawn(noop).unwrap();
        scheduler.resume(id).unwrap();
        assert_eq!(scheduler.ready.iter().filter(|&&q| q == id).count(), 1);
        assert_queue_matches_states(&scheduler);
    }

    #[test]
    fn ready_queue_never_allocates_after_init() {
        let scheduler = scheduler();
        assert!(scheduler.ready.capacity() >= MAX_THREADS);
    }
}
