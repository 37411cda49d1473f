// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The virtual-time interval timer that drives preemption.
//!
//! The timer counts CPU time charged to this process, not wall time, so
//! a quantum reflects actual execution rather than time spent descheduled
//! by the operating system. Every expiry delivers `SIGVTALRM`, which the
//! scheduler catches as its preemption signal.

use crate::error::fatal;

/// Arms and re-arms the process's `ITIMER_VIRTUAL`.
///
pub(crate) struct VirtualTimer {
    interval: libc::itimerval,
}

impl VirtualTimer {
    const DISARMED: libc::itimerval = libc::itimerval {
        it_interval: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        it_value: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
    };

    /// Builds a timer with the given quantum, without arming it.
    ///
    pub fn new(quantum_usecs: i32) -> VirtualTimer {
        let quantum = libc::timeval {
            tv_sec: (quantum_usecs / 1_000_000) as libc::time_t,
            tv_usec: (quantum_usecs % 1_000_000) as libc::suseconds_t,
        };
        VirtualTimer {
            interval: libc::itimerval {
                it_interval: quantum,
                it_value: quantum,
            },
        }
    }

    /// Arms the first interval and the periodic reload.
    ///
    pub fn start(&self) {
        self.arm(&self.interval);
    }

    /// Re-arms the timer from now, granting the newly elected thread a
    /// full quantum.
    ///
    pub fn reset(&self) {
        self.arm(&self.interval);
    }

    /// Stops the timer; no further preemption signals are generated.
    ///
    pub fn disarm(&self) {
        self.arm(&Self::DISARMED);
    }

    fn arm(&self, interval: &libc::itimerval) {
        // SAFETY: `interval` points to a fully initialised itimerval.
        if unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, interval, core::ptr::null_mut()) } < 0 {
            fatal("setitimer failed");
        }
    }
}
