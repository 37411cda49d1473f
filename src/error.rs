// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The error type shared by every fallible operation in the library.
//!
//! Errors come in two flavours. Recoverable misuse and resource errors are
//! returned as [`Error`] values and surface as `-1` at the C ABI, leaving
//! the scheduler state untouched. Fatal configuration errors, such as a
//! timer or signal-mask install the platform refuses, cannot be recovered
//! from and terminate the process through [`fatal`].

use thiserror::Error;

/// A convenient alias for results produced by this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong with a thread-library call.
///
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A call was made before [`init`](crate::init).
    #[error("thread library has not been initialised")]
    Uninitialized,

    /// [`init`](crate::init) was called twice.
    #[error("thread library is already initialised")]
    AlreadyInitialized,

    /// The quantum length passed to [`init`](crate::init) was zero or
    /// negative.
    #[error("quantum length must be positive, got {0} microseconds")]
    InvalidQuantum(i32),

    /// The given id does not name a live thread.
    #[error("no thread with id {0}")]
    UnknownThread(i32),

    /// The number of live threads has reached the configured bound.
    #[error("cannot have more than {} live threads", crate::scheduler::MAX_THREADS)]
    ThreadLimit,

    /// The main thread cannot be blocked.
    #[error("the main thread cannot be blocked")]
    MainUnblockable,

    /// The main thread cannot sleep.
    #[error("the main thread cannot sleep")]
    MainCannotSleep,

    /// The sleep length was zero or negative.
    #[error("sleep length must be at least one quantum, got {0}")]
    InvalidSleep(i32),
}

/// Reports an unrecoverable configuration error and terminates the
/// process.
///
/// Reserved for environments the library cannot operate in at all: a
/// refused `sigaction`, `sigprocmask`, or `setitimer` install. Misuse of
/// the API never comes through here.
///
pub(crate) fn fatal(message: &str) -> ! {
    eprintln!("system error: {message}");
    std::process::exit(1);
}
