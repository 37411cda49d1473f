// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The callable-from-C surface of the library.
//!
//! Thin forwarders over the crate's Rust API. Every function returns
//! `0` (or an id) on success and `-1` on failure, and nothing here ever
//! unwinds across the ABI: the underlying operations report misuse as
//! error values and handle fatal conditions by terminating the process.

use crate::thread::ThreadId;
use libc::c_int;

const FAILURE: c_int = -1;
const SUCCESS: c_int = 0;

/// Initialises the thread library with a quantum of `quantum_usecs`
/// microseconds. Must be called once, before any other entry point.
#[no_mangle]
pub extern "C" fn uthread_init(quantum_usecs: c_int) -> c_int {
    match crate::init(quantum_usecs) {
        Ok(()) => SUCCESS,
        Err(_) => FAILURE,
    }
}

/// Spawns a thread running `entry_point` and returns its id.
#[no_mangle]
pub extern "C" fn uthread_spawn(entry_point: Option<extern "C" fn()>) -> c_int {
    let Some(entry) = entry_point else {
        return FAILURE;
    };
    match crate::spawn(entry) {
        Ok(tid) => tid.as_i32(),
        Err(_) => FAILURE,
    }
}

/// Terminates the thread `tid`. Terminating the main thread (id 0)
/// exits the process.
#[no_mangle]
pub extern "C" fn uthread_terminate(tid: c_int) -> c_int {
    let Some(tid) = ThreadId::from_raw(tid) else {
        return FAILURE;
    };
    match crate::terminate(tid) {
        Ok(()) => SUCCESS,
        Err(_) => FAILURE,
    }
}

/// Blocks the thread `tid` until it is resumed.
#[no_mangle]
pub extern "C" fn uthread_block(tid: c_int) -> c_int {
    let Some(tid) = ThreadId::from_raw(tid) else {
        return FAILURE;
    };
    match crate::block(tid) {
        Ok(()) => SUCCESS,
        Err(_) => FAILURE,
    }
}

/// Resumes the blocked thread `tid`.
#[no_mangle]
pub extern "C" fn uthread_resume(tid: c_int) -> c_int {
    let Some(tid) = ThreadId::from_raw(tid) else {
        return FAILURE;
    };
    match crate::resume(tid) {
        Ok(()) => SUCCESS,
        Err(_) => FAILURE,
    }
}

/// Puts the calling thread to sleep for `num_quantums` quanta.
#[no_mangle]
pub extern "C" fn uthread_sleep(num_quantums: c_int) -> c_int {
    match crate::sleep(num_quantums) {
        Ok(()) => SUCCESS,
        Err(_) => FAILURE,
    }
}

/// Returns the id of the calling thread, or `-1` before init.
#[no_mangle]
pub extern "C" fn uthread_get_tid() -> c_int {
    match crate::current_thread_id() {
        Ok(tid) => tid.as_i32(),
        Err(_) => FAILURE,
    }
}

/// Returns the number of elections since init, or `-1` before init.
#[no_mangle]
pub extern "C" fn uthread_get_total_quantums() -> c_int {
    crate::total_quantums().unwrap_or(FAILURE)
}

/// Returns the number of quanta thread `tid` has run for, or `-1` if no
/// such thread exists.
#[no_mangle]
pub extern "C" fn uthread_get_quantums(tid: c_int) -> c_int {
    let Some(tid) = ThreadId::from_raw(tid) else {
        return FAILURE;
    };
    crate::thread_quantums(tid).unwrap_or(FAILURE)
}
