// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Demonstrates concurrent execution of two user-level threads.
//!
//! Two workers run tight CPU loops and are preempted every 100 ms of
//! virtual time; the main thread watches the quantum counters and shuts
//! the process down once the schedule has gone around a few times.

use greenthreads::api::{
    uthread_get_quantums, uthread_get_total_quantums, uthread_init, uthread_spawn,
    uthread_terminate,
};

extern "C" fn worker_one() {
    let mut iterations: u64 = 0;
    loop {
        if iterations % 5_000_000 == 0 {
            println!("[thread 1] working...");
        }
        iterations = core::hint::black_box(iterations.wrapping_add(1));
    }
}

extern "C" fn worker_two() {
    let mut iterations: u64 = 0;
    loop {
        if iterations % 5_000_000 == 0 {
            println!("   [thread 2] working...");
        }
        iterations = core::hint::black_box(iterations.wrapping_add(1));
    }
}

fn main() {
    println!("--- greenthreads demo ---");

    if uthread_init(100_000) == -1 {
        eprintln!("initialisation failed");
        std::process::exit(1);
    }

    let t1 = uthread_spawn(Some(worker_one));
    let t2 = uthread_spawn(Some(worker_two));
    println!("spawned workers with ids {t1} and {t2}");

    // Stay busy so the virtual timer keeps ticking, then report and exit.
    while uthread_get_total_quantums() < 30 {
        core::hint::black_box(0u64);
    }

    println!(
        "after {} elections: main ran {}, thread {} ran {}, thread {} ran {}",
        uthread_get_total_quantums(),
        uthread_get_quantums(0),
        t1,
        uthread_get_quantums(t1),
        t2,
        uthread_get_quantums(t2),
    );

    uthread_terminate(0);
}
