// Copyright 2026 The GreenThreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Three spinning workers and the main thread share the CPU fairly, and
//! first elections happen in spawn order.

use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use greenthreads::ThreadId;

static NEXT_RANK: AtomicUsize = AtomicUsize::new(0);
static RANKS: [AtomicI32; 3] = [AtomicI32::new(-1), AtomicI32::new(-1), AtomicI32::new(-1)];

fn note_first_election(slot: usize) {
    let rank = NEXT_RANK.fetch_add(1, Ordering::SeqCst) as i32;
    RANKS[slot].store(rank, Ordering::SeqCst);
}

fn spin() -> ! {
    loop {
        core::hint::black_box(0u64);
    }
}

extern "C" fn worker_a() {
    note_first_election(0);
    spin()
}

extern "C" fn worker_b() {
    note_first_election(1);
    spin()
}

extern "C" fn worker_c() {
    note_first_election(2);
    spin()
}

fn main() {
    greenthreads::init(10_000).expect("init");

    let a = greenthreads::spawn(worker_a).expect("spawn a");
    let b = greenthreads::spawn(worker_b).expect("spawn b");
    let c = greenthreads::spawn(worker_c).expect("spawn c");

    // Burn CPU until the schedule has gone around ten times.
    while greenthreads::total_quantums().expect("total") < 41 {
        core::hint::black_box(0u64);
    }

    // Strict round-robin: first elections in spawn order.
    let ranks = [
        RANKS[0].load(Ordering::SeqCst),
        RANKS[1].load(Ordering::SeqCst),
        RANKS[2].load(Ordering::SeqCst),
    ];
    assert_eq!(ranks, [0, 1, 2], "workers were first elected out of order");

    // Fairness: every thread's quantum count is within one of the others.
    let quanta = [
        greenthreads::thread_quantums(ThreadId::MAIN).expect("main quanta"),
        greenthreads::thread_quantums(a).expect("a quanta"),
        greenthreads::thread_quantums(b).expect("b quanta"),
        greenthreads::thread_quantums(c).expect("c quanta"),
    ];
    let min = quanta.iter().min().unwrap();
    let max = quanta.iter().max().unwrap();
    assert!(
        max - min <= 1,
        "unfair schedule: quantum counts {quanta:?}"
    );

    greenthreads::terminate(ThreadId::MAIN).expect("terminate main");
    unreachable!("terminate(main) returned");
}
