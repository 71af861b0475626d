////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use std::hint::black_box;
use std::iter;

use criterion::measurement::WallTime;
use criterion::{criterion_group, criterion_main, BenchmarkGroup, Criterion, Throughput};
use criterion_cycles_per_byte::CyclesPerByte;
use rand::prelude::*;
use zopflify::{easy_backward_references, Params, Quality};

fn text_like(len: usize) -> Vec<u8> {
    b"the quick brown fox jumps over the lazy dog "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

fn random_vec(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(8096);
    iter::repeat_with(|| rng.gen::<u8>()).take(len).collect()
}

fn bench_set(group: &mut BenchmarkGroup<WallTime>, name: &str, input: &[u8]) {
    let size = input.len();
    group.throughput(Throughput::Bytes(size as u64));

    group.bench_with_input(format!("two_pass {name} ({size})"), &input, |b, i| {
        b.iter(|| easy_backward_references(black_box(i), &Params::default()))
    });

    let single = Params {
        quality: Quality::SinglePass,
        lgwin: 22,
        passes: 1,
    };
    group.bench_with_input(format!("single_pass {name} ({size})"), &input, |b, i| {
        b.iter(|| easy_backward_references(black_box(i), &single))
    });
}

fn selection_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("Backward Reference Selection");

    for size in [8 << 10, 64 << 10] {
        bench_set(&mut group, "text", &text_like(size));
        bench_set(&mut group, "random", &random_vec(size));
    }

    group.finish();
}

fn cycles_bench(c: &mut Criterion<CyclesPerByte>) {
    let mut group = c.benchmark_group("Selection Cycles Per Byte");

    let input = text_like(16 << 10);
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_with_input("two_pass text (16k)", &input.as_slice(), |b, i| {
        b.iter(|| easy_backward_references(black_box(i), &Params::default()))
    });

    group.finish();
}

criterion_group!(wall, selection_bench);
criterion_group!(
    name = cycles;
    config = Criterion::default().with_measurement(CyclesPerByte);
    targets = cycles_bench
);
criterion_main!(wall, cycles);
