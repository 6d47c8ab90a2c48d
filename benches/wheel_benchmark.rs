use criterion::{Criterion, black_box, criterion_group, criterion_main};
use intrusive_timing_wheel::wheel::TimingWheel;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

// Helper to find and remove from heap (simulating cancellation)
fn heap_cancel(heap: &mut BinaryHeap<Reverse<u64>>, target: u64) {
    let mut vec = heap.clone().into_vec();
    if let Some(pos) = vec.iter().position(|x| x.0 == target) {
        vec.remove(pos);
    }
    *heap = BinaryHeap::from(vec);
}

fn benchmark_schedule(c: &mut Criterion) {
    // 1 Million timers to make log(N) hurt
    let n = 1_000_000u64;

    let mut group = c.benchmark_group("Scheduling");
    group.sample_size(10); // Reduce samples because 1M takes time

    group.bench_function("Wheel Schedule 1M", |b| {
        b.iter(|| {
            let mut wheel = TimingWheel::new();
            for i in 0..n {
                wheel.insert(black_box(i % 10_000 + 1), black_box(i));
            }
        })
    });

    group.bench_function("Heap Push 1M", |b| {
        b.iter(|| {
            let mut heap = BinaryHeap::new();
            for i in 0..n {
                heap.push(Reverse(black_box(i % 10_000 + 1)));
            }
        })
    });
    group.finish();
}

fn benchmark_cancel(c: &mut Criterion) {
    let n = 10_000u64; // Smaller N because Heap cancel is SO slow

    let mut group = c.benchmark_group("Cancellation");

    group.bench_function("Wheel Cancel", |b| {
        b.iter_with_setup(
            || {
                let mut wheel = TimingWheel::new();
                let mut ids = Vec::with_capacity(n as usize);
                for i in 0..n {
                    ids.push(wheel.insert(i + 1, i));
                }
                (wheel, ids)
            },
            |(mut wheel, ids)| {
                for id in ids {
                    wheel.remove(id);
                }
            },
        )
    });

    group.bench_function("Heap Cancel", |b| {
        b.iter_with_setup(
            || {
                let mut heap = BinaryHeap::new();
                for i in 0..n {
                    heap.push(Reverse(i));
                }
                heap
            },
            |mut heap| {
                // Worst case O(N) per item: find it, then rebuild
                for i in 0..n {
                    heap_cancel(&mut heap, i);
                }
            },
        )
    });
    group.finish();
}

criterion_group!(benches, benchmark_schedule, benchmark_cancel);
criterion_main!(benches);
