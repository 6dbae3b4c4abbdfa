//! Benchmarks comparing submission overhead across stream orderings

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qsweep::{Config, HostDevice, Residency, ResourcePool, Stream, StreamOrder, WorkUnit};

fn harness() -> (std::sync::Arc<HostDevice>, ResourcePool) {
    let config = Config::builder()
        .engines(4)
        .elements(1)
        .iterations(0)
        .build()
        .unwrap();
    let device = HostDevice::new(&config).unwrap();
    let pool = ResourcePool::new(device.clone());
    (device, pool)
}

fn submit_and_wait(stream: &Stream, buffers: &[qsweep::Buffer], chained: bool) {
    let mut prev = None;
    for buffer in buffers {
        let deps: Vec<_> = if chained {
            prev.iter().cloned().collect()
        } else {
            Vec::new()
        };
        prev = Some(stream.submit(WorkUnit::fill(buffer.clone(), 1), &deps));
    }
    stream.wait_all();
}

fn bench_in_order(c: &mut Criterion) {
    let (device, pool) = harness();
    let mut group = c.benchmark_group("in_order");

    for degree in [1usize, 4, 16].iter() {
        let buffers = pool
            .allocate(*degree, 1, Residency::DeviceLocal)
            .expect("allocation");
        group.bench_with_input(BenchmarkId::from_parameter(degree), degree, |b, _| {
            let stream = Stream::new(device.clone(), StreamOrder::InOrder);
            b.iter(|| submit_and_wait(black_box(&stream), &buffers, false))
        });
        for buffer in buffers {
            pool.release(buffer);
        }
    }

    group.finish();
}

fn bench_out_of_order(c: &mut Criterion) {
    let (device, pool) = harness();
    let mut group = c.benchmark_group("out_of_order");

    for degree in [1usize, 4, 16].iter() {
        let buffers = pool
            .allocate(*degree, 1, Residency::DeviceLocal)
            .expect("allocation");
        group.bench_with_input(BenchmarkId::from_parameter(degree), degree, |b, _| {
            let stream = Stream::new(device.clone(), StreamOrder::OutOfOrder);
            b.iter(|| submit_and_wait(black_box(&stream), &buffers, false))
        });
        for buffer in buffers {
            pool.release(buffer);
        }
    }

    group.finish();
}

fn bench_chained(c: &mut Criterion) {
    let (device, pool) = harness();
    let mut group = c.benchmark_group("chained");

    for degree in [4usize, 16].iter() {
        let buffers = pool
            .allocate(*degree, 1, Residency::DeviceLocal)
            .expect("allocation");
        group.bench_with_input(BenchmarkId::from_parameter(degree), degree, |b, _| {
            let stream = Stream::new(device.clone(), StreamOrder::OutOfOrder);
            b.iter(|| submit_and_wait(black_box(&stream), &buffers, true))
        });
        for buffer in buffers {
            pool.release(buffer);
        }
    }

    group.finish();
}

criterion_group!(benches, bench_in_order, bench_out_of_order, bench_chained);
criterion_main!(benches);
