//! Concurrent host threads feeding one shared device.
//!
//! Mirrors the thread-concurrency pattern: N driver instances, each
//! owning its own streams and logically separate buffers, synchronized
//! only through their own wait_all calls.

use qsweep::{
    Config, Driver, HostDevice, Residency, ResourcePool, Stream, StreamOrder, Topology, WorkUnit,
    Workload,
};
use std::sync::Arc;
use std::thread;

fn config(elements: usize) -> Config {
    Config::builder()
        .engines(4)
        .elements(elements)
        .iterations(0)
        .repeats(4)
        .workload(Workload::Copy)
        .build()
        .unwrap()
}

#[test]
fn two_drivers_share_one_device() {
    let config = config(256);
    let device = HostDevice::new(&config).unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let device = device.clone();
        let config = config.clone();
        handles.push(thread::spawn(move || {
            let pool = ResourcePool::new(device.clone());
            let driver = Driver::new(device, config).unwrap();
            driver.run(&pool, Topology::SingleInOrder, 2).unwrap()
        }));
    }

    for handle in handles {
        let result = handle.join().unwrap();
        assert_eq!(result.verified, Some(true));
        assert_eq!(result.mismatches, 0);
    }
}

#[test]
fn concurrent_streams_keep_buffers_separate() {
    let config = config(512);
    let device = HostDevice::new(&config).unwrap();
    let pool = Arc::new(ResourcePool::new(device.clone()));

    let mut handles = Vec::new();
    for thread_idx in 0..2u32 {
        let device = device.clone();
        let pool = pool.clone();
        handles.push(thread::spawn(move || {
            let buffer = pool
                .allocate(1, 512, Residency::SharedCoherent)
                .unwrap()
                .remove(0);
            let stream = Stream::new(device, StreamOrder::InOrder);

            let fill_value = thread_idx + 1;
            for _ in 0..32 {
                stream.submit(WorkUnit::fill(buffer.clone(), fill_value), &[]);
            }
            stream.wait_all();

            (buffer, fill_value)
        }));
    }

    for handle in handles {
        let (buffer, fill_value) = handle.join().unwrap();
        assert!(buffer.snapshot().iter().all(|&v| v == fill_value));
    }
}

// The backlogged pattern: submit every repeat up front, wait once.
#[test]
fn backlogged_submission_completes() {
    let config = config(128);
    let device = HostDevice::new(&config).unwrap();
    let pool = ResourcePool::new(device.clone());

    let buffer = pool
        .allocate(1, 128, Residency::DeviceLocal)
        .unwrap()
        .remove(0);
    let stream = Stream::new(device, StreamOrder::InOrder);

    for value in 1..=32u32 {
        stream.submit(WorkUnit::fill(buffer.clone(), value), &[]);
    }
    stream.wait_all();

    assert!(buffer.snapshot().iter().all(|&v| v == 32));
    assert_eq!(stream.outstanding(), 0);
}
