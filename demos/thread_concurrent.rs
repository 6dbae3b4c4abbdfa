//! Host-thread concurrency against one shared device.
//!
//! Two host threads each drive their own in-order stream over logically
//! separate buffers, first waiting per trial, then backlogging every
//! submission before a single wait. The only cross-thread
//! synchronization is whatever the device imposes.

use qsweep::{Config, Device, HostDevice, Residency, ResourcePool, Stream, StreamOrder, WorkUnit};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const TEST_ITERATIONS: u32 = 32;

fn print_usage() {
    eprintln!("Usage: thread_concurrent [options]");
    eprintln!();
    eprintln!("  -p, --platform <idx>    Platform index (default: 0)");
    eprintln!("  -d, --device <idx>      Device index (default: 0)");
    eprintln!("  -i, --iterations <n>    Busy-loop iterations per kernel (default: 1)");
    eprintln!("  -e, --elements <n>      Elements per kernel (default: 1)");
    eprintln!("  -h, --help              Show this help");
}

fn usage_error(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    eprintln!();
    print_usage();
    std::process::exit(-1);
}

// One trial per wait: submit, wait, time the pair, repeat.
fn go(device: Arc<dyn Device>, buffer: qsweep::Buffer, iterations: u32, tag: usize) -> f64 {
    let stream = Stream::new(device, StreamOrder::InOrder);
    stream.submit(WorkUnit::fill(buffer.clone(), 0), &[]);
    stream.wait_all();

    let mut total = 0.0f64;
    for _ in 0..TEST_ITERATIONS {
        let start = Instant::now();
        stream.submit(WorkUnit::delay(buffer.clone(), iterations), &[]);
        stream.wait_all();
        total += start.elapsed().as_secs_f64();
    }

    let average = total / TEST_ITERATIONS as f64;
    println!("{:>40} (i={:>3}): Average time: {:.6} seconds", "go", tag, average);
    average
}

// Backlogged: submit every trial up front, then one wait.
fn go2(device: Arc<dyn Device>, buffer: qsweep::Buffer, iterations: u32, tag: usize) -> f64 {
    let stream = Stream::new(device, StreamOrder::InOrder);
    stream.submit(WorkUnit::fill(buffer.clone(), 0), &[]);
    stream.wait_all();

    let start = Instant::now();
    for _ in 0..TEST_ITERATIONS {
        stream.submit(WorkUnit::delay(buffer.clone(), iterations), &[]);
    }
    stream.wait_all();
    let elapsed = start.elapsed().as_secs_f64();

    let average = elapsed / TEST_ITERATIONS as f64;
    println!("{:>40} (i={:>3}): Average time: {:.6} seconds", "go2", tag, average);
    average
}

fn main() {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
                ),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut platform = 0usize;
    let mut device_index = 0usize;
    let mut iterations = 1u32;
    let mut elements = 1usize;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = |name: &str| -> String {
            i += 1;
            if i >= args.len() {
                usage_error(&format!("{} requires a value", name));
            }
            args[i].clone()
        };

        match flag {
            "-p" | "--platform" => {
                let v = value(flag);
                platform = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad platform index: {}", v)));
            }
            "-d" | "--device" => {
                let v = value(flag);
                device_index = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad device index: {}", v)));
            }
            "-i" | "--iterations" => {
                let v = value(flag);
                iterations = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad iteration count: {}", v)));
            }
            "-e" | "--elements" => {
                let v = value(flag);
                elements = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad element count: {}", v)));
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => usage_error(&format!("unknown option: {}", other)),
        }
        i += 1;
    }

    let config = match Config::builder()
        .elements(elements)
        .iterations(iterations)
        .build()
    {
        Ok(config) => config,
        Err(e) => usage_error(&e.to_string()),
    };

    let device = match qsweep::device::select(platform, device_index, &config) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(-1);
        }
    };

    println!("Running on platform: {}", device.info().platform);
    println!("Running on device: {}", device.info().name);

    println!("Initializing tests...");
    let pool = ResourcePool::new(device.clone());
    let buffers = match pool.allocate(2, elements, Residency::DeviceLocal) {
        Ok(buffers) => buffers,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(-1);
        }
    };
    println!("... done!");

    println!("Testing without threads");
    go(device.clone(), buffers[0].clone(), iterations, 0);

    println!("Testing with threads");
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let thread_device = device.clone();
        let thread_buffer = buffers[0].clone();
        let handle = thread::spawn(move || {
            let average = go(thread_device, thread_buffer, iterations, 0);
            tx.send(average).ok();
        });

        go(device.clone(), buffers[1].clone(), iterations, 1);

        handle.join().expect("benchmark thread panicked");
        rx.recv().ok();
    }

    println!("Testing with threads 2");
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let thread_device = device.clone();
        let thread_buffer = buffers[0].clone();
        let handle = thread::spawn(move || {
            let average = go2(thread_device, thread_buffer, iterations, 0);
            tx.send(average).ok();
        });

        go2(device.clone(), buffers[1].clone(), iterations, 1);

        handle.join().expect("benchmark thread panicked");
        rx.recv().ok();
    }

    println!("Cleaning up...");
    for buffer in buffers {
        pool.release(buffer);
    }
    println!("... done!");
}
