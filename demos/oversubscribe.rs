//! Progressive oversubscription with trailing-alias handles.
//!
//! Walks eight allocation steps. At each step a fresh buffer is
//! allocated and every handle slot from the current step onward is
//! pointed at it, so earlier slots keep aliasing earlier allocations
//! while later slots all alias the newest one. One racing kernel per
//! step writes through every slot with no declared dependencies. The
//! point is that each step completes; which write wins where is
//! intentionally undefined.

use qsweep::{Config, Device, Residency, ResourcePool, Stream, StreamOrder, WorkUnit};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SLOTS: usize = 8;

fn print_usage() {
    eprintln!("Usage: oversubscribe [options]");
    eprintln!();
    eprintln!("  -d, --device <idx>      Device index (default: 0)");
    eprintln!("  -e, --elements <n>      Elements per allocation (default: 256)");
    eprintln!("      --host              Use host allocations");
    eprintln!("      --managed           Use shared allocations");
    eprintln!("  -h, --help              Show this help");
}

fn usage_error(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    eprintln!();
    print_usage();
    std::process::exit(-1);
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

    let mut device_index = 0usize;
    let mut elements = 256usize;
    let mut use_host = false;
    let mut use_managed = false;

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
            "-d" | "--device" => {
                let v = value(flag);
                device_index = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad device index: {}", v)));
            }
            "-e" | "--elements" => {
                let v = value(flag);
                elements = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad element count: {}", v)));
            }
            "--host" => use_host = true,
            "--managed" => use_managed = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => usage_error(&format!("unknown option: {}", other)),
        }
        i += 1;
    }

    let residency = if use_host {
        Residency::HostVisible
    } else if use_managed {
        Residency::SharedCoherent
    } else {
        Residency::DeviceLocal
    };

    let config = match Config::builder().elements(elements).build() {
        Ok(config) => config,
        Err(e) => usage_error(&e.to_string()),
    };

    let device = match qsweep::device::select(0, device_index, &config) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(-1);
        }
    };

    println!("Running on platform: {}", device.info().platform);
    println!("Running on device: {}", device.info().name);
    println!("Using {} allocations.", residency);

    let pool = ResourcePool::new(device.clone());
    let stream = Stream::new(device, StreamOrder::OutOfOrder);

    let mut slots: Vec<Option<qsweep::Buffer>> = vec![None; SLOTS];
    let mut total_bytes = 0u64;

    for step in 0..SLOTS {
        let buffer = match pool.allocate(1, elements, residency) {
            Ok(mut buffers) => buffers.remove(0),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(-1);
            }
        };
        total_bytes += buffer.size_bytes();

        println!("Total allocations so far: {} bytes.", total_bytes);

        // Every slot from this step onward aliases the newest buffer.
        for slot in slots.iter_mut().skip(step) {
            *slot = Some(buffer.clone());
        }

        // One racing write per slot, no dependencies declared. The
        // completion order over the aliased storage is undefined.
        for slot in slots.iter().flatten() {
            stream.submit(WorkUnit::fill(slot.clone(), step as u32 + 1), &[]);
        }
        stream.wait_all();

        println!("Kernel ran successfully.");
    }

    println!("Freeing memory...");
    drop(slots);
    drop(pool);
    println!("Done.");
}
