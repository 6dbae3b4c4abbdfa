//! Queue topology comparison: in-order vs out-of-order streams,
//! dependency chains, shared sources, multiple queues, and (opt-in)
//! isolated contexts.

use qsweep::{device, Config, Device, Driver, Reporter, ResourcePool, Topology};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SWEEP_DEGREES: [usize; 5] = [1, 2, 4, 8, 16];

fn print_usage() {
    eprintln!("Usage: queue_topologies [options]");
    eprintln!();
    eprintln!("  -p, --platform <idx>    Platform index (default: 0)");
    eprintln!("  -d, --device <idx>      Device index (default: 0)");
    eprintln!("  -k, --kernels <n>       Concurrency degree; -1 runs the preset sweep {{1,2,4,8,16}}");
    eprintln!("  -i, --iterations <n>    Busy-loop iterations per kernel (default: 1)");
    eprintln!("  -e, --elements <n>      Elements per kernel (default: 1)");
    eprintln!("      --multicontext      Also run the isolated-context topology");
    eprintln!("  -h, --help              Show this help");
}

fn usage_error(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    eprintln!();
    print_usage();
    std::process::exit(-1);
}

struct Options {
    platform: usize,
    device: usize,
    kernels: i64,
    iterations: u32,
    elements: usize,
    multicontext: bool,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();

    let mut opts = Options {
        platform: 0,
        device: 0,
        kernels: 8,
        iterations: 1,
        elements: 1,
        multicontext: false,
    };

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
                opts.platform = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad platform index: {}", v)));
            }
            "-d" | "--device" => {
                let v = value(flag);
                opts.device = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad device index: {}", v)));
            }
            "-k" | "--kernels" => {
                let v = value(flag);
                opts.kernels = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad kernel count: {}", v)));
            }
            "-i" | "--iterations" => {
                let v = value(flag);
                opts.iterations = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad iteration count: {}", v)));
            }
            "-e" | "--elements" => {
                let v = value(flag);
                opts.elements = v
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("bad element count: {}", v)));
            }
            "--multicontext" => opts.multicontext = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => usage_error(&format!("unknown option: {}", other)),
        }
        i += 1;
    }

    opts
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

    let opts = parse_args();

    if opts.elements == 0 {
        usage_error("element count must be > 0");
    }

    let config = match Config::builder()
        .elements(opts.elements)
        .iterations(opts.iterations)
        .build()
    {
        Ok(config) => config,
        Err(e) => usage_error(&e.to_string()),
    };

    let selected = match device::select(opts.platform, opts.device, &config) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(-1);
        }
    };

    println!("Running on platform: {}", selected.info().platform);
    println!("Running on device: {}", selected.info().name);
    println!("Device concurrency: {}", selected.max_concurrency());

    let degrees: Vec<usize> = if opts.kernels < 0 {
        SWEEP_DEGREES.to_vec()
    } else {
        let requested = opts.kernels as usize;
        let (degree, clamped) = config.clamp_degree(requested);
        if clamped {
            println!(
                "Number of kernels is {}, which exceeds the maximum of {}.",
                requested, config.max_degree
            );
            println!("The number of kernels will be set to {} instead.", degree);
        }
        vec![degree]
    };

    let topologies: Vec<Topology> = if opts.multicontext {
        Topology::ALL.to_vec()
    } else {
        Topology::sweep().to_vec()
    };

    let pool = ResourcePool::new(selected.clone());
    let driver = match Driver::new(selected, config) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(-1);
        }
    };

    println!("Initializing tests...");
    let mut reporter = Reporter::new();
    if let Err(e) = driver.run_sweep(&pool, &topologies, &degrees, &mut reporter) {
        eprintln!("Error: {}", e);
        std::process::exit(-1);
    }
    println!("... done!");

    reporter.print_table();
}
