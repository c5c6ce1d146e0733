use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tetrad::manager::SystemProfile;
use tetrad::server::{TetradServer, DEFAULT_MAX_FRAME};
use tetrad::{AddressService, StoreConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, default_value = "127.0.0.1:9100")]
    addr: String,

    /// Directory for the segment log; omit to keep records in memory only.
    #[clap(long)]
    data_dir: Option<PathBuf>,

    /// Skip fsync after each record even on hosts that can afford it.
    #[clap(long)]
    no_fsync: bool,

    /// Largest accepted request body in bytes.
    #[clap(long, default_value_t = DEFAULT_MAX_FRAME)]
    max_frame: usize,
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,tetrad=info");
    }
    tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_target(false)
    .with_level(true)
    .init();

    let args = Args::parse();
    let profile = SystemProfile::detect();

    info!("--- [Tetrad Resource Manager] ---");
    info!("Detected Cores: {}", profile.logical_cores);
    info!("Worker Threads: {}", profile.worker_threads);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
    .worker_threads(profile.worker_threads)
    .enable_all()
    .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args, profile)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn async_main(args: Args, profile: SystemProfile) -> Result<(), Box<dyn std::error::Error>> {
    let strict_durability = profile.strict_durability && !args.no_fsync;

    let segment_path = match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Some(dir.join("tetrad.seg"))
        }
        None => None,
    };

    info!("Durability Mode: {}", if strict_durability { "Strict (Fsync)" } else { "High Throughput (Async)" });

    let config = StoreConfig {
        segment_path,
        strict_durability,
        ..StoreConfig::default()
    };

    info!("Initializing Address Service...");
    let service = Arc::new(AddressService::open(&config)?);

    let server = TetradServer::new(service, args.max_frame);
    let addr = args.addr.clone();
    let handle = tokio::spawn(async move { server.run(&addr).await });

    info!("Node is Ready.");

    tokio::select! {
        res = handle => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down.");
        }
    }
    Ok(())
}
