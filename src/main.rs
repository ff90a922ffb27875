use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use matter_sensor_node::callbacks::AppEventLogger;
use matter_sensor_node::config::{Config, load_dotenv};
use matter_sensor_node::instance_lock::InstanceLock;
use matter_sensor_node::matter::run_matter_stack;
#[cfg(feature = "shell")]
use matter_sensor_node::onboarding::OnboardingInfo;
#[cfg(feature = "shell")]
use matter_sensor_node::shell::{self, Console};
use matter_sensor_node::simulation::run_sensor_simulation;
use matter_sensor_node::storage::{NvsStore, keys};
use matter_sensor_node::SensorNode;

#[derive(Parser)]
#[command(name = "matter-sensor-node", version)]
#[command(about = "Matter node with temperature, pressure and humidity sensors")]
struct Cli {
    /// JSON config file; environment variables override its values
    #[arg(long, env = "NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the key/value store and Matter fabrics
    #[arg(long, env = "NODE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Network interface to bind and advertise on
    #[arg(long, env = "MATTER_INTERFACE")]
    interface: Option<String>,

    /// Don't simulate sensor readings
    #[arg(long)]
    no_simulation: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn load_config(cli: &Cli) -> matter_sensor_node::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };
    if let Some(dir) = &cli.storage_dir {
        config.storage.dir = dir.clone();
    }
    if let Some(interface) = &cli.interface {
        config.matter.interface = Some(interface.clone());
    }
    if cli.no_simulation {
        config.simulation.interval_secs = 0;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    // Sets environment variables, so it runs before any other thread exists
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    info!("Starting Matter sensor node");

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Configuration loaded:");
    info!("  Device Name: {}", config.matter.device_name);
    info!("  Vendor ID: 0x{:04X}", config.matter.vendor_id);
    info!("  Product ID: 0x{:04X}", config.matter.product_id);
    info!("  Discriminator: {}", config.matter.discriminator);
    info!("  Storage: {:?}", config.storage.dir);

    let _lock = match InstanceLock::acquire() {
        Ok(lock) => lock,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match NvsStore::init(&config.storage.dir) {
        Ok(store) => store,
        Err(e) => {
            error!("Storage init failed: {}; running without persistence", e);
            NvsStore::volatile()
        }
    };
    match store.increment(keys::BOOT_COUNT) {
        Ok(count) => info!("Boot count: {}", count),
        Err(e) => warn!("Failed to update boot count: {}", e),
    }
    let store = Arc::new(store);

    let token = CancellationToken::new();
    let node = Arc::new(SensorNode::bootstrap(&config, store, token.clone()));

    // rs-matter runs on its own thread under futures_lite; it needs a large stack
    let stack_context = node.stack_context(&config.matter, Arc::new(AppEventLogger));
    let _matter_handle = std::thread::Builder::new()
        .name("matter-stack".into())
        .stack_size(550 * 1024)
        .spawn(move || {
            if let Err(e) = futures_lite::future::block_on(run_matter_stack(stack_context)) {
                error!("Matter stack error: {:?}", e);
            }
        })
        .expect("Failed to spawn Matter thread");
    info!("Matter stack started on dedicated thread");

    let pushed = node.push_defaults();
    info!("Default values pushed to {} endpoint(s)", pushed);

    let simulation = run_sensor_simulation(
        node.attributes().clone(),
        *node.context(),
        config.simulation.interval_secs,
        token.child_token(),
    );

    #[cfg(feature = "shell")]
    {
        let console = Console::new(
            node.clone(),
            OnboardingInfo::from_config(&config.matter),
            config.matter.interface.clone(),
        );
        if let Err(e) = shell::run_shell(console, token.child_token()) {
            error!("Failed to start shell: {}", e);
        }
    }

    info!("Matter sensor node is running");
    info!("  - Press Ctrl+C to exit");

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
        _ = token.cancelled() => info!("Restart requested"),
    }

    token.cancel();
    if let Some(simulation) = simulation {
        let _ = simulation.await;
    }

    info!("Matter sensor node stopped");
    ExitCode::SUCCESS
}
