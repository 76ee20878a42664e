use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tether_gateway::api::ApiServer;
use tether_gateway::registry::DeviceRegistry;
use tether_gateway::{db, Config};

/// Tether - device trust and proximity gateway
#[derive(Parser)]
#[command(name = "tether", version, about)]
struct Cli {
    /// Address to bind on
    #[arg(long, env = "TETHER_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "TETHER_PORT")]
    port: Option<u16>,

    /// Path to the gateway database
    #[arg(long, env = "TETHER_DB")]
    db: Option<std::path::PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List registered devices for a user
    Devices {
        /// User ID to list devices for
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,tether_gateway=info",
        1 => "info,tether_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(db_path) = cli.db {
        config.db_path = db_path;
    }

    let pool = db::init(&config.db_path)?;

    if let Some(Command::Devices { user }) = cli.command {
        return list_devices(pool, &user);
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        db = %config.db_path.display(),
        "starting tether gateway"
    );

    ApiServer::new(&config, pool).run().await?;
    Ok(())
}

fn list_devices(pool: tether_gateway::DbPool, user: &str) -> anyhow::Result<()> {
    let registry = DeviceRegistry::new(pool);
    let devices = registry.list(user)?;

    if devices.is_empty() {
        println!("no devices registered for {user}");
        return Ok(());
    }

    for device in devices {
        println!(
            "{}  {}  {}  {}  last seen {}",
            device.id, device.name, device.device_type, device.trust_state, device.last_seen_at
        );
    }
    Ok(())
}
