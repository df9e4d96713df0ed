//! arbor node daemon.
//!
//! Opens the state database, seeds genesis data on a fresh chain, and runs
//! the submission controller until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use arbor_chain::{seed_genesis, Controller, GenesisConfig, NullVm, ThunkDispatcher};
use arbor_statedb::StateDb;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbor", about = "Fork-aware state database node")]
struct Options {
    /// Database directory.
    #[arg(long, default_value = "./arbor-data")]
    datadir: PathBuf,

    /// Keep all state in memory; nothing survives the process.
    #[arg(long)]
    memory: bool,

    /// Genesis configuration (JSON). Defaults to pricing every thunk at the
    /// baseline compute cost.
    #[arg(long)]
    genesis: Option<PathBuf>,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn init_tracing(opts: &Options) {
    let filter = EnvFilter::builder()
        .with_default_directive(opts.log_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_state_db(opts: &Options) -> Result<Arc<StateDb>, Box<dyn std::error::Error>> {
    let db = if opts.memory {
        StateDb::in_memory()?
    } else {
        StateDb::open(&opts.datadir)?
    };
    Ok(Arc::new(db))
}

fn load_genesis(
    opts: &Options,
    dispatcher: &ThunkDispatcher,
) -> Result<GenesisConfig, Box<dyn std::error::Error>> {
    match &opts.genesis {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(GenesisConfig::with_default_bandwidth(dispatcher)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Options::parse();
    init_tracing(&opts);

    let state_db = open_state_db(&opts)?;
    let dispatcher = ThunkDispatcher::shared();

    // A fresh chain carries no compute pricing yet; seed it before accepting
    // blocks.
    if state_db.get_root().revision() == 0 {
        let genesis = load_genesis(&opts, &dispatcher)?;
        seed_genesis(&state_db, &dispatcher, &genesis)?;
    }

    let controller = Controller::with_dispatcher(state_db, Arc::new(NullVm), dispatcher);
    info!("arbor node running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    controller.shutdown();
    Ok(())
}
