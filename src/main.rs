use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod cloud;
mod config;
mod dataset;
mod envfile;
mod pipeline;
mod provision;
mod transform;
mod warehouse;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    init_tracing();
    let args = RootArgs::parse();

    match args.command {
        Command::Run(args) => workflow::run_run(&args),
        Command::Upload(args) => workflow::run_upload(&args),
        Command::InitWarehouse(args) => workflow::run_init_warehouse(&args),
        Command::Deploy(args) => workflow::run_deploy(&args),
        Command::Transform(args) => workflow::run_transform(&args),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salesflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
