// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use asap_server::state::AppState;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "asap-server", version, about = "ASAP protocol runtime")]
struct Args {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, env = "ASAP_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Path to a TOML config file. Falls back to defaults plus
    /// environment overrides when omitted.
    #[arg(long, env = "ASAP_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Directory persisted state snapshots are rooted at.
    #[arg(long, env = "ASAP_SNAPSHOT_DIR", default_value = ".asap/snapshots")]
    snapshot_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = asap_config::load_config(args.config_file.as_deref()).context("load config")?;
    asap_telemetry::init_tracing(&config).context("initialize tracing")?;

    tokio::fs::create_dir_all(&args.snapshot_dir)
        .await
        .with_context(|| format!("create snapshot dir {}", args.snapshot_dir.display()))?;

    let state = AppState::new(config, args.snapshot_dir.clone()).context("build application state")?;
    let app = asap_server::build_app(state);

    let listener = tokio::net::TcpListener::bind(args.bind).await.with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "asap-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("serve")
}
