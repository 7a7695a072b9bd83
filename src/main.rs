//!
//! gracied
//! -------
//! Command-line entry point for the gracie OpenID provider. Configuration
//! comes from CLI flags and `GRACIE_*` environment variables.

use std::env;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use gracie::config::{has_flag, ServerConfig, USAGE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_args_and_env(&args, |name| env::var(name).ok())?;
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "startup", "gracied {} starting: RUST_LOG='{}'", env!("CARGO_PKG_VERSION"), rust_log);

    gracie::server::run_with_config(config).await
}
