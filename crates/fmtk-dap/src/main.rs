use clap::Parser;
use std::path::PathBuf;

use fmtk_config::AdapterConfig;

/// Debug adapter for the game's Lua scripts, speaking DAP over stdio.
#[derive(Debug, Parser)]
#[command(name = "fmtk-dap", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// When unset the adapter uses in-memory defaults.
    #[arg(long, env = "FMTK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config);
    fmtk_config::init_tracing(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fmtk-dap starting");

    fmtk_dap::server::run_stdio(config.session).await
}

fn load_config(path: Option<PathBuf>) -> AdapterConfig {
    let Some(path) = path else {
        return AdapterConfig::default();
    };

    match AdapterConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "fmtk-dap: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            AdapterConfig::default()
        }
    }
}
