use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use dnstrigd::server;

#[derive(Parser)]
#[command(name = "dnstrigd", about = "DNSSEC-trigger resolver-hook daemon")]
struct Cli {
    /// Path to daemon config file (.toml or .json)
    #[arg(short, long, default_value = "/etc/dnstrigd/dnstrigd.toml")]
    config: PathBuf,

    /// Override the control server's loopback port
    #[arg(long)]
    control_port: Option<u16>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // worker count kept small: the control server handles a handful of
    // loopback panel connections, never internet-facing traffic
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let _guard = server::bootstrap::init_tracing("info");
        server::bootstrap::run(server::bootstrap::BootstrapArgs {
            config_path: cli.config,
            control_port_override: cli.control_port,
        })
        .await
        .map_err(|e| anyhow::anyhow!(e))
    })
}
