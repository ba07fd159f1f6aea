use anyhow::Result;
use clap::Parser;
use log::info;
use std::time::Duration;
use tokio::runtime::Builder;

use rip_sim::{Network, ProtocolConfig, Router};

#[derive(Parser)]
#[command(name = "rip-sim", about = "Distance-vector routing simulation")]
struct Cli {
    /// JSON protocol configuration; defaults are used when omitted
    #[arg(long)]
    config: Option<String>,

    /// Seconds to let the network converge between steps
    #[arg(long, default_value_t = 10)]
    settle_secs: u64,

    /// Print routing tables as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProtocolConfig::load(path)?,
        None => ProtocolConfig::default(),
    };

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let network = Network::new(config);
        let mut routers = Vec::new();
        for _ in 0..5 {
            routers.push(network.add_router().await);
        }

        for (a, b) in [(0, 1), (1, 2), (0, 2), (1, 3), (3, 4)] {
            network.connect(&routers[a], &routers[b]).await?;
        }

        let settle = Duration::from_secs(cli.settle_secs);
        print_tables(&routers, cli.json).await?;

        tokio::time::sleep(settle).await;
        info!("=== Converged tables ===");
        print_tables(&routers, cli.json).await?;

        network.shutdown_link(&routers[1], &routers[2]).await?;

        tokio::time::sleep(settle).await;
        info!("=== Tables after R{} <-> R{} went down ===", routers[1].id(), routers[2].id());
        print_tables(&routers, cli.json).await?;

        network.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}

async fn print_tables(routers: &[Router], json: bool) -> Result<()> {
    for router in routers {
        let snapshot = router.routing_table().await;
        if json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            println!("{}", snapshot);
        }
    }
    Ok(())
}
