mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use karaokebox::config::Config;
use karaokebox::observability;
use karaokebox::queue::JobStore;
use karaokebox::queue::library::sync_library;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let mut config = Config::load_with(args.config)?;
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            observability::init_logging(&config.logging)?;
            karaokebox::api::run(config).await?;
        }
        Commands::Scan(args) => {
            let config = Config::load_with(args.config)?;
            observability::init_logging(&config.logging)?;

            std::fs::create_dir_all(&config.server.download_dir)?;
            let store = JobStore::open(&config.server.db_path, config.server.download_dir.clone())?;
            let adopted = sync_library(&store)?;
            println!("{adopted}");
        }
    }

    Ok(())
}
