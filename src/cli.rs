use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "karaokebox")]
#[command(about = "Karaoke request queue for a shared screen", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server and the background workers
    Serve(ServeArgs),
    /// Index media files in the download directory that have no job yet
    Scan(ScanArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file (defaults to $KARAOKEBOX_CONFIG or config/karaokebox.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Configuration file (defaults to $KARAOKEBOX_CONFIG or config/karaokebox.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
