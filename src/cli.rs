use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mediashare")]
#[command(about = "Share music with nearby devices over the local network")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Settings file (default: <data-dir>/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for settings, logs and received files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Offer files to the first device that connects
    Send {
        /// Files to offer, in this order
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Artist shown to the receiver
        #[arg(long)]
        artist: Option<String>,
    },

    /// Receive from a sender found on the network, or from --host and --port
    Receive {
        #[arg(long, requires = "port")]
        host: Option<String>,

        #[arg(long, requires = "host")]
        port: Option<u16>,

        /// Accept every offered item without asking
        #[arg(short, long)]
        yes: bool,

        /// How long to look for senders
        #[arg(long, default_value_t = 10)]
        wait_secs: u64,
    },

    /// List senders announcing on the network
    Discover {
        #[arg(long, default_value_t = 5)]
        wait_secs: u64,
    },

    /// Print the effective settings, saving any changes given
    Settings {
        #[arg(long)]
        device_name: Option<String>,

        /// Where received files go; an empty value switches back to private storage
        #[arg(long)]
        media_dir: Option<String>,

        #[arg(long)]
        chunk_size_bytes: Option<u32>,
    },
}
