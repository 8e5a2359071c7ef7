use clap::{Parser, Subcommand};

/// hitl-relay — human-in-the-loop approval relay for workflow engines
#[derive(Parser)]
#[command(name = "hitl-relay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve {
        /// Port to bind (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Public base URL used in approval links (overrides PUBLIC_BASE_URL)
        #[arg(long)]
        public_url: Option<String>,
    },
}
