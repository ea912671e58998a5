use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "edgeline",
    about = "Sports-betting decision engine",
    version
)]
pub struct Cli {
    /// Config directory or file path
    #[arg(long, default_value = "config", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full engine: pollers, wave timers, publisher, settlement,
    /// sentinel, and the API server
    Run {
        /// API port override
        #[arg(long)]
        port: Option<u16>,
    },

    /// Serve the API only (no background workers)
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one simulation for an event and print the decision triple
    Simulate {
        event_id: String,
        #[arg(long, default_value_t = 25_000)]
        iterations: u32,
    },

    /// Grade one pick
    Grade {
        pick_id: String,
        /// Force the settlement outcome (WIN/LOSS/PUSH/VOID)
        #[arg(long)]
        admin_override: Option<String>,
        /// Required with --admin-override
        #[arg(long)]
        admin_note: Option<String>,
    },

    /// Run store-level integrity checks (exit 3 on failure)
    IntegrityCheck {
        #[arg(long)]
        json: bool,
    },

    /// Run database migrations (exit 4 on failure)
    Migrate,

    /// Offline backfill of missing provider event ids by team-name
    /// similarity. Proposes by default; --apply writes the mappings.
    BackfillProviderIds {
        #[arg(long)]
        apply: bool,
    },
}
