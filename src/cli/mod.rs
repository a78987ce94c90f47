pub mod commands;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "headwire")]
#[command(about = "Headline cache with resilient refresh and summaries", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/headwire/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one refresh cycle and print what happened
    Refresh,
    /// Keep refreshing on the configured interval until Ctrl-C
    Run,
    /// Show cache backend statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List retained snapshots, or show one day's headlines
    History {
        /// How many days back to list
        #[arg(short, long, default_value_t = 7)]
        days: u32,

        /// Show the snapshot for this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Remove cached headlines, snapshots and summaries
    Clear,
    /// Summarize one article
    Summary {
        /// Article URL
        url: String,

        /// Headline title, used for the prompt and the fallback text
        #[arg(short, long)]
        title: Option<String>,
    },
}
