use chrono::NaiveDate;
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};

use gtd::client::DEFAULT_SERVER;
use gtd::config::{DEFAULT_PORT, DEFAULT_SWEEP_SECS};
use gtd::model::{Category, Priority};

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[derive(Parser)]
#[command(name = "gtd", about = "Getting Things Done task board", version)]
pub struct Cli {
    /// Server URL used by client commands
    #[arg(long, env = "GTD_SERVER", global = true, default_value = DEFAULT_SERVER)]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Path to the SQLite database [default: ~/.gtd/gtd.db]
        #[arg(long, env = "GTD_DB")]
        db: Option<String>,
        /// Address to bind
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Verbose request and broadcast logging
        #[arg(long, env = "DEBUG", value_parser = FalseyValueParser::new())]
        debug: bool,
        /// Seconds between overdue sweeps (0 disables)
        #[arg(long, env = "GTD_SWEEP_INTERVAL", default_value_t = DEFAULT_SWEEP_SECS)]
        sweep_interval: u64,
        /// Do not sweep before answering list requests
        #[arg(long)]
        no_sweep_on_read: bool,
    },

    /// List tasks in storage order
    List {
        /// Only tasks in this category
        #[arg(short, long, value_parser = Category::parse)]
        category: Option<Category>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the board: one column per category plus focused
    Board {
        /// Only this column (a category or "focused")
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Add a task
    Add {
        /// Task title
        title: String,
        /// Task description
        #[arg(short, long)]
        desc: Option<String>,
        /// Category (inbox, next, waiting, scheduled, someday)
        #[arg(short, long, value_parser = Category::parse)]
        category: Option<Category>,
        /// Priority (low, medium, high)
        #[arg(short, long, value_parser = Priority::parse)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
        /// Focus immediately
        #[arg(short, long)]
        focus: bool,
        /// Time estimate tag
        #[arg(long)]
        time: Option<String>,
        /// Energy level tag
        #[arg(long)]
        energy: Option<String>,
    },

    /// Edit a task; unspecified fields keep their value
    Edit {
        /// Task id
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        desc: Option<String>,
        #[arg(short, long, value_parser = Category::parse)]
        category: Option<Category>,
        #[arg(short, long, value_parser = Priority::parse)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,
        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        energy: Option<String>,
    },

    /// Toggle completion
    Done {
        /// Task id
        id: i64,
    },

    /// Focus a task
    Focus {
        /// Task id
        id: i64,
        /// Clear focus instead
        #[arg(long)]
        off: bool,
    },

    /// Move a task to a category and position
    Move {
        /// Task id
        id: i64,
        #[arg(value_parser = Category::parse)]
        category: Category,
        position: i64,
    },

    /// Delete a task
    Rm {
        /// Task id
        id: i64,
    },

    /// Print change events as they happen
    Watch {
        /// Print raw JSON events
        #[arg(long)]
        json: bool,
    },
}
