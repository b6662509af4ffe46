//! CLI command definitions
//!
//! Defines the clap commands for the stepdeck CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run tests from a file under the step debugger
    Run {
        /// Path to the Ruby system test file
        file: PathBuf,

        /// Test to run (id or description); can be given multiple times.
        /// Runs every test in the file when omitted
        #[arg(long = "test", short = 't')]
        tests: Vec<String>,

        /// Port for the control UI server (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Run without pausing at any step
        #[arg(long, conflicts_with = "pause_at")]
        no_pause: bool,

        /// Pause only at the step with this index
        #[arg(long)]
        pause_at: Option<usize>,

        /// Base URL relative visits are resolved against
        #[arg(long)]
        app_host: Option<String>,

        /// Extra method name that counts as a step; can be given multiple times
        #[arg(long = "trigger")]
        triggers: Vec<String>,

        /// Do not reset the test when files in its directory change
        #[arg(long)]
        no_watch: bool,

        /// Delay after each page action, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Show the steps of one test without running it
    Steps {
        /// Path to the Ruby system test file
        file: PathBuf,

        /// Test id or description
        #[arg(long = "test", short = 't')]
        test: String,

        /// Extra method name that counts as a step
        #[arg(long = "trigger")]
        triggers: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tests declared in a file
    #[command(alias = "ls")]
    List {
        /// Path to the Ruby system test file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and where it is loaded from
    Config,

    /// View session logs
    Logs {
        /// Number of lines to show (default: 50)
        #[arg(long, short = 'n', default_value = "50")]
        lines: usize,

        /// Clear the log file
        #[arg(long)]
        clear: bool,
    },
}
