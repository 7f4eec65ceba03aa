//! nclex-cat CLI: adaptive test simulation and item bank tooling.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "nclex-cat", version, about = "NCLEX computerized adaptive testing engine")]
struct Cli {
    /// Log session activity (equivalent to RUST_LOG=nclex_cat=info)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate candidates of known ability taking the adaptive test
    Simulate {
        /// Path to a .toml item bank
        #[arg(long, conflicts_with = "synthetic")]
        bank: Option<PathBuf>,

        /// Use a seeded synthetic bank with this many items instead of --bank
        #[arg(long)]
        synthetic: Option<usize>,

        /// True abilities to simulate (comma-separated logits, e.g. "-1,0,1")
        #[arg(long, default_value = "-2,-1,-0.5,0,0.5,1,2", allow_hyphen_values = true)]
        abilities: String,

        /// Candidates per ability
        #[arg(long, default_value = "10")]
        replications: usize,

        /// Max concurrent sessions
        #[arg(long, default_value = "4")]
        parallelism: usize,

        /// Seed for candidate responses and the synthetic bank
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output directory
        #[arg(long, default_value = "./nclex-cat-results")]
        output: PathBuf,

        /// Output format: json, none
        #[arg(long, default_value = "json")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate item bank TOML files
    Validate {
        /// Path to item bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Show the most informative items at an ability level
    Inspect {
        /// Path to a .toml item bank
        #[arg(long)]
        bank: PathBuf,

        /// Ability level in logits
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        theta: f64,

        /// Number of items to show
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Print a saved simulation report
    Summarize {
        /// Simulation report JSON
        #[arg(long)]
        report: PathBuf,
    },

    /// Create starter config and example item bank
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "nclex_cat=info"
    } else {
        "nclex_cat=warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();

    let result = match cli.command {
        Commands::Simulate {
            bank,
            synthetic,
            abilities,
            replications,
            parallelism,
            seed,
            output,
            format,
            config,
        } => {
            commands::simulate::execute(
                bank,
                synthetic,
                abilities,
                replications,
                parallelism,
                seed,
                output,
                format,
                config,
            )
            .await
        }
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Inspect { bank, theta, top } => commands::inspect::execute(bank, theta, top),
        Commands::Summarize { report } => commands::summarize::execute(report),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
