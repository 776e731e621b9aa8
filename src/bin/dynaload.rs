//! dynaload CLI: load CSV/XML records into an action/topology/instance store.
//!
//! Usage:
//!   dynaload run <config> [--dry-run] [--isolate]
//!   dynaload validate <config>

use clap::{ArgAction, Parser, Subcommand};
use dynaload::{HttpStore, Loader, LoaderConfig, MemoryStore, OpenedSource, RemoteStore, RunStats};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dynaload", version, about = "Load CSV and XML records into a remote entity store")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every mapping in a config file
    Run {
        /// Path to the YAML config
        config: PathBuf,
        /// Use an in-memory store and print the payloads instead of sending them
        #[arg(long)]
        dry_run: bool,
        /// Keep going after a failing mapping
        #[arg(long)]
        isolate: bool,
    },
    /// Check a config file and report what it would load
    Validate {
        /// Path to the YAML config
        config: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config, build its mappings and open its source.
fn prepare(path: &Path) -> Result<(LoaderConfig, Loader, OpenedSource), String> {
    let config = LoaderConfig::load(path).map_err(|e| e.to_string())?;
    let mappings = config.mappings().map_err(|e| e.to_string())?;
    let source = config.source.open().map_err(|e| e.to_string())?;
    Ok((config, Loader::new(mappings), source))
}

fn print_stats(stats: &[RunStats]) {
    println!(
        "{:<24}  {:>7}  {:>9}  {:>7}  {:>10}  {:>7}",
        "MAPPING", "PASSES", "INSTANCES", "SKIPPED", "TOPOLOGIES", "FLUSHES"
    );
    println!("{}", "-".repeat(74));
    for s in stats {
        println!(
            "{:<24}  {:>7}  {:>9}  {:>7}  {:>10}  {:>7}",
            s.mapping, s.passes, s.instances, s.skipped, s.topologies, s.flushes
        );
    }
}

async fn execute(loader: &Loader, source: &OpenedSource, store: &dyn RemoteStore, isolate: bool) -> i32 {
    if isolate {
        let results = match source {
            OpenedSource::Csv(s) => loader.run_each(s, store).await,
            OpenedSource::Xml(s) => loader.run_each(s, store).await,
        };
        let results = match results {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        let mut code = 0;
        let mut stats = Vec::new();
        for result in results {
            match result {
                Ok(s) => stats.push(s),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    code = 1;
                }
            }
        }
        print_stats(&stats);
        code
    } else {
        let result = match source {
            OpenedSource::Csv(s) => loader.run(s, store).await,
            OpenedSource::Xml(s) => loader.run(s, store).await,
        };
        match result {
            Ok(stats) => {
                print_stats(&stats);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        }
    }
}

fn print_payloads(store: &MemoryStore) -> Result<(), serde_json::Error> {
    let payloads = serde_json::json!({
        "actions": store.actions(),
        "topologies": store.topologies(),
        "instances": store.instances(),
    });
    println!("{}", serde_json::to_string_pretty(&payloads)?);
    Ok(())
}

fn cmd_run(path: &Path, dry_run: bool, isolate: bool) -> i32 {
    let (config, loader, source) = match prepare(path) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    if dry_run {
        let store = MemoryStore::new();
        let code = runtime.block_on(execute(&loader, &source, &store, isolate));
        if let Err(e) = print_payloads(&store) {
            eprintln!("Error: {}", e);
            return 1;
        }
        return code;
    }

    let Some(store_config) = config.store else {
        eprintln!("Error: no store configured in '{}' (use --dry-run to load into memory)", path.display());
        return 1;
    };
    let store = HttpStore::new(store_config);
    runtime.block_on(execute(&loader, &source, &store, isolate))
}

fn cmd_validate(path: &Path) -> i32 {
    let (_, loader, source) = match prepare(path) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let survey = match &source {
        OpenedSource::Csv(s) => loader.survey(s),
        OpenedSource::Xml(s) => loader.survey(s),
    };
    match survey {
        Ok(rows) => {
            println!("{:<24}  {:>12}  {:>9}", "MAPPING", "COMBINATIONS", "RECORDS");
            println!("{}", "-".repeat(49));
            for row in rows {
                println!("{:<24}  {:>12}  {:>9}", row.mapping, row.combinations, row.records);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let code = match cli.command {
        Commands::Run {
            config,
            dry_run,
            isolate,
        } => cmd_run(&config, dry_run, isolate),
        Commands::Validate { config } => cmd_validate(&config),
    };
    std::process::exit(code);
}
