mod commands;
mod logging;

use std::path::Path;
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use tracing::error;
use undup_core::{AppConfig, DedupIndex};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match undup_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(command) => {
            if let Err(err) = run(&config, command) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run(config: &AppConfig, command: Commands) -> anyhow::Result<()> {
    if let Commands::PrintConfig = command {
        println!("Configuration: {:?}", config);
        return Ok(());
    }

    let index = DedupIndex::open(&config.db_path, config.checksum_kind()?)
        .with_context(|| format!("opening index at {}", config.db_path))?;

    match command {
        Commands::Scan { root } => {
            let roots = match root {
                Some(root) => vec![root],
                None => config.root_paths.clone(),
            };
            if roots.is_empty() {
                anyhow::bail!("no root given and no root_paths configured");
            }
            for root in roots {
                let result = index.update_all(Path::new(&root), &config.ignore_patterns)?;
                println!(
                    "{}: scan {}, hash {}, db {}",
                    root,
                    format!("{:.2}s", result.scan_duration.as_secs_f64()).green(),
                    format!("{:.2}s", result.hash_duration.as_secs_f64()).green(),
                    format!("{:.2}s", result.db_duration.as_secs_f64()).green(),
                );
                println!(
                    "{} files scanned, {} hashed, {} duplicate groups, {} files linked",
                    result.files_scanned,
                    result.files_hashed,
                    format!("{}", result.duplicate_groups).red(),
                    format!("{}", result.files_linked).red(),
                );
            }
        }
        Commands::Update { path } => {
            index.upsert(Path::new(&path))?;
        }
        Commands::Dupes { checksum } => {
            let records = index.find_duplicates(&checksum)?;
            if records.is_empty() {
                println!("No records for checksum {checksum}");
            }
            for record in records {
                let flag = if record.is_linked { "linked".green() } else { "unlinked".yellow() };
                println!("{}  {}", flag, record.path);
            }
        }
        Commands::Merge { anchor, duplicate } => {
            index.merge(&anchor, &duplicate)?;
            println!("Merged {} into {}", duplicate.red(), anchor.green());
        }
        Commands::Sweep { dupdir, symlink } => {
            let moved = index.sweep(Path::new(&dupdir), symlink)?;
            println!("{} duplicate files moved into {}", format!("{moved}").red(), dupdir);
        }
        Commands::Vacuum => {
            let removed = index.vacuum()?;
            println!("{} stale entries removed", removed);
        }
        Commands::Rename { old, new } => {
            let updated = index.rename(&old, &new)?;
            println!("{} entries renamed", updated);
        }
        Commands::Remove { path } => {
            index.remove(&path)?;
            println!("Removed entry for {path}");
        }
        Commands::Migrate => {
            // Opening the index already migrates; report where we landed.
            let version = index.database().schema_version()?;
            println!("Schema at version {}", format!("{version}").green());
        }
        Commands::PrintConfig => unreachable!("handled above"),
    }

    Ok(())
}
