//! prepd — operational CLI
//!
//! Command-line access to cache status/clear and interview record
//! inspection without running the full pipeline.

use anyhow::Context;
use clap::{value_parser, Arg, Command};
use prepd_cache::ExpiringCache;
use prepd_store::{InterviewStatus, InterviewStore, RecordId, StoreConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// Optional TOML configuration
#[derive(Debug, Default, Deserialize)]
struct CliConfig {
    /// Root for the cache and store directories
    data_dir: Option<PathBuf>,
    /// Store thresholds and similarity parameters
    #[serde(default)]
    store: Option<StoreConfig>,
}

fn load_config(path: Option<&String>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
    toml::from_str(&text).with_context(|| format!("parsing config {path}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Command::new("prepd")
        .version("0.1.0")
        .about("Interview research core - cache and record operations")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .global(true)
                .default_value(".prepd")
                .help("Root directory for cache and record storage"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to a TOML config file"),
        )
        .subcommand(
            Command::new("cache")
                .about("Research cache operations")
                .subcommand_required(true)
                .subcommand(Command::new("status").about("Show cache statistics"))
                .subcommand(
                    Command::new("clear")
                        .about("Remove cached entries")
                        .arg(
                            Arg::new("category")
                                .long("category")
                                .help("Only clear entries of this category"),
                        ),
                ),
        )
        .subcommand(
            Command::new("store")
                .about("Interview record operations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .about("List records, oldest first")
                        .arg(
                            Arg::new("status")
                                .long("status")
                                .value_parser(value_parser!(InterviewStatus))
                                .help("Only records with this status"),
                        )
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .default_value("50")
                                .value_parser(value_parser!(usize)),
                        ),
                )
                .subcommand(
                    Command::new("show")
                        .about("Print one record as JSON")
                        .arg(Arg::new("id").required(true)),
                )
                .subcommand(Command::new("counts").about("Status distribution"))
                .subcommand(
                    Command::new("archive")
                        .about("Move a record to archived")
                        .arg(Arg::new("id").required(true)),
                ),
        );

    let matches = cli.get_matches();

    let config = load_config(matches.get_one::<String>("config"))?;
    let data_dir = config.data_dir.clone().unwrap_or_else(|| {
        PathBuf::from(
            matches
                .get_one::<String>("data-dir")
                .map(String::as_str)
                .unwrap_or(".prepd"),
        )
    });

    match matches.subcommand() {
        Some(("cache", cache_matches)) => {
            let cache = ExpiringCache::open(data_dir.join("cache"));
            match cache_matches.subcommand() {
                Some(("status", _)) => {
                    let stats = cache.stats();
                    println!("Cache status");
                    println!("  Entries:           {}", stats.count);
                    println!("  Size:              {} bytes", stats.size_bytes);
                    println!("  Hits (session):    {}", stats.hits);
                    println!("  Misses (session):  {}", stats.misses);
                    println!("  Estimated savings: ${:.3}", stats.estimated_savings);
                }
                Some(("clear", clear_matches)) => {
                    let removed = match clear_matches.get_one::<String>("category") {
                        Some(category) => cache.clear_where(|c| c == category),
                        None => cache.clear_all(),
                    };
                    println!("Removed {removed} cached entries");
                }
                _ => unreachable!("subcommand required"),
            }
        }
        Some(("store", store_matches)) => {
            let store = InterviewStore::open(
                data_dir.join("interviews"),
                config.store.unwrap_or_default(),
            )?;
            match store_matches.subcommand() {
                Some(("list", list_matches)) => {
                    let limit = *list_matches.get_one::<usize>("limit").unwrap_or(&50);
                    let status = list_matches.get_one::<InterviewStatus>("status").copied();
                    let records: Vec<_> = store
                        .list()
                        .into_iter()
                        .filter(|r| status.map_or(true, |s| r.status == s))
                        .take(limit)
                        .collect();
                    if records.is_empty() {
                        println!("No records");
                        return Ok(());
                    }
                    for record in records {
                        let warn = if record.research_incomplete {
                            "  [research incomplete]"
                        } else {
                            ""
                        };
                        println!(
                            "{}  {:<9}  {} / {}{}",
                            record.id,
                            record.status.to_string(),
                            record.company.as_deref().unwrap_or("-"),
                            record.role.as_deref().unwrap_or("-"),
                            warn,
                        );
                    }
                }
                Some(("show", show_matches)) => {
                    let id: RecordId = show_matches
                        .get_one::<String>("id")
                        .expect("required arg")
                        .parse()
                        .map_err(|e| anyhow::anyhow!("invalid record id: {e}"))?;
                    let record = store.get(id)?;
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                Some(("counts", _)) => {
                    let counts = store.status_counts();
                    for status in InterviewStatus::ALL {
                        println!("{:<9} {}", status.to_string(), counts.get(&status).unwrap_or(&0));
                    }
                }
                Some(("archive", archive_matches)) => {
                    let id: RecordId = archive_matches
                        .get_one::<String>("id")
                        .expect("required arg")
                        .parse()
                        .map_err(|e| anyhow::anyhow!("invalid record id: {e}"))?;
                    let record = store.transition(id, InterviewStatus::Archived)?;
                    println!("Archived {}", record.id);
                }
                _ => unreachable!("subcommand required"),
            }
        }
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}
