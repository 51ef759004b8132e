//! # Childcare statistics CLI (`tuoyu`)
//!
//! Region and national statistics over the institution registry, the
//! school/major registry and the talent-demand questionnaire. Results are
//! printed as pretty JSON on stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! tuoyu --config ./config/tuoyu.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tuoyu stats` | Region and national stats for a query (cached) |
//! | `tuoyu demand` | Posting requirements from the questionnaire |
//! | `tuoyu fingerprints` | Current source fingerprints |
//! | `tuoyu columns` | Questionnaire header columns |
//! | `tuoyu cache clear` | Remove the cache file |
//! | `tuoyu cache info` | Cache file path and entry count |
//!
//! ## Examples
//!
//! ```bash
//! # Guangdong, childcare majors, records from 2021 on
//! tuoyu stats --region 广东省 --started-time 2021
//!
//! # Vocational-college programs only, bypassing the cache
//! tuoyu stats --region 广东省 --education-level 高职专科 --no-cache
//!
//! # Demand table with a hand-picked posting column
//! tuoyu demand --region 广东省 --column posting=最缺岗位
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use tuoyu_stats::api::{StatsApi, StatsOptions};
use tuoyu_stats::config::{self, Config};
use tuoyu_stats::demand::{DemandField, DemandOptions};
use tuoyu_stats::models::StatsQuery;

const DEFAULT_CONFIG: &str = "./config/tuoyu.toml";

/// Childcare workforce statistics over local registry and survey data.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tuoyu.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tuoyu",
    about = "Childcare (托育) workforce statistics over local registry and survey data",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tuoyu.toml`. When the default file does not
    /// exist the built-in layout rooted at `./db` is used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute region and national statistics.
    ///
    /// Results are cached per query and reused until any source file
    /// changes.
    Stats {
        /// School name. Part of the cache key; not a filter.
        #[arg(long)]
        school: Option<String>,

        /// Major name or code, e.g. `婴幼儿托育服务与管理` or `520802`.
        /// Without it, every childcare-related major counts.
        #[arg(long)]
        major: Option<String>,

        /// Province or city, e.g. `广东省`.
        #[arg(long)]
        region: Option<String>,

        /// `本科` or `高职专科`; matched through program length.
        #[arg(long)]
        education_level: Option<String>,

        /// Only school records from this year on.
        #[arg(long)]
        started_time: Option<i64>,

        /// Maximum entries per details list.
        #[arg(long)]
        details_limit: Option<usize>,

        /// Recompute and do not write the cache.
        #[arg(long)]
        no_cache: bool,

        /// Leave the questionnaire blocks out of `details`.
        #[arg(long)]
        no_questionnaire_details: bool,
    },

    /// Extract posting requirements from the questionnaire.
    Demand {
        #[arg(long)]
        region: Option<String>,

        /// Number of raw sample rows to include.
        #[arg(long)]
        details_limit: Option<usize>,

        /// Keep placeholder postings such as `无`.
        #[arg(long)]
        no_filter_meaningless: bool,

        /// Force a field's column: `--column posting=最缺岗位`. Fields:
        /// posting, salary, education, competency, certificate, talent_type.
        #[arg(long = "column", value_parser = parse_key_val)]
        columns: Vec<(String, String)>,
    },

    /// Print the current source fingerprints.
    Fingerprints,

    /// Print the questionnaire header columns.
    Columns,

    /// Manage the stats cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached entry.
    Clear,
    /// Show the cache file path and entry count.
    Info,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    config::load_config(path)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = resolve_config(&cli.config)?;
    let api = StatsApi::from_config(cfg);

    match cli.command {
        Commands::Stats {
            school,
            major,
            region,
            education_level,
            started_time,
            details_limit,
            no_cache,
            no_questionnaire_details,
        } => {
            let query = StatsQuery {
                school,
                major,
                region,
                education_level,
                started_time,
            };
            let options = StatsOptions {
                details_limit: details_limit.unwrap_or(api.config().stats.details_limit),
                use_cache: !no_cache,
                include_questionnaire_details: !no_questionnaire_details,
            };
            print_json(&api.get_stats(&query, &options)?)?;
        }
        Commands::Demand {
            region,
            details_limit,
            no_filter_meaningless,
            columns,
        } => {
            for (field, _) in &columns {
                if DemandField::parse(field).is_none() {
                    bail!("unknown demand field '{}'", field);
                }
            }
            let options = DemandOptions {
                region,
                columns_override: columns.into_iter().collect(),
                raw_sample_limit: details_limit
                    .unwrap_or(api.config().stats.demand_details_limit),
                filter_meaningless_postings: !no_filter_meaningless,
            };
            let demand = api.get_talent_demand(&options);
            if demand.sample_count == 0 {
                eprintln!(
                    "No questionnaire rows loaded from {}",
                    api.config().questionnaire_path().display()
                );
            }
            print_json(&demand)?;
        }
        Commands::Fingerprints => {
            print_json(&api.fingerprints())?;
        }
        Commands::Columns => {
            print_json(&api.questionnaire_columns())?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear => {
                api.clear_cache()?;
                println!("Cache cleared: {}", api.config().cache_path().display());
            }
            CacheAction::Info => {
                print_json(&serde_json::json!({
                    "path": api.config().cache_path(),
                    "entries": api.cache().store().len(),
                }))?;
            }
        },
    }

    Ok(())
}
