// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines all subcommands and global flags

use crate::api::DateRange;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "granola-export")]
#[command(about = "Export complete, verified Granola meeting transcripts", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Bearer token (overrides env and stored tokens)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Stored OAuth token file
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    /// MCP endpoint URL
    #[arg(long, global = true, default_value = crate::api::DEFAULT_MCP_URL)]
    pub mcp_url: String,

    /// Export policy file (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable request throttling (not recommended)
    #[arg(long, global = true)]
    pub no_throttle: bool,

    /// Throttle range in ms (min:max)
    #[arg(long, global = true, value_parser = parse_throttle_range)]
    pub throttle_ms: Option<(u64, u64)>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_throttle_range(s: &str) -> Result<(u64, u64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected format: min:max".into());
    }

    let min = parts[0].parse().map_err(|_| "Invalid min value")?;
    let max = parts[1].parse().map_err(|_| "Invalid max value")?;

    if min > max {
        return Err("min must be <= max".into());
    }

    Ok((min, max))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("Expected YYYY-MM-DD, got {}", s))
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangePreset {
    ThisWeek,
    LastWeek,
    #[default]
    #[value(name = "last-30-days")]
    Last30Days,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// Date range preset
    #[arg(long, value_enum, default_value_t = RangePreset::Last30Days)]
    pub range: RangePreset,

    /// Custom range start (YYYY-MM-DD), requires --end
    #[arg(long, value_parser = parse_date, requires = "end")]
    pub start: Option<NaiveDate>,

    /// Custom range end (YYYY-MM-DD), requires --start
    #[arg(long, value_parser = parse_date, requires = "start")]
    pub end: Option<NaiveDate>,
}

impl RangeArgs {
    pub fn date_range(&self) -> DateRange {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            return DateRange::Custom { start, end };
        }
        match self.range {
            RangePreset::ThisWeek => DateRange::ThisWeek,
            RangePreset::LastWeek => DateRange::LastWeek,
            RangePreset::Last30Days => DateRange::Last30Days,
            RangePreset::ThisMonth => DateRange::ThisMonth,
            RangePreset::LastMonth => DateRange::LastMonth,
            RangePreset::ThisYear => DateRange::ThisYear,
            RangePreset::LastYear => DateRange::LastYear,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Only export these meeting IDs (repeatable)
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Output directory for Markdown files
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Export meetings with verification (default)
    Export(ExportArgs),

    /// List meetings in a date range
    List(RangeArgs),

    /// Check a transcript or exported Markdown file for completeness
    Verify {
        /// File to check
        path: PathBuf,
    },

    /// Print the effective export configuration as YAML
    Config,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Export(ExportArgs::default()))
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
