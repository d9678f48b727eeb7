use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use banner_sorter_core::{BannerFinder, CurrentBanner, Mode, Scheduled, TimeWindowed};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const NOTHING_TO_DISPLAY_EXIT: u8 = 2;

type Schedule = Vec<Scheduled<Value>>;

#[derive(Debug, Parser)]
#[command(name = "banner-sorter")]
#[command(about = "Pick the banner to display from a time-windowed schedule")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report the banner that is current at the reference time.
    Current(CurrentArgs),
    /// List schedule entries whose window does not open before it closes.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct ScheduleArgs {
    /// JSON array of `{payload, starts_at, ends_at}` entries.
    #[arg(long, env = "BANNER_SORTER_SCHEDULE")]
    schedule: PathBuf,
}

#[derive(Debug, Args)]
struct CurrentArgs {
    #[command(flatten)]
    source: ScheduleArgs,
    /// RFC 3339 reference time; defaults to now.
    #[arg(long, env = "BANNER_SORTER_AS_OF")]
    as_of: Option<String>,
    #[arg(long, env = "BANNER_SORTER_MODE", default_value = "production", value_parser = parse_mode)]
    mode: Mode,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    #[command(flatten)]
    source: ScheduleArgs,
}

#[derive(Debug, Serialize)]
struct CurrentReport<'a> {
    contract_version: &'static str,
    as_of: String,
    mode: Mode,
    banner: Option<&'a Scheduled<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidateReport {
    contract_version: &'static str,
    total: usize,
    malformed: Vec<usize>,
}

fn emit_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report).context("failed to serialize report")?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Current(args) => run_current(&args),
        Command::Validate(args) => run_validate(&args),
    }
}

fn run_current(args: &CurrentArgs) -> Result<ExitCode> {
    let schedule = read_schedule(&args.source.schedule)?;
    let as_of = parse_optional_rfc3339(args.as_of.as_deref())?;
    let finder = BannerFinder::with_clock(&schedule, as_of, args.mode);
    emit_current(&finder, as_of, args.mode)
}

fn emit_current(
    finder: &dyn CurrentBanner<Item = Scheduled<Value>>,
    as_of: OffsetDateTime,
    mode: Mode,
) -> Result<ExitCode> {
    let as_of_text = as_of.format(&Rfc3339).context("failed to format reference time")?;

    let (banner, error, exit) = match finder.current_banner() {
        Ok(banner) => (Some(banner), None, ExitCode::SUCCESS),
        Err(err) => {
            tracing::info!(%err, "no banner selected");
            (None, Some(err.to_string()), ExitCode::from(NOTHING_TO_DISPLAY_EXIT))
        }
    };

    emit_json(&CurrentReport {
        contract_version: CLI_CONTRACT_VERSION,
        as_of: as_of_text,
        mode,
        banner,
        error,
    })?;
    Ok(exit)
}

fn run_validate(args: &ValidateArgs) -> Result<ExitCode> {
    let schedule = read_schedule(&args.source.schedule)?;
    let malformed = schedule
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.is_well_formed())
        .map(|(index, entry)| {
            tracing::warn!(
                index,
                starts_at = %entry.starts_at(),
                ends_at = %entry.ends_at(),
                "schedule entry does not open before it closes"
            );
            index
        })
        .collect::<Vec<_>>();

    emit_json(&ValidateReport {
        contract_version: CLI_CONTRACT_VERSION,
        total: schedule.len(),
        malformed,
    })?;
    Ok(ExitCode::SUCCESS)
}

fn read_schedule(path: &Path) -> Result<Schedule> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read schedule file {}", path.display()))?;
    let schedule: Schedule = serde_json::from_str(&body)
        .with_context(|| format!("invalid schedule JSON in {}", path.display()))?;
    tracing::debug!(entries = schedule.len(), path = %path.display(), "loaded schedule");
    Ok(schedule)
}

fn parse_mode(value: &str) -> std::result::Result<Mode, String> {
    Mode::parse(value).ok_or_else(|| format!("unknown mode `{value}` (expected production or staging)"))
}

fn parse_optional_rfc3339(value: Option<&str>) -> Result<OffsetDateTime> {
    match value {
        Some(raw) => parse_rfc3339(raw),
        None => Ok(OffsetDateTime::now_utc()),
    }
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))?;
    Ok(parsed.to_offset(UtcOffset::UTC))
}
