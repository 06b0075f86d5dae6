//! platetune: optimize Bambu Studio 3MF process settings with an LLM.
//!
//! # Logging
//!
//! Logs go to stderr. Set `RUST_LOG` to control them:
//! - `RUST_LOG=platetune=debug` - per-key mapping decisions
//! - `RUST_LOG=warn` - skipped changes and degraded inputs only
//!
//! # Example
//!
//! ```bash
//! platetune optimize bracket.3mf --goal "stronger walls" --strength
//! platetune inspect bracket.3mf > bracket.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use platetune::changes::{apply_changes, ApplyOptions};
use platetune::config::{resolve_api_key, AppConfig};
use platetune::optimizer::{build_request_payload, request_optimization, IntentDetails, PayloadFlags, Priority};
use platetune::project::{build_updated_archive_entries, parse_entries, write_archive_atomic, ArchiveEntries};
use platetune::report::{format_diff, format_warning, FormatContext};

#[derive(Parser)]
#[command(name = "platetune")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config dir>/platetune/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the configured AI provider for better settings and write them back
    Optimize(OptimizeArgs),

    /// Print the normalized project as JSON
    Inspect {
        /// Input 3MF project
        input: PathBuf,
    },
}

#[derive(clap::Args)]
struct OptimizeArgs {
    /// Input 3MF project
    input: PathBuf,

    /// Output file (default: <input stem>.optimized.3mf)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Free-text goal, e.g. "less stringing"
    #[arg(long)]
    goal: Option<String>,

    /// Filament material hint, e.g. PETG
    #[arg(long)]
    material: Option<String>,

    /// Prioritize surface quality
    #[arg(long, conflicts_with_all = ["speed", "strength"])]
    quality: bool,

    /// Prioritize print time
    #[arg(long, conflicts_with_all = ["quality", "strength"])]
    speed: bool,

    /// Prioritize part strength
    #[arg(long, conflicts_with_all = ["quality", "speed"])]
    strength: bool,

    /// Allow changes to settings already tuned by the user
    #[arg(long)]
    allow_overrides: bool,

    /// Show the suggested changes without writing an archive
    #[arg(long)]
    dry_run: bool,
}

impl OptimizeArgs {
    fn priority(&self) -> Option<Priority> {
        match (self.quality, self.speed, self.strength) {
            (true, _, _) => Some(Priority::Quality),
            (_, true, _) => Some(Priority::Speed),
            (_, _, true) => Some(Priority::Strength),
            _ => None,
        }
    }

    fn intent(&self) -> IntentDetails {
        IntentDetails {
            goal: self.goal.clone().filter(|g| !g.trim().is_empty()),
            material: self.material.clone().filter(|m| !m.trim().is_empty()),
            priority: self.priority(),
        }
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    input.with_file_name(format!("{}.optimized.3mf", stem))
}

fn read_entries(input: &Path) -> Result<ArchiveEntries> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    ArchiveEntries::from_zip_bytes(&bytes).with_context(|| format!("Failed to open {} as a 3MF archive", input.display()))
}

async fn optimize(args: OptimizeArgs, config: AppConfig) -> Result<()> {
    let allow_overrides = args.allow_overrides || config.allow_user_setting_overrides;
    let entries = read_entries(&args.input)?;
    let project = parse_entries(&entries, config.max_preview_dimension)
        .with_context(|| format!("Failed to parse {}", args.input.display()))?;

    // Credentials are checked before anything is sent or written.
    let api_key = resolve_api_key(config.provider)?;

    let flags = PayloadFlags {
        allow_user_setting_overrides: allow_overrides,
        language: config.language.clone(),
    };
    let payload = build_request_payload(&project, &args.intent(), &project.plate_images, &flags);
    let response = request_optimization(&payload, config.provider, config.effective_model(), &api_key).await?;

    let outcome = apply_changes(
        &project,
        &response.changes,
        ApplyOptions {
            enforce_locks: !allow_overrides,
        },
    );

    let ctx = FormatContext::for_language(&config.language);
    if let Some(rationale) = response.global_rationale.as_deref() {
        println!("{}\n", rationale);
    }
    for note in &response.warnings {
        println!("! {}", note);
    }
    for diff in &outcome.diffs {
        println!("{}", format_diff(diff, &ctx));
    }
    for warning in &outcome.warnings {
        println!("{}", format_warning(warning, &ctx));
    }
    info!(
        "{} changes applied, {} skipped",
        outcome.diffs.len(),
        outcome.warnings.len()
    );

    if args.dry_run {
        info!("Dry run, no archive written");
        return Ok(());
    }

    let output = args.output_path();
    let updated = build_updated_archive_entries(&outcome.project, &entries)?;
    write_archive_atomic(&updated, &output).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("\nWrote {}", output.display());
    Ok(())
}

fn inspect(input: &Path, config: &AppConfig) -> Result<()> {
    let entries = read_entries(input)?;
    let project = parse_entries(&entries, config.max_preview_dimension)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    println!("{}", serde_json::to_string_pretty(&project)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    platetune::init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Optimize(args) => optimize(args, config).await,
        Commands::Inspect { input } => inspect(&input, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/bracket.3mf")),
            PathBuf::from("/tmp/bracket.optimized.3mf")
        );
        assert_eq!(
            default_output_path(Path::new("cube.3mf")),
            PathBuf::from("cube.optimized.3mf")
        );
    }

    #[test]
    fn test_priority_flags() {
        let cli = Cli::try_parse_from(["platetune", "optimize", "a.3mf", "--speed", "--goal", "fast"]).unwrap();
        let Commands::Optimize(args) = cli.command else {
            panic!("expected optimize");
        };
        let intent = args.intent();
        assert_eq!(intent.priority, Some(Priority::Speed));
        assert_eq!(intent.goal.as_deref(), Some("fast"));
        assert_eq!(intent.material, None);

        assert!(Cli::try_parse_from(["platetune", "optimize", "a.3mf", "--speed", "--quality"]).is_err());
    }
}
