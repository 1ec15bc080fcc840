//! xbrl-filing CLI - parse and validate XBRL filings

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use xbrl_filing::{Config, FilingData, FilingParser, PeriodType, ValidationIssue};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// XBRL filing parser and validator
#[derive(ClapParser)]
#[command(name = "xbrl-filing")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a filing directory or a single instance document
    Parse {
        /// Filing directory or instance file
        input: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Show statistics
        #[arg(short, long)]
        stats: bool,
    },

    /// Print the quality and calculation reports
    Validate {
        /// Filing directory or instance file
        input: PathBuf,

        /// Exit non-zero when the filing is not acceptable
        #[arg(long)]
        strict: bool,
    },

    /// Show the canonical context per fiscal year
    Contexts {
        /// Filing directory or instance file
        input: PathBuf,
    },

    /// Look up one concept in the canonical context of a fiscal year
    Value {
        /// Filing directory or instance file
        input: PathBuf,

        /// Concept name, qualified or local
        concept: String,

        /// Fiscal year
        #[arg(short, long)]
        year: i32,

        /// Use the instant (balance sheet) context
        #[arg(long)]
        instant: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid XBRL_* environment configuration")?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Parse { input, json, stats } => {
            let start = Instant::now();
            let filing = parse(&input, config.lenient())?;
            let elapsed = start.elapsed();

            if json {
                println!("{}", serde_json::to_string_pretty(&filing)?);
                return Ok(());
            }

            println!("{} {}", "✓".green().bold(), input.display());
            println!("  Company: {} (CIK {})", filing.company.name, filing.company.cik);
            if let Some(end) = filing.period_end {
                println!("  Period end: {}", end);
            }
            println!("  Facts: {}", filing.facts.len());
            println!("  Contexts: {}", filing.contexts.len());
            println!("  Units: {}", filing.units.len());
            for statement in filing.statements() {
                println!(
                    "  {}: {} line items",
                    statement.statement_type.title(),
                    statement.line_items.len()
                );
            }

            if stats {
                println!("  Time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
                println!(
                    "  Throughput: {:.0} facts/sec",
                    filing.facts.len() as f64 / elapsed.as_secs_f64()
                );
            }
        }

        Commands::Validate { input, strict } => {
            let filing = parse(&input, config.lenient())?;
            let acceptable = print_validation(&input, &filing);
            if strict && !acceptable {
                std::process::exit(1);
            }
        }

        Commands::Contexts { input } => {
            let filing = parse(&input, config.lenient())?;
            let summary = filing.context_mapper().summary();

            println!("{} {}", "✓".green().bold(), input.display());
            println!(
                "  Contexts: {} ({} dimensional), facts: {}",
                summary.total_contexts, summary.dimensional_contexts, summary.total_facts
            );
            for year in &summary.fiscal_years {
                println!("  FY{} ({} contexts)", year.fiscal_year, year.contexts);
                if let Some(duration) = &year.duration {
                    println!("    duration: {} (score {})", duration.context_id, duration.score);
                }
                if let Some(instant) = &year.instant {
                    println!("    instant:  {} (score {})", instant.context_id, instant.score);
                }
            }
        }

        Commands::Value {
            input,
            concept,
            year,
            instant,
        } => {
            let filing = parse(&input, config.lenient())?;
            let orientation = if instant {
                PeriodType::Instant
            } else {
                PeriodType::Duration
            };
            let value = filing
                .require_value_for_year(&concept, year, orientation)
                .with_context(|| format!("No value for {} in FY{}", concept, year))?;
            println!("{} {} FY{} = {}", "✓".green().bold(), concept, year, value);
        }
    }

    Ok(())
}

fn parse(input: &Path, config: Config) -> Result<FilingData> {
    if !input.exists() {
        bail!("{} does not exist", input.display());
    }
    FilingParser::new()
        .with_config(config)
        .parse_path(input)
        .with_context(|| format!("Failed to parse {}", input.display()))
}

/// Prints the attached reports and returns whether the filing is acceptable.
fn print_validation(input: &Path, filing: &FilingData) -> bool {
    let acceptable = filing
        .quality_report
        .as_ref()
        .map_or(false, |q| q.is_acceptable());

    if acceptable {
        println!("{} {} - Filing is acceptable", "✓".green().bold(), input.display());
    } else {
        println!("{} {} - Filing is not acceptable", "✗".red().bold(), input.display());
    }

    if let Some(quality) = &filing.quality_report {
        println!("  Overall quality: {:.2}", quality.overall_score);
        println!("  Completeness: {:.2}", quality.completeness.score);
        println!("  Data quality: {:.2}", quality.quality.score);
        print_issues("ERROR:".red(), &quality.errors);
        print_issues("WARNING:".yellow(), &quality.warnings);
    }

    if let Some(structural) = &filing.structural_report {
        print_issues("STRUCTURE:".yellow(), &structural.issues);
    }

    if let Some(calculations) = &filing.calculation_report {
        println!(
            "  Calculations: {} checked, {} failed, {} critical (accuracy {:.1}%)",
            calculations.validated,
            calculations.failed,
            calculations.critical_errors,
            calculations.accuracy * 100.0
        );
        for check in calculations.failures().take(5) {
            println!(
                "  {} {} [{}] reported {} computed {}",
                "CALC:".red(),
                check.parent_concept,
                check.period,
                check.reported,
                check.computed
            );
        }
        for equation in calculations.balance_sheet.iter().filter(|e| !e.is_balanced()) {
            println!(
                "  {} balance sheet {} is {:?}",
                "CALC:".red(),
                equation.period,
                equation.status
            );
        }
    }

    acceptable
}

fn print_issues(tag: ColoredString, issues: &[ValidationIssue]) {
    for issue in issues.iter().take(5) {
        println!("  {} {}", tag, issue);
    }
    if issues.len() > 5 {
        println!("  ... and {} more", issues.len() - 5);
    }
}
