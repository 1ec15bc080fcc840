//! Validation example

use std::env;
use xbrl_filing::{Config, FilingParser};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <filing-dir-or-instance>", args[0]);
        std::process::exit(1);
    }

    // Lenient so that every report is attached
    let filing = FilingParser::new()
        .with_config(Config::default().lenient())
        .parse_path(&args[1])?;

    if let Some(quality) = &filing.quality_report {
        let mark = if quality.is_acceptable() { "✓" } else { "✗" };
        println!("{} Overall quality {:.2}", mark, quality.overall_score);
        for issue in quality.errors.iter().chain(&quality.warnings) {
            println!("  - {}", issue);
        }
    }

    if let Some(calculations) = &filing.calculation_report {
        println!(
            "Calculations: {}/{} valid, balance sheet balanced: {}",
            calculations.validated - calculations.failed,
            calculations.validated,
            calculations.is_balanced()
        );
    }

    Ok(())
}
