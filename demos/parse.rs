//! Parse a filing directory and print its statements

use std::env;
use xbrl_filing::FilingParser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <filing-dir-or-instance>", args[0]);
        std::process::exit(1);
    }

    let filing = FilingParser::new().parse_path(&args[1])?;

    println!("Parsed {} successfully", args[1]);
    println!("  Company: {}", filing.company.name);
    println!("  Facts: {}", filing.facts.len());
    println!("  Contexts: {}", filing.contexts.len());

    for statement in filing.statements() {
        println!("\n{}", statement.statement_type.title());
        for item in statement.line_items.iter().take(10) {
            let indent = "  ".repeat(item.level as usize + 1);
            match item.value {
                Some(value) => println!("{}{}: {:.0}", indent, item.label, value),
                None => println!("{}{}", indent, item.label),
            }
        }
    }

    Ok(())
}
