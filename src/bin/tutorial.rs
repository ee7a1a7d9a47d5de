use clap::Parser;
use std::path::PathBuf;

use patchnet::harness::{tutorial, Scenario};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run an acceptance scenario of shell steps")]
struct Args {
    /// Scenario YAML file; the built-in tutorial when omitted
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Only run steps whose name contains this text
    #[arg(long)]
    only: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let scenario = match &args.scenario {
        Some(path) => Scenario::from_yaml(path)?,
        None => tutorial(),
    };

    println!("Scenario: {} ({} steps)", scenario.name, scenario.steps.len());
    println!("==========================================\n");

    let report = scenario.run(args.only.as_deref());

    println!("\n{}", report.table());

    if !report.passed() {
        let failed: Vec<&str> = report.failures().iter().map(|o| o.name.as_str()).collect();
        eprintln!("\nFailed steps: {}", failed.join(", "));
        std::process::exit(1);
    }
    Ok(())
}
