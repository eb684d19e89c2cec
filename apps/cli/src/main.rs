#![deny(warnings)]

//! Headless CLI: load an energy-market scenario, run it, write the results.

use anyhow::{bail, Context, Result};
use sim_core::Scenario;
use sim_runtime::Simulation;
use std::fs::File;
use std::io::BufReader;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

fn parse_args() -> (Option<String>, Option<String>) {
    let mut input: Option<String> = None;
    let mut output: Option<String> = None;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--input" => input = it.next(),
            "--output" => output = it.next(),
            _ => {}
        }
    }
    (input, output)
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let (input, output) = parse_args();
    info!(?input, ?output, git_sha = env!("GIT_SHA"), "starting CLI");
    let Some(input) = input else {
        bail!("usage: cli --input <scenario.json> [--output <results.json>]");
    };

    let file = File::open(&input).with_context(|| format!("opening scenario {input}"))?;
    let scenario: Scenario =
        serde_json::from_reader(BufReader::new(file)).context("parsing scenario JSON")?;
    sim_core::validate_scenario(&scenario).context("invalid scenario")?;

    let turns = scenario.number_of_turns;
    let mut sim = Simulation::new(scenario);
    sim.run();
    let results = sim.snapshot();

    match &output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {path}"))?;
            serde_json::to_writer_pretty(file, &results).context("writing results")?;
        }
        None => {
            serde_json::to_writer_pretty(std::io::stdout().lock(), &results)
                .context("writing results")?;
            println!();
        }
    }

    println!(
        "Run OK | turns: {} | consumers: {} | distributors: {} ({} bankrupt) | producers: {}",
        turns,
        results.consumers.len(),
        results.distributors.len(),
        results.distributors.iter().filter(|d| d.is_bankrupt).count(),
        results.energy_producers.len()
    );

    Ok(())
}
