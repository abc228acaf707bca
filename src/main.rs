//! avf-trace: vulnerability estimation from recorded execution traces

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};

use anyhow::{bail, Context};
use avf_trace::config::Config;
use avf_trace::engine::Engine;
use avf_trace::trace::{TraceReader, TraceRecord};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let mut config = Config::load();
    let mut path = None;

    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--report" => config.report_path = Some(option_value(&mut rest, "--report")?),
            "--partial" => config.partial_path = Some(option_value(&mut rest, "--partial")?),
            "--fan" => config.fan_tracking = true,
            "--threads" => {
                config.thread_capacity = option_value(&mut rest, "--threads")?
                    .parse()
                    .context("--threads expects a number")?;
            }
            other if other.starts_with('-') => bail!("unknown option: {}", other),
            other => path = Some(other.to_string()),
        }
    }

    let Some(path) = path else {
        print_usage();
        bail!("no trace file given");
    };

    run(&path, config)
}

fn run(path: &str, config: Config) -> anyhow::Result<()> {
    let mut engine = Engine::new(config.clone())?;

    if config.partial_reports {
        let partial_path = config.partial_path();
        let partial = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&partial_path)
            .with_context(|| format!("failed to open partial report {}", partial_path))?;
        engine.set_partial_sink(Box::new(BufWriter::new(partial)));
    }

    println!("Loading: {}", path);
    let file = File::open(path).with_context(|| format!("failed to open {}", path))?;

    let mut skipped = 0u64;
    for record in TraceReader::new(BufReader::new(file)) {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_recoverable() => {
                log::warn!("{}", e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match record {
            TraceRecord::Event(event) => {
                if let Err(e) = engine.process(&event) {
                    if !e.is_event_local() {
                        return Err(e.into());
                    }
                    log::warn!("dropping event: {}", e);
                    skipped += 1;
                }
            }
            TraceRecord::PartialReport => engine.request_partial_report(),
            TraceRecord::Region(true) => engine.open_redundant_region(),
            TraceRecord::Region(false) => engine.close_redundant_region(),
        }
    }

    let report_path = config.report_path();
    let file = File::create(&report_path)
        .with_context(|| format!("failed to create report {}", report_path))?;
    let mut out = BufWriter::new(file);
    engine.write_report(&mut out)?;
    out.flush()?;

    let stats = engine.stats();
    println!();
    println!("Instructions: {}", stats.instructions);
    println!("Data accesses: {}", stats.data);
    println!("Exceptions: {}", stats.exceptions);
    println!("Ignored: {}", stats.ignored);
    println!("Skipped: {}", skipped);
    println!("Pending stores: {}", engine.stores().len());
    if engine.region() > 0 {
        println!("Partial reports: {} ({})", engine.region(), config.partial_path());
    }
    println!("Report written to {}", report_path);

    Ok(())
}

fn option_value<'a>(
    rest: &mut impl Iterator<Item = &'a String>,
    option: &str,
) -> anyhow::Result<String> {
    match rest.next() {
        Some(value) => Ok(value.clone()),
        None => bail!("{} expects a value", option),
    }
}

fn print_usage() {
    println!("avf-trace - architectural vulnerability estimation from execution traces");
    println!();
    println!("Usage: avf-trace <trace-file> [options]");
    println!();
    println!("Options:");
    println!("  --report PATH     Full report destination (default vul_result.txt)");
    println!("  --partial PATH    Partial report log (default temp_result.txt)");
    println!("  --fan             Track fan-in / fan-out matrices");
    println!("  --threads N       Number of tracked threads");
    println!("  --sample-config   Print a sample configuration file");
    println!();
    println!("Set RUST_LOG=debug for attribution logging.");
}
