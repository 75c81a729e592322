//! `switchyard play`: queue busbar changes, submit them and run until an overload.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;
use switchyard_cli::{BusbarChange, OutputFormat};
use switchyard_core::{CompositeAction, RunReport};
use switchyard_ui_common::{Error, GameService, JobId, JobResult, SwitchyardConfig};
use tabwriter::TabWriter;
use tracing::{info, warn};

use super::util::resolve_scenario;

pub struct PlayArgs<'a> {
    pub scenario: Option<&'a PathBuf>,
    pub changes: &'a [BusbarChange],
    pub threshold: Option<f64>,
    pub max_ticks: Option<u64>,
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct PlayOutput<'a> {
    scenario: String,
    threshold: f64,
    submitted: &'a CompositeAction,
    report: &'a RunReport,
}

pub fn handle(args: PlayArgs<'_>, mut config: SwitchyardConfig) -> Result<()> {
    if let Some(threshold) = args.threshold {
        if !threshold.is_finite() || threshold <= 0.0 {
            bail!("--threshold must be positive, got {threshold}");
        }
        config.game.rho_threshold = threshold;
    }
    if args.max_ticks.is_some() {
        config.game.max_ticks = args.max_ticks;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args, config))
}

async fn run(args: PlayArgs<'_>, config: SwitchyardConfig) -> Result<()> {
    let path = resolve_scenario(args.scenario, &config)?;
    let threshold = config.game.rho_threshold;
    let service = GameService::with_config(config);
    service.load_scenario(&path)?;

    for change in args.changes {
        service.upsert(change.element, change.busbar)?;
    }
    let submitted = service.pending_action()?;
    if args.format == OutputFormat::Table {
        println!("{}", service.action_log().contents());
        println!();
    }

    let mut handle = service.submit()?;
    let job = handle.id;
    info!(%job, threshold, "run started");

    let mut progress_open = true;
    let result = loop {
        tokio::select! {
            biased;
            result = &mut handle.result => break result?,
            changed = handle.progress.changed(), if progress_open => {
                if changed.is_err() {
                    progress_open = false;
                } else if let Some(message) = handle.progress.borrow().message.clone() {
                    info!("{message}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(%job, "interrupted, cancelling run");
                cancel_run(&service, job)?;
            }
        }
    };

    let report = match result {
        JobResult::Success {
            report: Some(report),
            ..
        } => report,
        JobResult::Success { report: None, .. } => bail!("run finished without a report"),
        JobResult::Failed { error } => bail!(error),
        JobResult::Cancelled => bail!("run cancelled"),
    };

    match args.format {
        OutputFormat::Json => {
            let output = PlayOutput {
                scenario: path.display().to_string(),
                threshold,
                submitted: &submitted,
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => print_report(&report, threshold)?,
    }
    Ok(())
}

/// Ask the run to stop. A run that already finished is not an error; its
/// result is picked up on the next poll.
fn cancel_run(service: &GameService, job: JobId) -> Result<()> {
    match service.cancel(job) {
        Ok(()) | Err(Error::JobNotFound(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn print_report(report: &RunReport, threshold: f64) -> Result<()> {
    println!(
        "Overload after {} ticks. Cumulative reward = {} Max rho = {:.3}",
        report.ticks, report.cumulative_reward, report.max_rho
    );
    if let Some(timestamp) = report.observation.timestamp {
        println!("Simulated time: {}", timestamp.format("%d/%m/%Y %H:%M"));
    }
    println!();

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "LINE\tRHO\tOR BUSBAR\tEX BUSBAR")?;
    for line in &report.overloaded_lines {
        writeln!(
            writer,
            "{}\t{:.3}\t{}\t{}",
            line,
            report.observation.rho[*line],
            report.observation.line_or_bus[*line],
            report.observation.line_ex_bus[*line]
        )?;
    }
    writer.flush()?;
    println!("\nLines at or above {threshold} are listed.");
    Ok(())
}
