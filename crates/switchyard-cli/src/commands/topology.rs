//! `switchyard topology`: what a scenario's grid looks like.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use switchyard_core::{Busbar, ElementCategory, ElementKind, Environment, SubstationId, Topology};
use switchyard_cli::OutputFormat;
use switchyard_ui_common::SwitchyardConfig;
use tabwriter::TabWriter;

use super::util::{open_scenario, resolve_scenario};

#[derive(Serialize)]
struct SubstationSummary {
    substation: SubstationId,
    kinds: Vec<ElementKind>,
    lines_or: Vec<usize>,
    lines_ex: Vec<usize>,
    generators: Vec<usize>,
    loads: Vec<usize>,
}

#[derive(Serialize)]
struct TopologySummary<'a> {
    scenario: &'a str,
    busbar_options: Vec<Busbar>,
    substations: Vec<SubstationSummary>,
    topology: &'a Topology,
}

fn summarize(topology: &Topology) -> Vec<SubstationSummary> {
    topology
        .substation_ids()
        .into_iter()
        .map(|substation| SubstationSummary {
            substation,
            kinds: topology.element_kinds_at(substation),
            lines_or: topology.indices_at_substation(ElementCategory::LinesOr, substation),
            lines_ex: topology.indices_at_substation(ElementCategory::LinesEx, substation),
            generators: topology.indices_at_substation(ElementCategory::Generators, substation),
            loads: topology.indices_at_substation(ElementCategory::Loads, substation),
        })
        .collect()
}

fn join(indices: &[usize]) -> String {
    if indices.is_empty() {
        return "-".to_string();
    }
    indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn handle(
    scenario: Option<&PathBuf>,
    format: OutputFormat,
    config: &SwitchyardConfig,
) -> Result<()> {
    let path = resolve_scenario(scenario, config)?;
    let environment = open_scenario(&path)?;
    let topology = environment.topology();
    let substations = summarize(topology);

    if format == OutputFormat::Json {
        let summary = TopologySummary {
            scenario: &environment.scenario().name,
            busbar_options: topology.busbar_options(),
            substations,
            topology,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let busbars: Vec<String> = topology
        .busbar_options()
        .iter()
        .map(Busbar::to_string)
        .collect();
    println!("Scenario: {}", environment.scenario().name);
    println!(
        "Substations: {}  Lines: {}  Generators: {}  Loads: {}",
        topology.n_sub(),
        topology.n_line(),
        topology.n_gen(),
        topology.n_load()
    );
    println!("Busbar options: {}", busbars.join(", "));
    println!();

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "SUBSTATION\tLINES OR\tLINES EX\tGENERATORS\tLOADS")?;
    for summary in &substations {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            summary.substation,
            join(&summary.lines_or),
            join(&summary.lines_ex),
            join(&summary.generators),
            join(&summary.loads)
        )?;
    }
    writer.flush()?;

    if config.display.show_topology {
        println!();
        println!("{}", topology.render_table(config.display.column_width));
    }
    Ok(())
}
