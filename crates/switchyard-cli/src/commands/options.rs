//! `switchyard options`: the choices the menu offers at one substation.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;
use switchyard_core::{Busbar, ElementKind, ElementRef, Environment, SubstationId};
use switchyard_cli::{KindArg, OutputFormat};
use switchyard_ui_common::{element_options, SwitchyardConfig};
use tabwriter::TabWriter;

use super::util::{open_scenario, resolve_scenario};

#[derive(Serialize)]
struct OptionRow {
    kind: ElementKind,
    element: ElementRef,
    neighbor: Option<SubstationId>,
    busbar: Busbar,
}

pub fn handle(
    scenario: Option<&PathBuf>,
    substation: usize,
    kind: Option<KindArg>,
    format: OutputFormat,
    config: &SwitchyardConfig,
) -> Result<()> {
    let path = resolve_scenario(scenario, config)?;
    let mut environment = open_scenario(&path)?;
    let observation = environment.reset()?;
    let topology = environment.topology();

    let substation = SubstationId::new(substation);
    if !topology.contains_substation(substation) {
        bail!(
            "substation {substation} does not exist (scenario has {})",
            topology.n_sub()
        );
    }

    let available = topology.element_kinds_at(substation);
    let kinds = match kind.map(ElementKind::from) {
        Some(kind) if !available.contains(&kind) => {
            bail!("no {} connects to substation {substation}", kind.as_str())
        }
        Some(kind) => vec![kind],
        None => available,
    };

    let rows: Vec<OptionRow> = kinds
        .iter()
        .flat_map(|kind| {
            element_options(topology, *kind, substation)
                .into_iter()
                .map(|option| OptionRow {
                    kind: *kind,
                    element: option.element,
                    neighbor: option.neighbor,
                    busbar: observation.buses(option.element.category())[option.element.index()],
                })
        })
        .collect();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let kind_names: Vec<String> = kinds.iter().map(ElementKind::to_string).collect();
    println!("Substation {substation}: {}", kind_names.join(", "));
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "KIND\tELEMENT\tTO SUBSTATION\tBUSBAR")?;
    for row in &rows {
        let neighbor = row
            .neighbor
            .map(|sub| sub.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            row.kind, row.element, neighbor, row.busbar
        )?;
    }
    writer.flush()?;
    Ok(())
}
