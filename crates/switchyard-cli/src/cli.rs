use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::Shell;
use std::path::PathBuf;
use switchyard_core::{Busbar, ElementCategory, ElementKind, ElementRef};

#[derive(Parser, Debug)]
#[command(name = "switchyard", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "warn")]
    pub log_level: tracing::Level,

    /// Read configuration from this file instead of ~/.switchyard/config.toml
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print substations, busbar options and the line table of a scenario
    Topology {
        /// Scenario file (YAML or JSON); defaults to scenario.default_path
        #[arg(value_hint = ValueHint::FilePath)]
        scenario: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List the connecting elements offered at a substation
    Options {
        #[arg(value_hint = ValueHint::FilePath)]
        scenario: Option<PathBuf>,
        /// Substation to inspect
        #[arg(long)]
        substation: usize,
        /// Only list elements of this kind
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Apply busbar changes and run the simulation until a line overloads
    Play {
        #[arg(value_hint = ValueHint::FilePath)]
        scenario: Option<PathBuf>,
        /// Busbar change as CATEGORY:INDEX=BUSBAR, e.g. lines_or:3=2 (repeatable)
        #[arg(long = "set", value_parser = parse_busbar_change)]
        set: Vec<BusbarChange>,
        /// Stop once any line reaches this loading ratio
        #[arg(long)]
        threshold: Option<f64>,
        /// Give up after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Line,
    Generator,
    Load,
}

impl From<KindArg> for ElementKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Line => ElementKind::Line,
            KindArg::Generator => ElementKind::Generator,
            KindArg::Load => ElementKind::Load,
        }
    }
}

/// One `--set` argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusbarChange {
    pub element: ElementRef,
    pub busbar: Busbar,
}

pub fn parse_busbar_change(input: &str) -> Result<BusbarChange, String> {
    let (target, busbar) = input
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY:INDEX=BUSBAR, got '{input}'"))?;
    let (category, index) = target
        .split_once(':')
        .ok_or_else(|| format!("expected CATEGORY:INDEX before '=', got '{target}'"))?;
    let category = ElementCategory::parse(category.trim()).ok_or_else(|| {
        format!("unknown category '{category}'; use lines_or, lines_ex, generators or loads")
    })?;
    let index: usize = index
        .trim()
        .parse()
        .map_err(|_| format!("invalid element index '{index}'"))?;
    let busbar: i32 = busbar
        .trim()
        .parse()
        .map_err(|_| format!("invalid busbar '{busbar}'"))?;
    Ok(BusbarChange {
        element: ElementRef::from_category(category, index),
        busbar: Busbar::new(busbar),
    })
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
