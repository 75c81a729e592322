use std::process;

use clap::Parser;
use switchyard_cli::cli::{build_cli_command, Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::play::PlayArgs;
use commands::util::load_config;

fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        build_cli_command().print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Completions { shell, out } = &command {
        return commands::completions::handle(*shell, out.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;
    match &command {
        Commands::Topology { scenario, format } => {
            commands::topology::handle(scenario.as_ref(), *format, &config)
        }
        Commands::Options {
            scenario,
            substation,
            kind,
            format,
        } => commands::options::handle(scenario.as_ref(), *substation, *kind, *format, &config),
        Commands::Play {
            scenario,
            set,
            threshold,
            max_ticks,
            format,
        } => commands::play::handle(
            PlayArgs {
                scenario: scenario.as_ref(),
                changes: set,
                threshold: *threshold,
                max_ticks: *max_ticks,
                format: *format,
            },
            config,
        ),
        Commands::Completions { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {err}");
    }

    info!("switchyard {}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(cli) {
        error!("{err:?}");
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}
