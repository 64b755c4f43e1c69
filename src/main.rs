use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use stockflow::cli::args::{Cli, Commands, OutputFormat};
use stockflow::cli::commands::{self, App};
use stockflow::config::{ColorSetting, Config, Paths};
use stockflow::error::StockflowError;
use stockflow::logging;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        let code = e
            .downcast_ref::<StockflowError>()
            .map_or(1, StockflowError::exit_code);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = match cli.home.clone() {
        Some(root) => Paths::with_root(root),
        None => Paths::new()?,
    };
    let config = Config::load_from_path(&paths.config_file)?;

    match config.general.color {
        ColorSetting::Always => colored::control::set_override(true),
        ColorSetting::Never => colored::control::set_override(false),
        ColorSetting::Auto => {}
    }
    logging::init(&config.logging, cli.verbose)?;

    let format = cli.output.unwrap_or(config.general.default_output);

    // Config commands never touch the queue or the network.
    let output = match cli.command {
        Commands::Config(args) => commands::config(&paths, &config, args.command, format)?,
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(dispatch(command, paths, config, format))?
        }
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

async fn dispatch(
    command: Commands,
    paths: Paths,
    config: Config,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    let app = App::open(paths, config)?;

    match command {
        Commands::Sale(args) => commands::sale(&app, args, format).await,
        Commands::Restock(args) => commands::restock(&app, args, format).await,
        Commands::Queue(args) => commands::queue(&app, args.command, format).await,
        Commands::Watch => commands::watch(&app, format).await,
        Commands::Config(args) => commands::config(&app.paths, &app.config, args.command, format),
    }
}
