use clap::{Parser as ClapParser, Subcommand};
use pipeline_lang::cli::{self, CliError, RunOptions, ScheduleOptions};
use std::{
    io::{self, Read},
    path::PathBuf,
};

#[derive(ClapParser)]
#[command(name = "pipeline")]
#[command(about = "Pipeline - A scripting language for scheduled orchestration pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a script and list its pipelines, stages and step calls
    Check {
        /// Script file (reads from stdin if not provided)
        file: Option<PathBuf>,
    },

    /// Run a pipeline once
    Run {
        /// Script file (reads from stdin if not provided)
        file: Option<PathBuf>,

        /// Pipeline to run; may be omitted when the script has only one
        #[arg(short, long, default_value = "")]
        pipeline: String,

        /// Entry for the `params` map, as name=value
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Print the pipeline's result
        #[arg(long)]
        print: bool,
    },

    /// Run the schedules of a YAML config until Ctrl-C
    Schedule {
        /// Config file
        config: PathBuf,

        /// Entry for the `params` map, as name=value
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { file } => run_check(file),
        Commands::Run {
            file,
            pipeline,
            params,
            print,
        } => run_pipeline(file, pipeline, params, print),
        Commands::Schedule { config, params } => run_schedule(config, params),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn read_source(file: Option<PathBuf>) -> Result<String, CliError> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        None => Err(CliError::NoInput),
    }
}

fn parse_params(raw: Vec<String>) -> Result<Vec<(String, pipeline_lang::Value)>, CliError> {
    raw.iter().map(|p| cli::parse_param(p)).collect()
}

fn run_check(file: Option<PathBuf>) -> Result<(), CliError> {
    let source = read_source(file)?;
    let summary = cli::execute_check(&source)?;
    print!("{}", summary);
    Ok(())
}

fn run_pipeline(
    file: Option<PathBuf>,
    pipeline: String,
    params: Vec<String>,
    print: bool,
) -> Result<(), CliError> {
    let options = RunOptions {
        source: read_source(file)?,
        pipeline,
        params: parse_params(params)?,
    };
    let result = cli::execute_run(&options)?;
    if print {
        println!("{}", result);
    }
    Ok(())
}

fn run_schedule(config: PathBuf, params: Vec<String>) -> Result<(), CliError> {
    let options = ScheduleOptions {
        config,
        params: parse_params(params)?,
    };
    cli::execute_schedule(&options)
}
