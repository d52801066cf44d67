mod bbox;
mod config;
mod elevation;
mod geojson;
mod openeo;
mod projection;
mod readers;
mod services;
mod utils;

use clap::Parser;
use config::Config;
use env_logger::Env;
use log::error;
use services::{Command, Context};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about = "Earth observation services on an openEO back-end", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults to ./data/config/services.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the process graph instead of sending it
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<8} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let ctx = Context {
        config,
        dry_run: cli.dry_run,
    };
    cli.command.run(&ctx)
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
