use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use nbstore::cli::args::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // RUST_LOG still wins for finer filters
    env_logger::Builder::new()
        .filter_module("nbstore", level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    nbstore::run(args)
}
