#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_docs)]
//! Plots a cross run results file.
use clap::Parser;
use mimalloc::MiMalloc;
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Renders loss and displacement charts from a results file.
#[derive(Parser)]
#[clap(name = "pedtraj-plot", version)]
struct Opts {
    /// Tab delimited results file written by training runs.
    results: PathBuf,

    /// Directory for the rendered charts.
    #[clap(short, long, default_value = "saved_figs")]
    out: PathBuf,

    /// Column plotted on the horizontal axis.
    #[clap(short, long, default_value = "obs_len")]
    x: String,

    /// Log filter, overridden by `RUST_LOG`.
    #[clap(long, default_value = "info")]
    log_level: String,
}

fn main() -> pedtraj::Result<()> {
    let opts = Opts::parse();
    pedtraj::init_logging(&opts.log_level);
    pedtraj::plot::render(&opts.results, &opts.out, &opts.x)?;
    Ok(())
}
