#![forbid(unsafe_code)]

use crate::config::{Args, HopwatchConfig};
use clap::Parser;

mod app;
mod config;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = HopwatchConfig::from(args)?;
    app::run_hopwatch(&cfg)
}
