// src/bin/bam2runs.rs
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use bam_runs::cli::RunsCli;
use bam_runs::pipeline;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opts = RunsCli::parse();

    info!("Processing: {}", opts.input.display());
    info!("Output table: {}", opts.outfile.display());

    let summary = pipeline::run(&opts.input, &opts.outfile).with_context(|| {
        format!(
            "could not compress {} into {}",
            opts.input.display(),
            opts.outfile.display()
        )
    })?;

    info!("Conversion completed successfully: {} segments", summary.segments);
    Ok(())
}
