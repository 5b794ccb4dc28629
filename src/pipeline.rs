//pipeline.rs
use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::core::run_compressor::RunCompressor;
use crate::core::segment::{keep_segment, CoverageSegment};
use crate::depth_source::{open_source, DepthSource};
use crate::errors::Result;
use crate::output::SegmentWriter;

/// Counters collected during one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chromosomes: usize,
    pub records: u64,
    pub candidates: u64,
    pub segments: u64,
    pub degenerate: u64,
}

impl RunSummary {
    fn count(&mut self, candidate: &CoverageSegment) -> bool {
        self.candidates += 1;
        if keep_segment(candidate) {
            self.segments += 1;
            true
        } else {
            self.degenerate += 1;
            false
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chromosomes, {} depth records, {} runs, {} segments written, {} single-position runs dropped",
            self.chromosomes, self.records, self.candidates, self.segments, self.degenerate
        )
    }
}

/// Compress everything `source` produces into `writer`. The writer is left open.
pub fn compress_source(source: &mut dyn DepthSource, writer: &mut SegmentWriter) -> Result<RunSummary> {
    let mut compressor = RunCompressor::new();
    let mut summary = RunSummary::default();

    source.visit(&mut |record| {
        if let Some(candidate) = compressor.push(record)? {
            if summary.count(&candidate) {
                writer.write(&candidate)?;
            }
        }
        Ok(())
    })?;

    if let Some(candidate) = compressor.finish() {
        if summary.count(&candidate) {
            writer.write(&candidate)?;
        }
    }

    summary.records = compressor.records();
    summary.chromosomes = compressor.groups();
    Ok(summary)
}

/// Read `input` (an indexed alignment file or a depth table), write the segments to `output`.
/// On failure a partially written output is removed. A file this run never wrote to is left alone.
pub fn run(input: &Path, output: &Path) -> Result<RunSummary> {
    info!("Processing {}", input.display());
    let mut source = open_source(input)?;
    let mut writer = SegmentWriter::create(output, &source.chrom_sizes())?;

    match compress_source(source.as_mut(), &mut writer) {
        Ok(summary) => {
            if let Err(e) = writer.finish() {
                remove_partial_output(output);
                return Err(e);
            }
            info!("{summary}");
            Ok(summary)
        }
        Err(e) => {
            if writer.abort() {
                remove_partial_output(output);
            }
            Err(e)
        }
    }
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        if let Err(rm) = std::fs::remove_file(output) {
            warn!("could not remove partial output {}: {rm}", output.display());
        }
    }
}
