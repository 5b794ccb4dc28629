//! Run-length compression of per-position sequencing depth.
//!
//! A [`depth_source::DepthSource`] delivers `(chromosome, position, depth)` records grouped by
//! chromosome, the [`core::run_compressor::RunCompressor`] folds them into constant-depth
//! [`core::segment::CoverageSegment`]s and [`output::SegmentWriter`] writes the segments that
//! span more than one position.

pub mod bam_index;
pub mod cli;
pub mod core;
pub mod depth_source;
pub mod errors;
pub mod output;
pub mod pipeline;

pub use crate::core::depth_record::DepthRecord;
pub use crate::core::run_compressor::{candidates, compress, compress_to_vec, RunCompressor};
pub use crate::core::segment::{keep_segment, CoverageSegment};
pub use crate::errors::{CoverageError, Result};
pub use crate::pipeline::{run, RunSummary};
