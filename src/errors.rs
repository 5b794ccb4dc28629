//errors.rs
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between opening the input and writing the last segment.
#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Htslib {
        context: String,
        #[source]
        source: rust_htslib::errors::Error,
    },

    #[error("could not build an index for {path}: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: rust_htslib::errors::Error,
    },

    /// Positions must strictly increase inside one chromosome group.
    #[error("ordering violation on {chromosome}: position {position} follows position {previous}")]
    OrderingViolation {
        chromosome: String,
        previous: u64,
        position: u64,
    },

    /// A chromosome showed up again after its group had already been closed.
    #[error("chromosome {chromosome} is not grouped: it re-appears at position {position} after another chromosome")]
    UngroupedChromosome {
        chromosome: String,
        position: u64,
    },

    #[error("invalid position {position} on {chromosome}: positions are 1-based")]
    InvalidPosition {
        chromosome: String,
        position: u64,
    },

    #[error("invalid depth on {chromosome}:{position}: {reason}")]
    InvalidDepth {
        chromosome: String,
        position: u64,
        reason: String,
    },

    #[error("malformed depth table line {line}: {reason}")]
    MalformedLine {
        line: usize,
        reason: String,
    },

    #[error("bigWig output failed: {0}")]
    BigWig(String),
}

impl CoverageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoverageError::Io { path: path.into(), source }
    }

    pub fn htslib(context: impl Into<String>, source: rust_htslib::errors::Error) -> Self {
        CoverageError::Htslib { context: context.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;
