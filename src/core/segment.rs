//segment.rs
use std::fmt;
use std::fmt::Display;

/// A maximal run of contiguous positions sharing one depth.
/// Coordinates are 1-based and inclusive: [start, end].
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct CoverageSegment {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub depth: u64,
}

impl Display for CoverageSegment {
    /// One row of the output table: chr, start, end, value1
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t{}", self.chromosome, self.start, self.end, self.depth)
    }
}

impl CoverageSegment {
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64, depth: u64) -> Self {
        Self {
            chromosome: chromosome.into(),
            start,
            end,
            depth,
        }
    }

    /// A segment covering exactly one position.
    pub fn is_degenerate(&self) -> bool {
        self.end == self.start
    }

    /// The bigWig view of this segment: 0-based, half-open [start-1, end).
    pub fn to_bigwig_value(&self) -> bigtools::Value {
        bigtools::Value {
            start: (self.start - 1).min(u32::MAX as u64) as u32,
            end: self.end.min(u32::MAX as u64) as u32,
            value: self.depth as f32,
        }
    }
}

/// The segment filter: only runs spanning at least two positions are kept.
/// Single-position runs are dropped from the output by contract.
#[inline]
pub fn keep_segment(segment: &CoverageSegment) -> bool {
    debug_assert!(segment.end >= segment.start, "inverted segment {segment:?}");
    !segment.is_degenerate()
}
