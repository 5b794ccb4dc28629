//depth_record.rs

/// One depth observation as delivered by a depth source.
/// `position` is 1-based. `depth` is signed so that a source can hand over
/// whatever it read and the compressor decides whether it is acceptable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthRecord {
    pub chromosome: String,
    pub position: u64,
    pub depth: i64,
}

impl DepthRecord {
    pub fn new(chromosome: impl Into<String>, position: u64, depth: i64) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            depth,
        }
    }
}
