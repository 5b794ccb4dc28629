//run_compressor.rs
use std::collections::HashSet;

use tracing::debug;

use crate::core::depth_record::DepthRecord;
use crate::core::segment::{keep_segment, CoverageSegment};
use crate::errors::{CoverageError, Result};

/// The run that is still growing for the current chromosome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenRun {
    start: u64,
    prev_pos: u64,
    depth: u64,
}

impl OpenRun {
    fn at(position: u64, depth: u64) -> Self {
        Self { start: position, prev_pos: position, depth }
    }

    fn close(&self, chromosome: &str) -> CoverageSegment {
        CoverageSegment::new(chromosome, self.start, self.prev_pos, self.depth)
    }
}

/// Folds a chromosome-grouped, position-sorted depth stream into constant-depth runs.
///
/// The compressor is push based: feed records with [`RunCompressor::push`], every call
/// returns at most one finished candidate segment, and [`RunCompressor::finish`] flushes the
/// run still open at the end of the stream. Candidates are *not* filtered here, use
/// [`keep_segment`] or the [`compress`] adapter for that.
///
/// A run is closed whenever the depth changes or the position is not `prev + 1`.
/// A change of chromosome closes the current group; a group may never be re-opened.
#[derive(Debug, Default)]
pub struct RunCompressor {
    chromosome: Option<String>,
    open: Option<OpenRun>,
    closed_groups: HashSet<String>,
    records: u64,
}

impl RunCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records accepted so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Number of chromosome groups started so far.
    pub fn groups(&self) -> usize {
        self.closed_groups.len() + usize::from(self.chromosome.is_some())
    }

    pub fn push(&mut self, record: DepthRecord) -> Result<Option<CoverageSegment>> {
        let DepthRecord { chromosome, position, depth } = record;

        if position == 0 {
            return Err(CoverageError::InvalidPosition { chromosome, position });
        }
        if depth < 0 {
            return Err(CoverageError::InvalidDepth {
                chromosome,
                position,
                reason: format!("negative depth {depth}"),
            });
        }
        let depth = depth as u64;

        if self.chromosome.as_deref() != Some(chromosome.as_str()) {
            if self.closed_groups.contains(&chromosome) {
                return Err(CoverageError::UngroupedChromosome { chromosome, position });
            }
            let flushed = self.finish();
            debug!("opening chromosome group {chromosome}");
            self.chromosome = Some(chromosome);
            self.open = Some(OpenRun::at(position, depth));
            self.records += 1;
            return Ok(flushed);
        }

        let chr = self.chromosome.as_deref().unwrap_or_default();
        let closed = match self.open.as_mut() {
            None => {
                self.open = Some(OpenRun::at(position, depth));
                None
            }
            Some(run) => {
                if position <= run.prev_pos {
                    return Err(CoverageError::OrderingViolation {
                        chromosome: chr.to_string(),
                        previous: run.prev_pos,
                        position,
                    });
                }
                // depth change and positional gap are independent triggers
                if depth != run.depth || position != run.prev_pos + 1 {
                    let done = run.close(chr);
                    *run = OpenRun::at(position, depth);
                    Some(done)
                } else {
                    run.prev_pos = position;
                    None
                }
            }
        };
        self.records += 1;
        Ok(closed)
    }

    /// Close the current chromosome group and return its last candidate, if any.
    pub fn finish(&mut self) -> Option<CoverageSegment> {
        let chromosome = self.chromosome.take()?;
        let last = self.open.take().map(|run| run.close(&chromosome));
        self.closed_groups.insert(chromosome);
        last
    }
}

/// Pull-based view of a [`RunCompressor`]: every candidate segment, degenerate ones included.
/// Stops after the first error.
pub struct Candidates<I> {
    records: I,
    compressor: RunCompressor,
    done: bool,
}

impl<I> Iterator for Candidates<I>
where
    I: Iterator<Item = Result<DepthRecord>>,
{
    type Item = Result<CoverageSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.records.next() {
                Some(Ok(record)) => match self.compressor.push(record) {
                    Ok(Some(segment)) => return Some(Ok(segment)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return self.compressor.finish().map(Ok);
                }
            }
        }
    }
}

/// All candidate segments for a record stream, before filtering.
pub fn candidates<I>(records: I) -> Candidates<I::IntoIter>
where
    I: IntoIterator<Item = Result<DepthRecord>>,
{
    Candidates {
        records: records.into_iter(),
        compressor: RunCompressor::new(),
        done: false,
    }
}

/// The filtered segment stream: candidates spanning a single position are dropped.
pub fn compress<I>(records: I) -> impl Iterator<Item = Result<CoverageSegment>>
where
    I: IntoIterator<Item = Result<DepthRecord>>,
{
    candidates(records).filter(|res| res.as_ref().map_or(true, keep_segment))
}

/// Collect the filtered segments, failing on the first invalid record.
pub fn compress_to_vec<I>(records: I) -> Result<Vec<CoverageSegment>>
where
    I: IntoIterator<Item = Result<DepthRecord>>,
{
    compress(records).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn stream(data: &[(&str, u64, i64)]) -> Vec<Result<DepthRecord>> {
        data.iter()
            .map(|(chr, pos, depth)| Ok(DepthRecord::new(*chr, *pos, *depth)))
            .collect()
    }

    fn seg(chr: &str, start: u64, end: u64, depth: u64) -> CoverageSegment {
        CoverageSegment::new(chr, start, end, depth)
    }

    #[test]
    fn test_depth_change_splits_runs() {
        let input = stream(&[("chr1", 1, 5), ("chr1", 2, 5), ("chr1", 3, 5), ("chr1", 4, 3), ("chr1", 5, 3)]);
        let out = compress_to_vec(input).unwrap();
        assert_eq!(out, vec![seg("chr1", 1, 3, 5), seg("chr1", 4, 5, 3)]);
    }

    #[test]
    fn test_single_position_is_dropped() {
        let out = compress_to_vec(stream(&[("chr1", 1, 5)])).unwrap();
        assert!(out.is_empty());

        let cand: Vec<_> = candidates(stream(&[("chr1", 1, 5)])).collect::<Result<_>>().unwrap();
        assert_eq!(cand, vec![seg("chr1", 1, 1, 5)]);
    }

    #[test]
    fn test_gap_splits_runs() {
        let input = stream(&[("chr1", 1, 2), ("chr1", 2, 2), ("chr1", 5, 2), ("chr1", 6, 2)]);
        let out = compress_to_vec(input).unwrap();
        assert_eq!(out, vec![seg("chr1", 1, 2, 2), seg("chr1", 5, 6, 2)]);
    }

    #[test]
    fn test_two_chromosomes() {
        let input = stream(&[("chr1", 1, 4), ("chr1", 2, 4), ("chr2", 1, 9), ("chr2", 2, 9), ("chr2", 3, 9)]);
        let out = compress_to_vec(input).unwrap();
        assert_eq!(out, vec![seg("chr1", 1, 2, 4), seg("chr2", 1, 3, 9)]);
    }

    #[test]
    fn test_decreasing_position_is_an_error() {
        let input = stream(&[("chr1", 5, 3), ("chr1", 4, 3)]);
        match compress_to_vec(input) {
            Err(CoverageError::OrderingViolation { chromosome, previous, position }) => {
                assert_eq!(chromosome, "chr1");
                assert_eq!((previous, position), (5, 4));
            }
            other => panic!("expected an ordering violation, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_position_is_an_error() {
        let input = stream(&[("chr1", 1, 3), ("chr1", 2, 3), ("chr1", 2, 3)]);
        assert!(matches!(
            compress_to_vec(input),
            Err(CoverageError::OrderingViolation { position: 2, previous: 2, .. })
        ));
    }

    #[test]
    fn test_error_stops_the_stream() {
        let input = stream(&[("chr1", 1, 3), ("chr1", 2, 4), ("chr1", 1, 4), ("chr1", 7, 4)]);
        let items: Vec<_> = candidates(input).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn test_gap_and_depth_change_at_once() {
        let input = stream(&[("chr1", 10, 1), ("chr1", 11, 1), ("chr1", 20, 7), ("chr1", 21, 7)]);
        let out = compress_to_vec(input).unwrap();
        assert_eq!(out, vec![seg("chr1", 10, 11, 1), seg("chr1", 20, 21, 7)]);
    }

    #[test]
    fn test_negative_depth_is_rejected() {
        let input = stream(&[("chr1", 1, 2), ("chr1", 2, -1)]);
        assert!(matches!(
            compress_to_vec(input),
            Err(CoverageError::InvalidDepth { position: 2, .. })
        ));
    }

    #[test]
    fn test_zero_position_is_rejected() {
        let input = stream(&[("chr1", 0, 2)]);
        assert!(matches!(compress_to_vec(input), Err(CoverageError::InvalidPosition { .. })));
    }

    #[test]
    fn test_zero_depth_is_a_valid_value() {
        let input = stream(&[("chr1", 1, 0), ("chr1", 2, 0), ("chr1", 3, 1), ("chr1", 4, 1)]);
        let out = compress_to_vec(input).unwrap();
        assert_eq!(out, vec![seg("chr1", 1, 2, 0), seg("chr1", 3, 4, 1)]);
    }

    #[test]
    fn test_regrouped_chromosome_is_rejected() {
        let input = stream(&[("chr1", 1, 1), ("chr2", 1, 1), ("chr1", 5, 1)]);
        assert!(matches!(
            compress_to_vec(input),
            Err(CoverageError::UngroupedChromosome { position: 5, .. })
        ));
    }

    #[test]
    fn test_positions_restart_per_chromosome() {
        let input = stream(&[("chr1", 100, 2), ("chr1", 101, 2), ("chr2", 1, 2), ("chr2", 2, 2)]);
        let out = compress_to_vec(input).unwrap();
        assert_eq!(out, vec![seg("chr1", 100, 101, 2), seg("chr2", 1, 2, 2)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(compress_to_vec(Vec::new()).unwrap().is_empty());
        let mut rc = RunCompressor::new();
        assert_eq!(rc.finish(), None);
        assert_eq!(rc.groups(), 0);
    }

    #[test]
    fn test_push_api_counts() {
        let mut rc = RunCompressor::new();
        assert_eq!(rc.push(DepthRecord::new("chrM", 1, 3)).unwrap(), None);
        assert_eq!(rc.push(DepthRecord::new("chrM", 2, 3)).unwrap(), None);
        assert_eq!(rc.push(DepthRecord::new("chrM", 3, 4)).unwrap(), Some(seg("chrM", 1, 2, 3)));
        assert_eq!(rc.finish(), Some(seg("chrM", 3, 3, 4)));
        assert_eq!(rc.records(), 3);
        assert_eq!(rc.groups(), 1);
    }

    /// Small xorshift so the property checks below are reproducible without extra crates.
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }
    }

    fn random_stream(seed: u64) -> Vec<(String, u64, i64)> {
        let mut rng = XorShift(seed);
        let mut out = Vec::new();
        for chr in ["chr1", "chr2", "chrX"] {
            let mut pos = 1 + rng.next() % 5;
            let mut depth = (rng.next() % 4) as i64;
            for _ in 0..(rng.next() % 300) {
                out.push((chr.to_string(), pos, depth));
                pos += if rng.next() % 10 == 0 { 2 + rng.next() % 5 } else { 1 };
                if rng.next() % 4 == 0 {
                    depth = (rng.next() % 4) as i64;
                }
            }
        }
        out
    }

    #[test]
    fn test_segment_properties_on_random_streams() {
        for seed in 1..40u64 {
            let raw = random_stream(seed * 7919);
            let input = || raw.iter().map(|(c, p, d)| Ok::<_, CoverageError>(DepthRecord::new(c.clone(), *p, *d)));

            let cand: Vec<CoverageSegment> = candidates(input()).collect::<Result<_>>().unwrap();

            // every input position is covered by exactly one candidate
            let mut seen: BTreeMap<&str, BTreeSet<u64>> = BTreeMap::new();
            for seg in &cand {
                let set = seen.entry(seg.chromosome.as_str()).or_default();
                for p in seg.start..=seg.end {
                    assert!(set.insert(p), "position {p} covered twice");
                }
            }
            let mut expected: BTreeMap<&str, BTreeSet<u64>> = BTreeMap::new();
            for (c, p, _) in &raw {
                expected.entry(c.as_str()).or_default().insert(*p);
            }
            assert_eq!(seen, expected);

            // constant depth, and a boundary exactly where contiguity or depth breaks
            let depth_at: BTreeMap<(&str, u64), i64> =
                raw.iter().map(|(c, p, d)| ((c.as_str(), *p), *d)).collect();
            for seg in &cand {
                for p in seg.start..=seg.end {
                    assert_eq!(depth_at[&(seg.chromosome.as_str(), p)] as u64, seg.depth);
                }
            }
            for pair in cand.windows(2) {
                if pair[0].chromosome == pair[1].chromosome {
                    assert!(pair[0].end < pair[1].start);
                    assert!(pair[1].start != pair[0].end + 1 || pair[1].depth != pair[0].depth);
                }
            }

            // filtering and repeatability
            let out = compress_to_vec(input()).unwrap();
            assert!(out.iter().all(|s| s.end > s.start));
            assert_eq!(out, cand.iter().filter(|s| keep_segment(s)).cloned().collect::<Vec<_>>());
            assert_eq!(out, compress_to_vec(input()).unwrap());
        }
    }
}
