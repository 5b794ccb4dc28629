//output.rs
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread::{self, JoinHandle};

use bigtools::beddata::BedParserStreamingIterator;
use bigtools::BigWigWrite;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::core::segment::CoverageSegment;
use crate::errors::{CoverageError, Result};

/// Column names of the segment table.
pub const TABLE_HEADER: &str = "chr\tstart\tend\tvalue1";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    GzTable,
    BigWig,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        let name = path.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".bw") || name.ends_with(".bigwig") {
            OutputFormat::BigWig
        } else if name.ends_with(".gz") {
            OutputFormat::GzTable
        } else {
            OutputFormat::Table
        }
    }
}

/// Segments waiting in the channel to the bigWig writer thread.
const BIGWIG_CHANNEL_SIZE: usize = 4096;

type BigWigItem = (String, bigtools::Value);

/// Writes surviving segments in the order they are handed in.
pub enum SegmentWriter {
    Table { path: PathBuf, out: BufWriter<File> },
    GzTable { path: PathBuf, out: GzEncoder<BufWriter<File>> },
    /// Chromosome sizes are known: segments go straight to a writer thread.
    BigWigStream {
        path: PathBuf,
        tx: Option<SyncSender<BigWigItem>>,
        worker: Option<JoinHandle<Result<()>>>,
    },
    /// No chromosome sizes: segments are kept until `finish` to size the chromosomes.
    BigWig { path: PathBuf, segments: Vec<CoverageSegment> },
}

impl SegmentWriter {
    /// `chrom_sizes` is only used for bigWig output. Table outputs are created (and the header
    /// written) right away.
    pub fn create(path: &Path, chrom_sizes: &[(String, u64)]) -> Result<Self> {
        let format = OutputFormat::from_path(path);
        debug!("writing {:?} to {}", format, path.display());
        let path = path.to_path_buf();

        let mut writer = match format {
            OutputFormat::BigWig if chrom_sizes.is_empty() => {
                return Ok(SegmentWriter::BigWig { path, segments: Vec::new() })
            }
            OutputFormat::BigWig => {
                let chrom_map = bigwig_chrom_map(&[], chrom_sizes);
                let (tx, rx) = sync_channel::<BigWigItem>(BIGWIG_CHANNEL_SIZE);
                let worker_path = path.clone();
                let worker = thread::Builder::new()
                    .name("bigwig-writer".to_string())
                    .spawn(move || write_bigwig(&worker_path, chrom_map, rx.into_iter()))
                    .map_err(|e| CoverageError::io(&path, e))?;
                return Ok(SegmentWriter::BigWigStream { path, tx: Some(tx), worker: Some(worker) });
            }
            OutputFormat::Table | OutputFormat::GzTable => {
                let file = File::create(&path).map_err(|e| CoverageError::io(&path, e))?;
                let out = BufWriter::new(file);
                if format == OutputFormat::GzTable {
                    SegmentWriter::GzTable { path, out: GzEncoder::new(out, Compression::default()) }
                } else {
                    SegmentWriter::Table { path, out }
                }
            }
        };
        writer.write_line(TABLE_HEADER)?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        match self {
            SegmentWriter::Table { path, .. }
            | SegmentWriter::GzTable { path, .. }
            | SegmentWriter::BigWigStream { path, .. }
            | SegmentWriter::BigWig { path, .. } => path,
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let res = match self {
            SegmentWriter::Table { out, .. } => writeln!(out, "{line}"),
            SegmentWriter::GzTable { out, .. } => writeln!(out, "{line}"),
            SegmentWriter::BigWigStream { .. } | SegmentWriter::BigWig { .. } => Ok(()),
        };
        res.map_err(|e| CoverageError::io(self.path(), e))
    }

    pub fn write(&mut self, segment: &CoverageSegment) -> Result<()> {
        match self {
            SegmentWriter::BigWig { segments, .. } => {
                segments.push(segment.clone());
                Ok(())
            }
            SegmentWriter::BigWigStream { tx, worker, .. } => {
                let item = (segment.chromosome.clone(), segment.to_bigwig_value());
                if tx.as_ref().is_some_and(|tx| tx.send(item).is_ok()) {
                    return Ok(());
                }
                // the writer thread is gone, its result says why
                match join_worker(tx.take(), worker.take()) {
                    Err(e) => Err(e),
                    Ok(()) => Err(CoverageError::BigWig(
                        "writer stopped before all segments were written".to_string(),
                    )),
                }
            }
            _ => self.write_line(&segment.to_string()),
        }
    }

    /// Flush everything and close the output.
    pub fn finish(self) -> Result<()> {
        match self {
            SegmentWriter::Table { path, mut out } => out.flush().map_err(|e| CoverageError::io(&path, e)),
            SegmentWriter::GzTable { path, out } => {
                let mut inner = out.finish().map_err(|e| CoverageError::io(&path, e))?;
                inner.flush().map_err(|e| CoverageError::io(&path, e))
            }
            SegmentWriter::BigWigStream { tx, worker, .. } => join_worker(tx, worker),
            SegmentWriter::BigWig { path, segments } => {
                let chrom_map = bigwig_chrom_map(&segments, &[]);
                let values = segments.into_iter().map(|seg| {
                    let value = seg.to_bigwig_value();
                    (seg.chromosome, value)
                });
                write_bigwig(&path, chrom_map, values)
            }
        }
    }

    /// Stop writing without finishing. Returns true when this writer has already put a
    /// (now incomplete) file at its path.
    pub fn abort(self) -> bool {
        match self {
            SegmentWriter::Table { .. } | SegmentWriter::GzTable { .. } => true,
            SegmentWriter::BigWigStream { tx, worker, .. } => {
                // wait for the thread so it does not write after the caller cleans up
                let _ = join_worker(tx, worker);
                true
            }
            SegmentWriter::BigWig { .. } => false,
        }
    }
}

fn join_worker(tx: Option<SyncSender<BigWigItem>>, worker: Option<JoinHandle<Result<()>>>) -> Result<()> {
    // closing the channel ends the writer's input
    drop(tx);
    match worker {
        Some(handle) => handle
            .join()
            .map_err(|_| CoverageError::BigWig("writer thread panicked".to_string()))?,
        None => Ok(()),
    }
}

/// Chromosome sizes for the bigWig header: the known ones, plus the largest end of every
/// chromosome that only shows up in the segments.
pub fn bigwig_chrom_map(segments: &[CoverageSegment], chrom_sizes: &[(String, u64)]) -> HashMap<String, u32> {
    let mut chrom_map: HashMap<String, u32> = chrom_sizes
        .iter()
        .map(|(chrom, len)| (chrom.clone(), (*len).min(u32::MAX as u64) as u32))
        .collect();
    for seg in segments {
        let end = seg.end.min(u32::MAX as u64) as u32;
        let len = chrom_map.entry(seg.chromosome.clone()).or_insert(end);
        if *len < end {
            *len = end;
        }
    }
    chrom_map
}

fn write_bigwig<I>(path: &Path, chrom_map: HashMap<String, u32>, values: I) -> Result<()>
where
    I: Iterator<Item = BigWigItem> + Send + 'static,
{
    let mut outb = BigWigWrite::create_file(path, chrom_map)
        .map_err(|e| CoverageError::BigWig(format!("Failed to create BigWig file: {}", e)))?;
    outb.options.compress = true;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| CoverageError::io(path, e))?;

    let data = BedParserStreamingIterator::wrap_infallible_iter(values, true);

    outb.write(data, runtime)
        .map_err(|e| CoverageError::BigWig(format!("Failed to write BigWig file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_output_format() {
        assert_eq!(OutputFormat::from_path(Path::new("x.tsv")), OutputFormat::Table);
        assert_eq!(OutputFormat::from_path(Path::new("x.csv")), OutputFormat::Table);
        assert_eq!(OutputFormat::from_path(Path::new("x.tsv.gz")), OutputFormat::GzTable);
        assert_eq!(OutputFormat::from_path(Path::new("x.bw")), OutputFormat::BigWig);
        assert_eq!(OutputFormat::from_path(Path::new("x.BigWig")), OutputFormat::BigWig);
    }

    #[test]
    fn test_table_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        let mut w = SegmentWriter::create(&path, &[]).unwrap();
        w.write(&CoverageSegment::new("chr1", 1, 3, 5)).unwrap();
        w.write(&CoverageSegment::new("chr1", 4, 5, 3)).unwrap();
        w.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "chr\tstart\tend\tvalue1\nchr1\t1\t3\t5\nchr1\t4\t5\t3\n");
    }

    #[test]
    fn test_empty_table_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tsv");
        SegmentWriter::create(&path, &[]).unwrap().finish().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "chr\tstart\tend\tvalue1\n");
    }

    #[test]
    fn test_gz_table_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv.gz");
        let mut w = SegmentWriter::create(&path, &[]).unwrap();
        w.write(&CoverageSegment::new("chr2", 1, 3, 9)).unwrap();
        w.finish().unwrap();

        let mut text = String::new();
        flate2::read::MultiGzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "chr\tstart\tend\tvalue1\nchr2\t1\t3\t9\n");
    }

    #[test]
    fn test_chrom_map_fills_unknown_chromosomes() {
        let segs = vec![
            CoverageSegment::new("chr1", 1, 30, 2),
            CoverageSegment::new("chrUn", 5, 12, 1),
            CoverageSegment::new("chrUn", 20, 40, 1),
        ];
        let map = bigwig_chrom_map(&segs, &[("chr1".to_string(), 1000)]);
        assert_eq!(map["chr1"], 1000);
        assert_eq!(map["chrUn"], 40);
    }

    #[test]
    fn test_bigwig_streams_with_known_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bw");
        let mut w = SegmentWriter::create(&path, &[("chr1".to_string(), 100)]).unwrap();
        assert!(matches!(w, SegmentWriter::BigWigStream { .. }));
        w.write(&CoverageSegment::new("chr1", 1, 3, 5)).unwrap();
        w.write(&CoverageSegment::new("chr1", 4, 9, 3)).unwrap();
        w.finish().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_bigwig_buffers_without_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bw");
        let mut w = SegmentWriter::create(&path, &[]).unwrap();
        assert!(matches!(w, SegmentWriter::BigWig { .. }));
        w.write(&CoverageSegment::new("chrUn", 10, 20, 2)).unwrap();
        assert!(!path.exists());
        w.finish().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_abort_reports_whether_the_file_was_touched() {
        let dir = tempfile::tempdir().unwrap();

        let table = dir.path().join("out.tsv");
        assert!(SegmentWriter::create(&table, &[]).unwrap().abort());

        let bw = dir.path().join("keep.bw");
        std::fs::write(&bw, b"previous run").unwrap();
        let mut w = SegmentWriter::create(&bw, &[]).unwrap();
        w.write(&CoverageSegment::new("chr1", 1, 2, 1)).unwrap();
        assert!(!w.abort());
        assert_eq!(std::fs::read(&bw).unwrap(), b"previous run");

        let streamed = dir.path().join("stream.bw");
        let w = SegmentWriter::create(&streamed, &[("chr1".to_string(), 50)]).unwrap();
        assert!(w.abort());
    }
}
