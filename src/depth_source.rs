//depth_source.rs
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use rust_htslib::bam::{self, FetchDefinition, Read};
use tracing::{debug, info};

use crate::bam_index::ensure_index;
use crate::core::alignment_policy::AlignmentPolicy;
use crate::core::depth_record::DepthRecord;
use crate::errors::{CoverageError, Result};

/// Update the progress bar every this many pileup columns.
const PROGRESS_STEP: u64 = 1 << 16;

/// htslib's own per-column limit. It is applied before any read filtering, so it is kept out
/// of reach and the real cap is taken on the filtered count.
const HTSLIB_MAX_DEPTH: u32 = i32::MAX as u32;

/// Anything that can produce a chromosome-grouped, position-sorted depth stream.
pub trait DepthSource {
    /// Chromosome lengths known to the source, in source order. May be empty.
    fn chrom_sizes(&self) -> Vec<(String, u64)>;

    /// Hand every record to `sink`. Stops at the first error returned by `sink`.
    fn visit(&mut self, sink: &mut dyn FnMut(DepthRecord) -> Result<()>) -> Result<()>;
}

/// How an input path is read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// BAM (or anything else htslib can open with an index)
    Alignment,
    /// `chr<TAB>pos<TAB>depth` text, optionally gzipped
    DepthTable,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Self {
        let name = path.to_string_lossy().to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".tsv") || name.ends_with(".txt") || name.ends_with(".depth") {
            InputKind::DepthTable
        } else {
            InputKind::Alignment
        }
    }
}

/// Open the matching depth source for `path`.
pub fn open_source(path: &Path) -> Result<Box<dyn DepthSource>> {
    match InputKind::from_path(path) {
        InputKind::Alignment => Ok(Box::new(BamDepthSource::open(path)?)),
        InputKind::DepthTable => Ok(Box::new(DepthTableSource::open(path)?)),
    }
}

// ============================
// Pileup over an indexed BAM
// ============================

pub struct BamDepthSource {
    path: PathBuf,
    reader: bam::IndexedReader,
    targets: Vec<(String, u64)>,
    policy: AlignmentPolicy,
}

impl BamDepthSource {
    /// Open `path`, building a `.bai` next to it first if no index exists.
    pub fn open(path: &Path) -> Result<Self> {
        ensure_index(path)?;
        let reader = bam::IndexedReader::from_path(path)
            .map_err(|e| CoverageError::htslib(format!("could not open {}", path.display()), e))?;

        let header = reader.header().clone();
        let targets = (0..header.target_count())
            .map(|tid| {
                let name = String::from_utf8_lossy(header.tid2name(tid)).to_string();
                let len = header.target_len(tid).unwrap_or(0);
                (name, len)
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            targets,
            policy: AlignmentPolicy::default(),
        })
    }
}

impl DepthSource for BamDepthSource {
    fn chrom_sizes(&self) -> Vec<(String, u64)> {
        self.targets.clone()
    }

    fn visit(&mut self, sink: &mut dyn FnMut(DepthRecord) -> Result<()>) -> Result<()> {
        let Self { path, reader, targets, policy } = self;

        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40}] {pos}/{len} bp")
            .map_err(|e| CoverageError::io(path.as_path(), std::io::Error::other(e.to_string())))?;

        for (tid, (chr, length)) in targets.iter().enumerate() {
            reader
                .fetch(FetchDefinition::CompleteTid(tid as i32))
                .map_err(|e| CoverageError::htslib(format!("could not fetch {chr} from {}", path.display()), e))?;
            info!("piling up {chr} ({length} bp)");

            let pb = ProgressBar::new(*length);
            pb.set_style(style.clone());
            pb.set_prefix(chr.clone());

            let mut pileups = reader.pileup();
            pileups.set_max_depth(HTSLIB_MAX_DEPTH);

            let mut columns = 0_u64;
            for column in pileups {
                let column = column
                    .map_err(|e| CoverageError::htslib(format!("pileup failed on {chr}"), e))?;
                let depth = policy.column_depth(column.alignments().map(|aln| aln.record()));

                columns += 1;
                if columns % PROGRESS_STEP == 0 {
                    pb.set_position(column.pos() as u64);
                }
                // nothing left after read filtering: same as no column at all
                if depth == 0 {
                    continue;
                }
                sink(DepthRecord::new(chr.as_str(), column.pos() as u64 + 1, depth as i64))?;
            }
            pb.finish_and_clear();
            debug!("{chr}: {columns} pileup columns");
        }
        Ok(())
    }
}

// ============================
// Text depth tables
// ============================

/// Reads `chr<TAB>pos<TAB>depth` lines, e.g. `samtools depth` output.
pub struct DepthTableSource {
    path: PathBuf,
}

impl DepthTableSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoverageError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "depth table not found"),
            ));
        }
        Ok(Self { path: path.to_path_buf() })
    }

    fn reader(&self) -> Result<Box<dyn BufRead>> {
        let file = File::open(&self.path).map_err(|e| CoverageError::io(&self.path, e))?;
        if self.path.extension().is_some_and(|ext| ext == "gz") {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }

    /// Pull-based access to the table records.
    pub fn records(&self) -> Result<impl Iterator<Item = Result<DepthRecord>>> {
        let path = self.path.clone();
        let lines = self.reader()?.lines().enumerate();
        Ok(lines.filter_map(move |(i, line)| match line {
            Ok(line) => parse_depth_line(&line, i + 1).transpose(),
            Err(e) => Some(Err(CoverageError::io(&path, e))),
        }))
    }
}

impl DepthSource for DepthTableSource {
    fn chrom_sizes(&self) -> Vec<(String, u64)> {
        Vec::new()
    }

    fn visit(&mut self, sink: &mut dyn FnMut(DepthRecord) -> Result<()>) -> Result<()> {
        for record in self.records()? {
            sink(record?)?;
        }
        Ok(())
    }
}

/// Parse one table line. `Ok(None)` for blank lines, comments and the header.
pub fn parse_depth_line(line: &str, line_no: usize) -> Result<Option<DepthRecord>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split('\t');
    let chr = fields.next().unwrap_or_default();
    if chr.is_empty() {
        return Err(CoverageError::MalformedLine { line: line_no, reason: "missing chromosome".to_string() });
    }

    let pos = match fields.next() {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err(CoverageError::MalformedLine { line: line_no, reason: "missing position column".to_string() })
        }
    };
    if line_no == 1 && pos == "pos" {
        return Ok(None);
    }
    let position: u64 = pos.trim().parse().map_err(|_| CoverageError::MalformedLine {
        line: line_no,
        reason: format!("position '{pos}' is not an integer"),
    })?;

    let depth = match fields.next().map(str::trim) {
        Some(d) if !d.is_empty() => d.parse::<i64>().map_err(|_| CoverageError::InvalidDepth {
            chromosome: chr.to_string(),
            position,
            reason: format!("depth '{d}' is not an integer"),
        })?,
        _ => {
            return Err(CoverageError::InvalidDepth {
                chromosome: chr.to_string(),
                position,
                reason: "missing depth".to_string(),
            })
        }
    };

    Ok(Some(DepthRecord::new(chr, position, depth)))
}
