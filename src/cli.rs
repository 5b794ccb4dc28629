//cli.rs
use std::path::PathBuf;

use clap::Parser;

/// Compress per-position depth of coverage into constant-depth segments.
///
/// The input is an alignment file (indexed on the fly if no .bai/.csi exists) or a
/// `chr pos depth` table (.tsv/.txt/.depth, optionally .gz). The output is a tab separated
/// table `chr start end value1` (.gz for compressed, .bw/.bigwig for bigWig).
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct RunsCli {
    /// Input BAM file (sorted by chromosome position) or depth table
    #[arg(short = 'i', long = "input", visible_alias = "input-bam")]
    pub input: PathBuf,

    /// Output segment table
    #[arg(short = 'o', long = "outfile", visible_alias = "output-csv")]
    pub outfile: PathBuf,
}
