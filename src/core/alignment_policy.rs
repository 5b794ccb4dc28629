//alignment_policy.rs
use rust_htslib::bam::Record;

/// SAM flag bits (u16)
const FLAG_UNMAPPED: u16      = 0x4;
const FLAG_SECONDARY: u16     = 0x100;
const FLAG_QCFAIL: u16        = 0x200;
const FLAG_DUPLICATE: u16     = 0x400;

/// Maximum depth reported for one pileup column. Only alignments passing the filter count.
pub const MAX_PILEUP_DEPTH: u32 = 8000;

/// Which alignments count towards the depth of a pileup column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlignmentPolicy {
    pub min_mapq: u8,
    /// Alignments with ANY of these flag bits set are skipped.
    pub sam_flag_exclude: u16,
}

impl Default for AlignmentPolicy {
    /// The usual pileup read filter: unmapped, secondary, QC-fail and duplicate reads are skipped.
    fn default() -> Self {
        Self {
            min_mapq: 0,
            sam_flag_exclude: FLAG_UNMAPPED | FLAG_SECONDARY | FLAG_QCFAIL | FLAG_DUPLICATE,
        }
    }
}

impl AlignmentPolicy {
    #[inline]
    pub fn passes_filter(&self, rec: &Record) -> bool {
        let flag: u16 = rec.flags();

        if (flag & self.sam_flag_exclude) != 0 {
            return false;
        }

        rec.mapq() >= self.min_mapq
    }

    /// Depth of one pileup column: the alignments passing the filter, capped at
    /// [`MAX_PILEUP_DEPTH`]. Filtered alignments never use up the cap.
    pub fn column_depth<I>(&self, records: I) -> u32
    where
        I: IntoIterator<Item = Record>,
    {
        records
            .into_iter()
            .filter(|rec| self.passes_filter(rec))
            .take(MAX_PILEUP_DEPTH as usize)
            .count() as u32
    }
}
