//bam_index.rs
use std::path::{Path, PathBuf};

use rust_htslib::bam;
use tracing::info;

use crate::errors::{CoverageError, Result};

/// The index files htslib would pick up for `bam_path`, in lookup order.
pub fn index_candidates(bam_path: &Path) -> Vec<PathBuf> {
    let mut out = Vec::with_capacity(3);
    for ext in ["bai", "csi"] {
        let mut name = bam_path.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        out.push(PathBuf::from(name));
    }
    // sample.bai next to sample.bam
    out.push(bam_path.with_extension("bai"));
    out
}

/// Returns the existing index of `bam_path`, if there is one.
pub fn find_index(bam_path: &Path) -> Option<PathBuf> {
    index_candidates(bam_path).into_iter().find(|p| p.exists())
}

/// Make sure `bam_path` has a position index, building `<bam>.bai` if none is present.
/// Returns the path of the index in use.
pub fn ensure_index(bam_path: &Path) -> Result<PathBuf> {
    if !bam_path.exists() {
        return Err(CoverageError::io(
            bam_path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "alignment file not found"),
        ));
    }

    if let Some(found) = find_index(bam_path) {
        info!("Index file found: {}", found.display());
        return Ok(found);
    }

    let target = index_candidates(bam_path).swap_remove(0);
    info!("Index file not found. Creating index {}", target.display());
    bam::index::build(bam_path, Some(target.as_path()), bam::index::Type::Bai, 1)
        .map_err(|source| CoverageError::Index { path: bam_path.to_path_buf(), source })?;
    Ok(target)
}
