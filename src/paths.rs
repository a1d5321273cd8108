//! `index_root` directory layout helpers shared by every writer, mirroring
//! `config.GetPathToIndex` plus the `ripe/`/`unripe/`/`staging/`/`finalized/`
//! naming from the original scraper.

use std::path::{Path, PathBuf};

/// Zero-padded 9-digit block number, as used in every on-disk file name.
pub fn block9(block: u32) -> String {
    format!("{block:09}")
}

/// Zero-padded 5-digit transaction index, as used in ripe/unripe lines.
pub fn txid5(txid: u32) -> String {
    format!("{txid:05}")
}

/// Root of the three appearance-file directories and `ts.bin`.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    root: PathBuf,
}

impl IndexPaths {
    /// Wraps `root` (the `index_root` configuration value).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/unripe`
    pub fn unripe_dir(&self) -> PathBuf {
        self.root.join("unripe")
    }

    /// `<root>/ripe`
    pub fn ripe_dir(&self) -> PathBuf {
        self.root.join("ripe")
    }

    /// `<root>/staging`
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    /// `<root>/finalized`
    pub fn finalized_dir(&self) -> PathBuf {
        self.root.join("finalized")
    }

    /// `<root>/ts.bin`
    pub fn timestamp_file(&self) -> PathBuf {
        self.root.join("ts.bin")
    }

    /// Path for block `block`'s appearance file, in `ripe/` if
    /// `block <= ripe_block` else `unripe/`.
    pub fn appearance_file(&self, block: u32, ripe_block: u32) -> PathBuf {
        let dir = if block <= ripe_block {
            self.ripe_dir()
        } else {
            self.unripe_dir()
        };
        dir.join(format!("{}.txt", block9(block)))
    }

    /// Path for the staged copy of block `block`'s appearance file.
    pub fn staged_file(&self, block: u32) -> PathBuf {
        self.staging_dir().join(format!("{}.txt", block9(block)))
    }

    /// `<root>/finalized/<first>-<last>.bin` and the matching `.bloom`.
    pub fn chunk_files(&self, first_block: u32, last_block: u32) -> (PathBuf, PathBuf) {
        let stem = format!("{}-{}", block9(first_block), block9(last_block));
        (
            self.finalized_dir().join(format!("{stem}.bin")),
            self.finalized_dir().join(format!("{stem}.bloom")),
        )
    }

    /// Creates `unripe/`, `ripe/`, `staging/`, and `finalized/` if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.unripe_dir(),
            self.ripe_dir(),
            self.staging_dir(),
            self.finalized_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// The configured root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_ripe_vs_unripe_classification() {
        let paths = IndexPaths::new("/index");
        assert_eq!(
            paths.appearance_file(970, 972),
            Path::new("/index/ripe/000000970.txt")
        );
        assert_eq!(
            paths.appearance_file(985, 972),
            Path::new("/index/unripe/000000985.txt")
        );
    }
}
