//! Per-block ripe/unripe file writer. Mirrors `blaze.go`'s `WriteAppearances`:
//! sort, render, atomic write-then-rename. Files with zero appearances are
//! still produced so the consumer can detect completion (§4.4 totality).

use std::collections::BTreeSet;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::address::format_lower;
use crate::error::IndexError;
use crate::extract::Appearance;
use crate::paths::{txid5, IndexPaths};

/// Renders one line of the ripe/unripe/staged file format.
pub fn render_line(appearance: &Appearance) -> String {
    format!(
        "{}\t{}\t{}\n",
        format_lower(&appearance.address),
        crate::paths::block9(appearance.block),
        txid5(appearance.tx_index)
    )
}

/// Writes the (possibly empty) appearance set for `block` to `ripe/` or
/// `unripe/` depending on `ripe_block`, atomically.
pub async fn write_block(
    paths: &IndexPaths,
    block: u32,
    ripe_block: u32,
    appearances: &BTreeSet<Appearance>,
) -> Result<(), IndexError> {
    let target = paths.appearance_file(block, ripe_block);
    let contents: String = appearances.iter().map(render_line).collect();
    write_atomic(&target, contents.as_bytes()).await
}

/// Writes `bytes` to `target` by first writing a sibling temp file and
/// renaming it into place, so a reader never observes a partially written
/// file.
pub async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let dir = target
        .parent()
        .ok_or_else(|| IndexError::Usage(format!("no parent directory for {}", target.display())))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| IndexError::io(dir, err))?;

    let tmp = dir.join(format!(
        ".{}.tmp-{}",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("appearance"),
        std::process::id()
    ));

    {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|err| IndexError::io(&tmp, err))?;
        file.write_all(bytes)
            .await
            .map_err(|err| IndexError::io(&tmp, err))?;
        file.sync_all().await.map_err(|err| IndexError::io(&tmp, err))?;
    }

    tokio::fs::rename(&tmp, target)
        .await
        .map_err(|err| IndexError::io(target, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    #[test]
    fn line_is_tab_separated_and_sorted_by_address() {
        let a = Appearance {
            address: Address::new([0x01; 20]),
            block: 5,
            tx_index: 3,
        };
        let line = render_line(&a);
        assert_eq!(
            line,
            "0x0101010101010101010101010101010101010101\t000000005\t00003\n"
        );
    }

    #[tokio::test]
    async fn empty_appearance_set_still_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        write_block(&paths, 970, 972, &BTreeSet::new())
            .await
            .unwrap();
        let path = paths.appearance_file(970, 972);
        assert!(path.exists());
        assert_eq!(tokio::fs::read(&path).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn lines_are_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut set = BTreeSet::new();
        set.insert(Appearance {
            address: Address::new([0x02; 20]),
            block: 1,
            tx_index: 0,
        });
        set.insert(Appearance {
            address: Address::new([0x01; 20]),
            block: 1,
            tx_index: 0,
        });
        write_block(&paths, 1, 100, &set).await.unwrap();
        let contents = tokio::fs::read_to_string(paths.appearance_file(1, 100))
            .await
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }
}
