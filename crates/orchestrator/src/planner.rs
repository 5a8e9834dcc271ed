//! Source folder inventory and size-bounded batching.

use std::sync::Arc;

use tracing::debug;

use cloudferry_shell_pool::RemoteShell;

use crate::TransferError;

/// One regular file below the source folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path on the source host.
    pub path: String,
    /// Path relative to the source folder.
    pub rel_path: String,
    pub size: u64,
}

/// A group of files destined for one archive part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    pub files: Vec<FileEntry>,
}

impl Batch {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// The planner's output: ordered batches plus split decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub batches: Vec<Batch>,
    pub total_size: u64,
    /// True when the folder exceeds the ceiling and parts carry
    /// `.partNNN` names.
    pub needs_split: bool,
}

/// Inventories the source folder and packs it into batches.
///
/// The inventory is one `find` over the folder; an empty or unreadable
/// listing fails the plan (and with it the job).
pub async fn plan(
    shell: &Arc<dyn RemoteShell>,
    host_id: &str,
    folder: &str,
    limit_bytes: u64,
) -> Result<Plan, TransferError> {
    let files = inventory(shell, host_id, folder).await?;
    let total_size = files.iter().map(|f| f.size).sum();
    let batches = first_fit(files, limit_bytes);
    let needs_split = total_size > limit_bytes;

    debug!(
        host = %host_id,
        folder = %folder,
        batches = batches.len(),
        total_bytes = total_size,
        needs_split,
        "plan ready"
    );

    Ok(Plan {
        batches,
        total_size,
        needs_split,
    })
}

async fn inventory(
    shell: &Arc<dyn RemoteShell>,
    host_id: &str,
    folder: &str,
) -> Result<Vec<FileEntry>, TransferError> {
    let cmd = format!("find '{}' -type f -printf '%s\\t%p\\n'", folder);
    let output = shell
        .exec(host_id, &cmd)
        .await
        .map_err(|e| TransferError::Connect(e.to_string()))?;

    if !output.success() {
        return Err(TransferError::Plan(format!(
            "inventory of {folder} failed: {}",
            if output.stderr.is_empty() {
                output.stdout.clone()
            } else {
                output.stderr.clone()
            }
        )));
    }

    let prefix = folder.trim_end_matches('/');
    let mut files = Vec::new();
    for line in output.stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (size, path) = line
            .split_once('\t')
            .ok_or_else(|| TransferError::Plan(format!("unparsable inventory line: {line}")))?;
        let size: u64 = size
            .parse()
            .map_err(|_| TransferError::Plan(format!("unreadable size in line: {line}")))?;
        let rel_path = path
            .strip_prefix(prefix)
            .unwrap_or(path)
            .trim_start_matches('/')
            .to_string();
        files.push(FileEntry {
            path: path.to_string(),
            rel_path,
            size,
        });
    }

    if files.is_empty() {
        return Err(TransferError::Plan(format!(
            "no regular files under {folder}"
        )));
    }
    Ok(files)
}

/// First-fit packing in enumeration order.
///
/// Every batch stays at or below `limit`, with one exception: a file
/// larger than the limit forms a batch of its own. Order is preserved,
/// which keeps directory locality in the archives.
pub fn first_fit(files: Vec<FileEntry>, limit: u64) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = Batch::default();
    let mut current_size: u64 = 0;

    for file in files {
        if file.size > limit {
            if !current.files.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_size = 0;
            }
            batches.push(Batch { files: vec![file] });
            continue;
        }
        if current_size + file.size > limit && !current.files.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += file.size;
        current.files.push(file);
    }

    if !current.files.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn file(rel: &str, size: u64) -> FileEntry {
        FileEntry {
            path: format!("/srv/media/{rel}"),
            rel_path: rel.to_string(),
            size,
        }
    }

    #[test]
    fn everything_fits_in_one_batch() {
        let batches = first_fit(
            vec![file("a", 3 * MIB), file("b", 4 * MIB), file("c", 2 * MIB)],
            1024 * MIB,
        );
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files.len(), 3);
    }

    #[test]
    fn batches_respect_limit_or_are_singletons() {
        let files: Vec<FileEntry> = (0..25).map(|i| file(&format!("f{i}"), 100 * MIB)).collect();
        let batches = first_fit(files, 1024 * MIB);

        for batch in &batches {
            assert!(batch.total_size() <= 1024 * MIB || batch.files.len() == 1);
        }
        // 10 × 100 MiB per batch, 25 files → 3 batches.
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn oversized_file_forms_singleton_and_preserves_order() {
        // a=800 MiB, b=2 GiB, c=100 MiB with a 1 GiB limit: b must stand
        // alone and a+c must NOT be merged across it.
        let batches = first_fit(
            vec![
                file("a", 800 * MIB),
                file("b", 2048 * MIB),
                file("c", 100 * MIB),
            ],
            1024 * MIB,
        );

        let names: Vec<Vec<&str>> = batches
            .iter()
            .map(|b| b.files.iter().map(|f| f.rel_path.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn total_exactly_at_limit_is_one_batch() {
        let batches = first_fit(vec![file("a", 512 * MIB), file("b", 512 * MIB)], 1024 * MIB);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].total_size(), 1024 * MIB);
    }

    #[test]
    fn no_file_lost_or_duplicated() {
        let files: Vec<FileEntry> = (0..100)
            .map(|i| file(&format!("f{i}"), (i % 7 + 1) * 10 * MIB))
            .collect();
        let expected: Vec<String> = files.iter().map(|f| f.rel_path.clone()).collect();

        let batches = first_fit(files, 64 * MIB);
        let packed: Vec<String> = batches
            .iter()
            .flat_map(|b| b.files.iter().map(|f| f.rel_path.clone()))
            .collect();

        assert_eq!(packed, expected);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(first_fit(vec![], MIB).is_empty());
    }
}
