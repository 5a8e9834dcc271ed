//! Directory listing order and pagination.

use crate::shell::{DirEntry, DirPage, Page};

/// Sorts entries directories-first, then case-insensitive by name.
pub fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

/// Hides dot-entries, sorts, and cuts one page out of the result.
pub fn paginate(entries: Vec<DirEntry>, page: Page) -> DirPage {
    let mut visible: Vec<DirEntry> = entries
        .into_iter()
        .filter(|e| !e.name.starts_with('.'))
        .collect();
    sort_entries(&mut visible);

    let total = visible.len();
    let start = page.offset.min(total);
    let end = start.saturating_add(page.limit).min(total);
    let has_more = end < total;

    DirPage {
        entries: visible[start..end].to_vec(),
        total,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            path: format!("/data/{name}"),
            is_dir,
            size: 0,
        }
    }

    #[test]
    fn dirs_first_then_case_insensitive() {
        let page = paginate(
            vec![
                entry("zeta.txt", false),
                entry("Alpha", true),
                entry("beta.txt", false),
                entry("gamma", true),
            ],
            Page::default(),
        );
        let names: Vec<&str> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "gamma", "beta.txt", "zeta.txt"]);
    }

    #[test]
    fn dot_entries_hidden() {
        let page = paginate(
            vec![entry(".git", true), entry(".env", false), entry("src", true)],
            Page::default(),
        );
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].name, "src");
    }

    #[test]
    fn pagination_window() {
        let entries: Vec<DirEntry> = (0..10).map(|i| entry(&format!("f{i:02}"), false)).collect();

        let first = paginate(
            entries.clone(),
            Page {
                limit: 4,
                offset: 0,
            },
        );
        assert_eq!(first.entries.len(), 4);
        assert_eq!(first.total, 10);
        assert!(first.has_more);

        let last = paginate(
            entries,
            Page {
                limit: 4,
                offset: 8,
            },
        );
        assert_eq!(last.entries.len(), 2);
        assert!(!last.has_more);
    }

    #[test]
    fn offset_past_end_is_empty() {
        let page = paginate(
            vec![entry("a", false)],
            Page {
                limit: 10,
                offset: 99,
            },
        );
        assert!(page.entries.is_empty());
        assert_eq!(page.total, 1);
        assert!(!page.has_more);
    }
}
