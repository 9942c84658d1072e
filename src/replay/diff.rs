//! Line-presence diff
//!
//! A deliberately lightweight diff: a line counts as removed when it exists
//! in the old text and not (by exact string match) in the new, and added in
//! the mirror case. Unchanged lines are omitted; moves, reorderings, and
//! duplicated lines are not tracked. This is the contract, not a stopgap —
//! the replay UI only needs a glanceable before/after summary.

use serde::Serialize;
use std::collections::HashSet;

/// Result of diffing two texts by line presence
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineDiff {
    /// Lines present in the old text but not the new, in old-text order
    pub removed: Vec<String>,
    /// Lines present in the new text but not the old, in new-text order
    pub added: Vec<String>,
}

impl LineDiff {
    /// Whether the two texts had identical line sets
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Compute the line-set symmetric difference between `old` and `new`
pub fn line_diff(old: &str, new: &str) -> LineDiff {
    let old_set: HashSet<&str> = old.lines().collect();
    let new_set: HashSet<&str> = new.lines().collect();

    let mut removed = Vec::new();
    let mut seen_removed = HashSet::new();
    for line in old.lines() {
        if !new_set.contains(line) && seen_removed.insert(line) {
            removed.push(line.to_string());
        }
    }

    let mut added = Vec::new();
    let mut seen_added = HashSet::new();
    for line in new.lines() {
        if !old_set.contains(line) && seen_added.insert(line) {
            added.push(line.to_string());
        }
    }

    LineDiff { removed, added }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_diff_empty() {
        let diff = line_diff("a\nb\nc", "a\nb\nc");
        assert!(diff.is_empty());
    }

    #[test]
    fn test_added_and_removed() {
        let diff = line_diff("a\nb", "a\nc");
        assert_eq!(diff.removed, vec!["b"]);
        assert_eq!(diff.added, vec!["c"]);
    }

    #[test]
    fn test_unchanged_lines_omitted() {
        let diff = line_diff("keep\nold", "keep\nnew");
        assert!(!diff.removed.contains(&"keep".to_string()));
        assert!(!diff.added.contains(&"keep".to_string()));
    }

    #[test]
    fn test_symmetry() {
        // diff(A, B) equals diff(B, A) with added/removed swapped.
        let cases = [
            ("a\nb\nc", "a\nx\ny"),
            ("", "one\ntwo"),
            ("fn main() {}\n", "fn main() { run() }\n"),
        ];
        for (a, b) in cases {
            let forward = line_diff(a, b);
            let backward = line_diff(b, a);
            assert_eq!(forward.removed, backward.added);
            assert_eq!(forward.added, backward.removed);
        }
    }

    #[test]
    fn test_reordered_lines_read_as_unchanged() {
        // Presence-only: reordering is invisible, as documented.
        let diff = line_diff("a\nb", "b\na");
        assert!(diff.is_empty());
    }
}
