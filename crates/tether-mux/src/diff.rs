/// Result of comparing two successive pane captures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TailDiff {
    /// Lines present in the current capture but not covered by the overlap
    /// with the previous one.
    pub new_lines: Vec<String>,
    /// Set when no overlap was found at all (pane cleared, scrolled past the
    /// capture window, or first capture): `new_lines` is then the whole
    /// current capture and downstream consumers should treat it cautiously.
    pub degraded: bool,
}

/// Extract the lines appended to a pane since the previous capture.
///
/// Finds the longest suffix of `prev` that is a prefix of `curr` and returns
/// everything in `curr` after it. Captures are bounded windows, so an
/// overlap of zero means continuity was lost rather than "nothing changed";
/// that case is flagged as degraded.
pub fn diff_tail(prev: &[String], curr: &[String]) -> TailDiff {
    if curr.is_empty() {
        return TailDiff {
            new_lines: Vec::new(),
            degraded: false,
        };
    }
    let max_overlap = prev.len().min(curr.len());
    for k in (1..=max_overlap).rev() {
        if prev[prev.len() - k..] == curr[..k] {
            return TailDiff {
                new_lines: curr[k..].to_vec(),
                degraded: false,
            };
        }
    }
    tracing::warn!(
        prev_lines = prev.len(),
        curr_lines = curr.len(),
        "no overlap between pane captures, treating full capture as new"
    );
    TailDiff {
        new_lines: curr.to_vec(),
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn appended_lines_are_extracted() {
        let prev = lines(&["a", "b", "c"]);
        let curr = lines(&["b", "c", "d", "e"]);
        let diff = diff_tail(&prev, &curr);
        assert_eq!(diff.new_lines, lines(&["d", "e"]));
        assert!(!diff.degraded);
    }

    #[test]
    fn identical_captures_yield_nothing() {
        let prev = lines(&["a", "b"]);
        let diff = diff_tail(&prev, &prev.clone());
        assert!(diff.new_lines.is_empty());
        assert!(!diff.degraded);
    }

    #[test]
    fn no_overlap_is_degraded_full_capture() {
        let prev = lines(&["a", "b"]);
        let curr = lines(&["x", "y"]);
        let diff = diff_tail(&prev, &curr);
        assert_eq!(diff.new_lines, curr);
        assert!(diff.degraded);
    }

    #[test]
    fn first_capture_with_empty_prev_is_degraded() {
        let curr = lines(&["hello"]);
        let diff = diff_tail(&[], &curr);
        assert_eq!(diff.new_lines, curr);
        assert!(diff.degraded);
    }

    #[test]
    fn empty_current_capture_is_quiet() {
        let prev = lines(&["a"]);
        let diff = diff_tail(&prev, &[]);
        assert!(diff.new_lines.is_empty());
        assert!(!diff.degraded);
    }

    #[test]
    fn longest_overlap_wins_over_shorter_ones() {
        // Suffix "b, a" of prev matches a 2-line prefix of curr; a greedy
        // 1-line match on "a" alone would wrongly report "a" as new.
        let prev = lines(&["x", "b", "a"]);
        let curr = lines(&["b", "a", "c"]);
        let diff = diff_tail(&prev, &curr);
        assert_eq!(diff.new_lines, lines(&["c"]));
        assert!(!diff.degraded);
    }

    #[test]
    fn repeated_lines_resolve_to_maximal_overlap() {
        let prev = lines(&["a", "a", "a"]);
        let curr = lines(&["a", "a", "a", "a"]);
        let diff = diff_tail(&prev, &curr);
        assert_eq!(diff.new_lines, lines(&["a"]));
    }
}
