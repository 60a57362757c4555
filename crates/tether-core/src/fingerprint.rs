use sha2::{Digest, Sha256};

/// SHA-256 content fingerprint over an ordered list of parts, hex encoded.
/// Used to deduplicate replayed events and to pair tool-start with tool-end.
pub fn content_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Separator prevents ("ab","c") colliding with ("a","bc").
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = content_fingerprint(&["tool_start", "Read", "{}"]);
        let b = content_fingerprint(&["tool_start", "Read", "{}"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn part_boundaries_matter() {
        let a = content_fingerprint(&["ab", "c"]);
        let b = content_fingerprint(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn different_content_differs() {
        let a = content_fingerprint(&["tool_start", "Read"]);
        let b = content_fingerprint(&["tool_start", "Write"]);
        assert_ne!(a, b);
    }
}
