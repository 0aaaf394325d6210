/// Segment-wise wildcard match between a concrete key and a policy pattern.
///
/// A pattern of `*` on its own matches any key. Otherwise both sides are
/// split on `/`, the segment counts must agree, and a `*` pattern segment
/// matches exactly one key segment. There is no substring or regex matching.
pub fn key_segment_match(key: &str, pattern: &str) -> bool {
    if pattern == "*" || key == pattern {
        return true;
    }

    let mut key_segments = key.split('/');
    let mut pattern_segments = pattern.split('/');
    loop {
        match (key_segments.next(), pattern_segments.next()) {
            (Some(k), Some(p)) => {
                if p != "*" && p != k {
                    return false;
                }
            }
            (None, None) => return true,
            // Segment-count mismatch: a wildcard never spans extra segments.
            _ => return false,
        }
    }
}
