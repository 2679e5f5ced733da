// truncate.rs — Middle truncation for oversized tool results.
//
// Keeps roughly 80% head and 20% tail with a marker naming the number of
// bytes removed. Cuts always land on char boundaries, so multi-byte
// content survives intact.

/// Truncate `s` to approximately `limit` bytes of kept content.
pub fn truncate_middle(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }

    let mut head_end = (limit * 4) / 5;
    let mut tail_start = s.len() - (limit - head_end);
    while head_end > 0 && !s.is_char_boundary(head_end) {
        head_end -= 1;
    }
    while tail_start < s.len() && !s.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    let removed = tail_start - head_end;
    format!(
        "{}[... truncated {} bytes ...]{}",
        &s[..head_end],
        removed,
        &s[tail_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_untouched() {
        assert_eq!(truncate_middle("hello", 100), "hello");
        assert_eq!(truncate_middle("", 10), "");
    }

    #[test]
    fn long_strings_keep_head_and_tail() {
        let input = "a".repeat(80) + "z".repeat(20).as_str();
        let out = truncate_middle(&input, 50);
        assert!(out.starts_with("aaaa"));
        assert!(out.ends_with("zzzz"));
        assert!(out.contains("[... truncated 50 bytes ...]"));
    }

    #[test]
    fn split_is_roughly_eighty_twenty() {
        let input = "h".repeat(500) + "t".repeat(500).as_str();
        let out = truncate_middle(&input, 100);
        let head = out.chars().take_while(|c| *c == 'h').count();
        let tail = out.chars().rev().take_while(|c| *c == 't').count();
        assert_eq!(head, 80);
        assert_eq!(tail, 20);
    }

    #[test]
    fn marker_counts_removed_bytes() {
        let input = "x".repeat(1000);
        let out = truncate_middle(&input, 100);
        assert!(out.contains("[... truncated 900 bytes ...]"));
    }

    #[test]
    fn multibyte_boundaries_are_respected() {
        // Each snowman is 3 bytes; naive slicing at 80% would split one.
        let input = "☃".repeat(200);
        let out = truncate_middle(&input, 100);
        // Still valid UTF-8 by construction; verify the kept pieces are
        // whole snowmen.
        assert!(out.starts_with('☃'));
        assert!(out.ends_with('☃'));
        assert!(out.contains("[... truncated"));
    }
}
