/// Truncates a string to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

/// Formats a byte/char count compactly: `1.2M`, `3.4k`, `912c`.
pub fn fmt_size(n: usize) -> String {
    if n == 0 {
        return "—".to_string();
    }
    if n >= 1_000_000 {
        return format!("{:.1}M", n as f64 / 1_000_000.0);
    }
    if n >= 1_000 {
        return format!("{:.1}k", n as f64 / 1_000.0);
    }
    format!("{n}c")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_is_char_boundary_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 140), "short");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[test]
    fn fmt_size_picks_unit_by_magnitude() {
        assert_eq!(fmt_size(0), "—");
        assert_eq!(fmt_size(912), "912c");
        assert_eq!(fmt_size(3_400), "3.4k");
        assert_eq!(fmt_size(1_200_000), "1.2M");
    }
}
