/// Turns raw prompt-service output into display-ready suggestions.
///
/// One suggestion per line. Leading list numbering (`1.`, `2)`, `3 -`) and emoji or
/// pictograph markers are removed; blank lines are dropped.
pub fn parse_suggestions(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| strip_pictographs(strip_numbering(line.trim())))
        .map(|line| collapse_whitespace(&line))
        .filter(|line| !line.is_empty())
        .collect()
}

fn strip_numbering(line: &str) -> &str {
    let rest = line.trim_start_matches(|ch: char| ch.is_ascii_digit());
    if rest.len() == line.len() {
        return line;
    }
    rest.strip_prefix(['.', ')', '-', ':'])
        .unwrap_or(rest)
        .trim_start()
}

fn strip_pictographs(line: &str) -> String {
    line.chars().filter(|ch| !is_pictograph(*ch)).collect()
}

fn is_pictograph(ch: char) -> bool {
    matches!(
        ch as u32,
        // general punctuation through misc symbols (arrows, stars, weather, ...)
        0x2011..=0x26FF
            // dingbats
            | 0x2700..=0x27BF
            // private use area
            | 0xE000..=0xF8FF
            // variation selectors and zero-width joiner that glue emoji sequences
            | 0xFE0E..=0xFE0F
            | 0x200D
            // supplementary symbols, emoticons, transport, extended pictographs
            | 0x1F000..=0x1FAFF
    )
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_numbering_and_emoji() {
        let raw = "1. 🚀 Plan a product launch\n2. Summarize my week ✨\n3) ☀️ Weekend ideas";
        assert_eq!(
            parse_suggestions(raw),
            vec![
                "Plan a product launch".to_string(),
                "Summarize my week".to_string(),
                "Weekend ideas".to_string(),
            ]
        );
    }

    #[test]
    fn drops_blank_and_emoji_only_lines() {
        let raw = "\n1. Hello\n\n2. 🎉\n   \n";
        assert_eq!(parse_suggestions(raw), vec!["Hello".to_string()]);
    }

    #[test]
    fn keeps_unnumbered_lines_and_inner_digits() {
        assert_eq!(
            parse_suggestions("Explain 3 tips for Rust"),
            vec!["Explain 3 tips for Rust".to_string()]
        );
        assert_eq!(
            parse_suggestions("10. Top 5 books"),
            vec!["Top 5 books".to_string()]
        );
    }
}
