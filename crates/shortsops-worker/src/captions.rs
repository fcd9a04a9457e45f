//! SRT caption generation.

/// Words shown per caption block.
pub const WORDS_PER_BLOCK: usize = 5;

/// Assumed speech length used to time captions.
pub const ESTIMATED_DURATION_SECS: f64 = 10.0;

/// Build an SRT document spreading `text` evenly over `duration_secs`.
///
/// Block `i` covers words `[5i, 5i + 5)` and spans
/// `[start/n * D, min(end/n * D, D))` for `n` words.
pub fn build_srt(text: &str, duration_secs: f64) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let total = words.len();
    if total == 0 {
        return String::new();
    }

    words
        .chunks(WORDS_PER_BLOCK)
        .enumerate()
        .map(|(index, chunk)| {
            let first = index * WORDS_PER_BLOCK;
            let start = first as f64 / total as f64 * duration_secs;
            let end = ((first + WORDS_PER_BLOCK) as f64 / total as f64 * duration_secs)
                .min(duration_secs);
            format!(
                "{}\n{} --> {}\n{}\n",
                index + 1,
                format_timestamp(start),
                format_timestamp(end),
                chunk.join(" ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `HH:MM:SS,mmm`, truncated to the millisecond.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let total_secs = seconds.floor() as u64;
    let ms = ((seconds % 1.0) * 1000.0).floor() as u64;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(3.3333), "00:00:03,333");
        assert_eq!(format_timestamp(3725.5), "01:02:05,500");
    }

    #[test]
    fn test_timestamp_truncates() {
        assert_eq!(format_timestamp(1.9999), "00:00:01,999");
        assert_eq!(format_timestamp(59.9996), "00:00:59,999");
        assert_eq!(format_timestamp(-1.0), "00:00:00,000");
    }

    #[test]
    fn test_blocks_of_five_words() {
        let text = "one two three four five six seven eight nine ten";
        let srt = build_srt(text, 10.0);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:05,000\none two three four five\n\n\
             2\n00:00:05,000 --> 00:00:10,000\nsix seven eight nine ten\n"
        );
    }

    #[test]
    fn test_last_block_is_clamped() {
        let text = "a b c d e f g";
        let srt = build_srt(text, 10.0);
        let blocks: Vec<&str> = srt.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        // second block starts at 5/7 * 10 and would end at 10/7 * 10
        assert!(blocks[1].contains("00:00:07,142 --> 00:00:10,000"));
        assert!(blocks[1].ends_with("f g\n"));
    }

    #[test]
    fn test_blocks_are_ordered_and_bounded() {
        let text = "word ".repeat(23);
        let srt = build_srt(&text, ESTIMATED_DURATION_SECS);
        let mut previous_end = 0.0;
        for block in srt.split("\n\n") {
            let timing = block.lines().nth(1).unwrap();
            let (start, end) = timing.split_once(" --> ").unwrap();
            let start = parse(start);
            let end = parse(end);
            assert!(start >= previous_end - 0.001);
            assert!(end <= ESTIMATED_DURATION_SECS);
            assert!(start < end);
            previous_end = end;
        }
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(build_srt("   ", 10.0), "");
    }

    fn parse(ts: &str) -> f64 {
        let (hms, ms) = ts.split_once(',').unwrap();
        let parts: Vec<f64> = hms.split(':').map(|p| p.parse().unwrap()).collect();
        parts[0] * 3600.0 + parts[1] * 60.0 + parts[2] + ms.parse::<f64>().unwrap() / 1000.0
    }
}
