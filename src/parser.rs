//! Turns recognized text into per-line numbers and the line-pair total.

use crate::models::{ExtractionOutcome, LineResult};

/// Split `text` into non-blank lines and keep every token that reads as a number.
///
/// Garbled tokens are dropped silently; this never fails.
pub fn parse_lines(text: &str) -> Vec<LineResult> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| LineResult {
            line_number: idx + 1,
            numbers: line.split_whitespace().filter_map(leading_number).collect(),
        })
        .collect()
}

/// Sum of `a * b` over every line holding exactly two numbers.
pub fn compute_total(lines: &[LineResult]) -> f64 {
    lines.iter().fold(0.0, |total, line| match line.numbers.as_slice() {
        [a, b] => total + a * b,
        _ => total,
    })
}

pub fn extract_outcome(text: &str) -> ExtractionOutcome {
    let lines = parse_lines(text);
    for line in &lines {
        tracing::debug!(line = line.line_number, numbers = ?line.numbers, "Numbers detected");
    }
    let total = compute_total(&lines);
    ExtractionOutcome { total, lines }
}

/// Value of the longest prefix of `token` that forms a decimal number.
///
/// OCR limited to digits and `.` often glues fragments together, so `1.2.3`
/// reads as `1.2` and `12abc` as `12`. Values that overflow are discarded.
fn leading_number(token: &str) -> Option<f64> {
    let bytes = token.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = count_digits(&bytes[exp_end..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    token[..end]
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(line_number: usize, numbers: &[f64]) -> LineResult {
        LineResult {
            line_number,
            numbers: numbers.to_vec(),
        }
    }

    #[test]
    fn test_mixed_lines_only_pairs_count() {
        let outcome = extract_outcome("3 4\n5\n2 2 2\n7.5 2");

        assert_eq!(
            outcome.lines,
            vec![
                line(1, &[3.0, 4.0]),
                line(2, &[5.0]),
                line(3, &[2.0, 2.0, 2.0]),
                line(4, &[7.5, 2.0]),
            ]
        );
        assert_eq!(outcome.total, 27.0);
    }

    #[test]
    fn test_empty_text() {
        let outcome = extract_outcome("");
        assert!(outcome.lines.is_empty());
        assert_eq!(outcome.total, 0.0);

        let outcome = extract_outcome("\n   \n\t\n");
        assert!(outcome.lines.is_empty());
        assert_eq!(outcome.total, 0.0);
    }

    #[test]
    fn test_blank_lines_do_not_consume_numbers() {
        let lines = parse_lines("\n\n  10 2  \n\n\n4 4\n");
        assert_eq!(lines, vec![line(1, &[10.0, 2.0]), line(2, &[4.0, 4.0])]);
        assert_eq!(compute_total(&lines), 36.0);
    }

    #[test]
    fn test_non_numeric_line_kept_with_no_numbers() {
        let outcome = extract_outcome("abc def\n2 3");
        assert_eq!(outcome.lines, vec![line(1, &[]), line(2, &[2.0, 3.0])]);
        assert_eq!(outcome.total, 6.0);
    }

    #[test]
    fn test_pair_order_is_preserved() {
        let lines = parse_lines("0.5 8");
        assert_eq!(lines[0].numbers, vec![0.5, 8.0]);
        assert_eq!(compute_total(&lines), 4.0);
    }

    #[test]
    fn test_garbled_tokens() {
        let lines = parse_lines("1.2.3 x7 .5 5. 12abc . ..");
        assert_eq!(lines[0].numbers, vec![1.2, 0.5, 5.0, 12.0]);
    }

    #[test]
    fn test_crlf_and_tabs() {
        let lines = parse_lines("2\t3\r\n\r\n4  5\r\n");
        assert_eq!(lines, vec![line(1, &[2.0, 3.0]), line(2, &[4.0, 5.0])]);
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("42"), Some(42.0));
        assert_eq!(leading_number("-1.5"), Some(-1.5));
        assert_eq!(leading_number("+.25"), Some(0.25));
        assert_eq!(leading_number("3e2"), Some(300.0));
        assert_eq!(leading_number("3e"), Some(3.0));
        assert_eq!(leading_number("3e+"), Some(3.0));
        assert_eq!(leading_number("NaN"), None);
        assert_eq!(leading_number("inf"), None);
        assert_eq!(leading_number("-"), None);
        assert_eq!(leading_number(""), None);
        assert_eq!(leading_number("1e999"), None);
    }

    #[test]
    fn test_idempotent() {
        let text = "1 2\nfoo\n3.5 2 1\n9 9";
        assert_eq!(extract_outcome(text), extract_outcome(text));
    }
}
