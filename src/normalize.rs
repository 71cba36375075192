//! Universal text normalization.
//!
//! Cleans extracted text regardless of its origin: residual markup,
//! markdown link syntax, leftover pipe-delimited table rows, footnote
//! markers, and whitespace noise. Documents that come out of cleaning
//! below a minimum length are rejected entirely (`None`) and skipped by
//! the pipeline — that is a quality decision, not an error.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static HTML_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static MARKDOWN_LINKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static TABLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|[-:]+\|").unwrap());
static FOOTNOTE_REFS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());
static PAGE_REFERENCES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)page\s+\d+").unwrap());
static TRAILING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\s*$").unwrap());
static EXCESSIVE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{3,}").unwrap());
static MULTIPLE_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static VALUE_BOILERPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((View at|Click here for)[^)]*\)").unwrap());

/// Characters counted as formatting by the quality gate.
const FORMAT_CHARS: &str = "|-_=*+~^<>[]{}()";

/// Cleans `text` through the fixed pass sequence. Returns `None` when the
/// cleaned result is shorter than `min_chars`.
pub fn normalize(text: &str, min_chars: usize) -> Option<String> {
    let cleaned = clean(text);
    if cleaned.len() < min_chars {
        debug!(
            chars = cleaned.len(),
            min_chars, "dropping document: too short after cleaning"
        );
        return None;
    }
    Some(cleaned)
}

/// The pass sequence without the minimum-length gate. Callers that need
/// the cleaned length even for rejected documents use this directly.
pub fn clean(text: &str) -> String {
    let cleaned = HTML_TAGS.replace_all(text, "");
    let cleaned = MARKDOWN_LINKS.replace_all(&cleaned, "$1");
    let cleaned = flatten_table_lines(&cleaned);
    let cleaned = FOOTNOTE_REFS.replace_all(&cleaned, "");
    let cleaned = PAGE_REFERENCES.replace_all(&cleaned, "");
    let cleaned = TRAILING_NUMBER.replace(&cleaned, "");
    let cleaned = EXCESSIVE_WHITESPACE.replace_all(&cleaned, " ");
    let cleaned = MULTIPLE_NEWLINES.replace_all(&cleaned, "\n\n");

    let cleaned: String = cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    cleaned.trim().to_string()
}

/// Converts leftover pipe-delimited table rows into plain content lines.
/// Two-cell rows become `label: value`; wider rows keep their meaningful
/// cells space-joined. Pure separator rows are dropped.
fn flatten_table_lines(content: &str) -> String {
    let mut result = String::with_capacity(content.len());

    for line in content.split('\n') {
        if TABLE_SEPARATOR.is_match(line) {
            continue;
        }

        let trimmed = line.trim();
        if trimmed.starts_with('|') && trimmed.ends_with('|') {
            let flattened = flatten_table_row(trimmed);
            if !flattened.is_empty() {
                result.push_str(&flattened);
                result.push('\n');
            }
        } else {
            result.push_str(line);
            result.push('\n');
        }
    }

    result
}

fn flatten_table_row(row: &str) -> String {
    let cells: Vec<String> = row
        .split('|')
        .map(|cell| {
            VALUE_BOILERPLATE
                .replace_all(cell.trim(), "")
                .trim()
                .to_string()
        })
        .filter(|cell| !cell.is_empty())
        .collect();

    match cells.len() {
        0 => String::new(),
        2 => format!("{}: {}", cells[0], cells[1]),
        _ => cells
            .into_iter()
            .filter(|cell| is_meaningful_cell(cell))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn is_meaningful_cell(cell: &str) -> bool {
    cell.len() > 1
        && !cell.chars().all(|c| c.is_ascii_digit())
        && !cell
            .chars()
            .all(|c| c.is_whitespace() || "-_=*".contains(c))
}

/// Independent quality gate: judges whether a unit of text carries enough
/// meaningful content to be worth embedding. Usable by any stage that
/// wants to validate a chunk.
pub fn is_quality_chunk(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.len() < 50 {
        return false;
    }

    let meaningful_words = trimmed
        .split_whitespace()
        .filter(|word| {
            word.len() > 1
                && !word.chars().all(|c| c.is_ascii_digit())
                && !word.chars().all(|c| c.is_ascii_punctuation())
        })
        .count();

    if meaningful_words < 10 {
        return false;
    }

    let format_chars = trimmed.chars().filter(|c| FORMAT_CHARS.contains(*c)).count();
    format_chars * 10 <= trimmed.len() * 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_below_minimum() {
        let short = "a".repeat(40);
        assert!(normalize(&short, 50).is_none());
    }

    #[test]
    fn keeps_meaningful_text_above_minimum() {
        let text = "The study enrolled adult participants with confirmed diagnoses.";
        assert!(text.len() >= 60);
        let out = normalize(text, 50).unwrap();
        assert!(out.contains("enrolled adult participants"));
    }

    #[test]
    fn strips_residual_markup_and_links() {
        let text =
            "<p>Primary outcome was <b>safety</b>.</p>\nSee [the registry](https://example.org) for details of the interventional study.";
        let out = normalize(text, 50).unwrap();
        assert!(!out.contains('<'));
        assert!(out.contains("the registry"));
        assert!(!out.contains("example.org"));
    }

    #[test]
    fn flattens_two_cell_table_row_and_strips_boilerplate() {
        let text = "Eligibility and identifiers for this interventional study:\n| NCTID | (View at X) NCT12345 |\nEnd of record.";
        let out = normalize(text, 50).unwrap();
        assert!(out.contains("NCTID: NCT12345"), "got: {out}");
        assert!(!out.contains("View at"));
    }

    #[test]
    fn drops_separator_rows_joins_wide_rows() {
        let text = "Study arms were compared over the full follow-up period:\n|---|---|\n| Cohort | Dose level | Response rate |";
        let out = normalize(text, 50).unwrap();
        assert!(!out.contains("---"));
        assert!(out.contains("Cohort Dose level Response rate"));
    }

    #[test]
    fn strips_footnotes_and_page_markers() {
        let text =
            "Safety results were consistent across sites [1] and no dose-limiting toxicity was seen, see page 12 for tables.";
        let out = normalize(text, 50).unwrap();
        assert!(!out.contains("[1]"));
        assert!(!out.to_lowercase().contains("page 12"));
    }

    #[test]
    fn collapses_whitespace_and_blank_lines() {
        let text = "First enrolled cohort completed dosing.\n\n\n\nSecond   cohort    is ongoing with longer follow-up.";
        let out = normalize(text, 50).unwrap();
        assert!(!out.contains("\n\n\n"));
        assert!(!out.contains("   "));
    }

    #[test]
    fn quality_gate_rejects_formatting_noise() {
        assert!(!is_quality_chunk("1 2 3 --- | | ---"));
    }

    #[test]
    fn quality_gate_accepts_real_prose() {
        let text = "Twelve ordinary words about gene editing therapy outcomes across enrolled study participants";
        assert!(text.split_whitespace().count() == 12);
        assert!(is_quality_chunk(text));
    }

    #[test]
    fn quality_gate_rejects_short_text() {
        assert!(!is_quality_chunk("too short to matter"));
    }
}
