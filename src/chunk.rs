//! Token-budgeted text chunker.
//!
//! Splits normalized text into embedding-sized chunks on line boundaries,
//! targeting `chunk_size_tokens` per chunk (approximated at 4 chars per
//! token). A chunk is never flushed below `min_chunk_chars` unless it is
//! the only content, and anything shorter than `min_embed_chars` after
//! trimming is discarded rather than embedded. Chunk count is capped at
//! `max_chunks`; excess tail content is dropped with a warning.

use tracing::warn;

use crate::config::ChunkingConfig;

/// Approximate chars-per-token ratio used for the size target.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into ordered chunk texts according to `cfg`.
pub fn chunk_text(text: &str, cfg: &ChunkingConfig) -> Vec<String> {
    let max_chars = cfg.chunk_size_tokens * CHARS_PER_TOKEN;
    let sep = if cfg.keep_separators { "\n" } else { " " };

    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();

    for segment in text.split('\n') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        // A single segment larger than the budget gets hard-split at
        // whitespace boundaries, together with whatever was buffered.
        if segment.len() > max_chars {
            if !buf.is_empty() {
                buf.push_str(sep);
            }
            buf.push_str(segment);
            hard_split(&mut chunks, &mut buf, max_chars);
            continue;
        }

        let would_be = if buf.is_empty() {
            segment.len()
        } else {
            buf.len() + sep.len() + segment.len()
        };

        if would_be > max_chars && buf.len() >= cfg.min_chunk_chars {
            chunks.push(std::mem::take(&mut buf));
        }

        if !buf.is_empty() {
            buf.push_str(sep);
        }
        buf.push_str(segment);
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }

    // Trim and drop anything too short to embed.
    let mut chunks: Vec<String> = chunks
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| c.len() >= cfg.min_embed_chars)
        .collect();

    if chunks.len() > cfg.max_chunks {
        warn!(
            produced = chunks.len(),
            max = cfg.max_chunks,
            "chunk count exceeds maximum; dropping tail content"
        );
        chunks.truncate(cfg.max_chunks);
    }

    chunks
}

/// Repeatedly carve `max_chars`-sized pieces off the front of `buf`,
/// preferring whitespace boundaries, leaving the remainder buffered.
/// Split points are clamped to char boundaries so multibyte text never
/// lands mid-character.
fn hard_split(chunks: &mut Vec<String>, buf: &mut String, max_chars: usize) {
    while buf.len() > max_chars {
        let mut limit = max_chars;
        while !buf.is_char_boundary(limit) {
            limit -= 1;
        }

        let window = &buf[..limit];
        let mut split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(limit);

        // Budget smaller than the first character: take that character
        // whole rather than looping forever.
        if split_at == 0 {
            split_at = buf
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or_else(|| buf.len());
        }

        let piece = buf[..split_at].trim().to_string();
        if !piece.is_empty() {
            chunks.push(piece);
        }
        *buf = buf[split_at..].to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(tokens: usize, min_chunk: usize, min_embed: usize, max: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size_tokens: tokens,
            min_chunk_chars: min_chunk,
            min_embed_chars: min_embed,
            max_chunks: max,
            keep_separators: true,
        }
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_text(
            "Primary outcome: incidence of dose-limiting toxicity within 28 days.",
            &cfg(800, 200, 50, 10_000),
        );
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("Primary outcome"));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk_text("", &cfg(800, 200, 50, 10_000)).is_empty());
        assert!(chunk_text("\n\n", &cfg(800, 200, 50, 10_000)).is_empty());
    }

    #[test]
    fn respects_token_target() {
        // 25 tokens => 100-char budget; each line below is ~40 chars.
        let line = "The enrolled cohort completed follow-up.";
        let text = vec![line; 10].join("\n");
        let chunks = chunk_text(&text, &cfg(25, 40, 10, 10_000));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 120, "chunk too large: {}", chunk.len());
        }
    }

    #[test]
    fn never_flushes_below_min_chunk_chars() {
        let line = "A short line of trial data.";
        let text = vec![line; 20].join("\n");
        // Budget (60 chars) is below the minimum (100), so accumulation
        // must continue past the target instead of flushing small chunks.
        let chunks = chunk_text(&text, &cfg(15, 100, 10, 10_000));
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.len() >= 100, "flushed undersized chunk: {}", chunk.len());
        }
    }

    #[test]
    fn discards_chunks_below_min_embed() {
        let text = format!("{}\nok", "x".repeat(400));
        // The trailing "ok" ends up alone and is below min_embed_chars.
        let chunks = chunk_text(&text, &cfg(100, 10, 50, 10_000));
        assert!(chunks.iter().all(|c| c.len() >= 50));
    }

    #[test]
    fn caps_chunk_count_dropping_tail() {
        let line = "Site enrollment status updated for this reporting period.";
        let text = vec![line; 50].join("\n");
        let chunks = chunk_text(&text, &cfg(15, 10, 10, 3));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn keeps_separators_when_configured() {
        let text = "First line of the record.\nSecond line of the record.";
        let chunks = chunk_text(text, &cfg(800, 10, 10, 10_000));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains('\n'));

        let mut flat = cfg(800, 10, 10, 10_000);
        flat.keep_separators = false;
        let chunks = chunk_text(text, &flat);
        assert!(!chunks[0].contains('\n'));
    }

    #[test]
    fn hard_split_lands_on_char_boundaries() {
        // 200 three-byte chars, no whitespace; a 100-byte budget falls
        // mid-character unless the split point is clamped.
        let text = "\u{20ac}".repeat(200);
        let chunks = chunk_text(&text, &cfg(25, 10, 1, 10_000));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
        assert_eq!(chunks.concat(), text, "no characters lost or torn");
    }

    #[test]
    fn hard_split_handles_mixed_width_prose() {
        let sentence = "Dose was \u{2265}5 \u{b5}g/kg in the \u{3b1}\u{3b2} cohort across sites.";
        let text = sentence.repeat(30).split_whitespace().collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, &cfg(25, 10, 1, 10_000));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
    }

    #[test]
    fn hard_splits_oversized_single_line() {
        let words = vec!["word"; 200].join(" ");
        let chunks = chunk_text(&words, &cfg(25, 10, 10, 10_000));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
    }
}
