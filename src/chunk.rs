//! Markdown paragraph chunker.
//!
//! Splits a markdown document into [`Paragraph`]s, each remembering the most
//! recent ATX heading above it. Paragraphs are separated by blank lines;
//! fenced code blocks stay whole even when they contain blank lines.
//!
//! # Algorithm
//!
//! 1. Walk the text line by line, accumulating non-blank lines.
//! 2. A blank line outside a code fence ends the current paragraph.
//! 3. A heading line (`#` to `######` followed by a space) ends the current
//!    paragraph and becomes the heading of what follows; it is not emitted.
//! 4. Paragraphs longer than `max_tokens × 4` characters are hard-split at
//!    the nearest newline or space boundary.
//! 5. Paragraphs shorter than [`MIN_PARAGRAPH_CHARS`] are dropped.

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Paragraphs shorter than this (after trimming) carry no useful text.
pub const MIN_PARAGRAPH_CHARS: usize = 3;

/// One paragraph of a markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub heading: Option<String>,
    pub text: String,
}

/// Split markdown `text` into paragraphs, in document order.
pub fn chunk_markdown(text: &str, max_tokens: usize) -> Vec<Paragraph> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut out = Vec::new();
    let mut heading: Option<String> = None;
    let mut buf: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            buf.push(line);
            continue;
        }
        if in_fence {
            buf.push(line);
            continue;
        }

        if let Some(title) = parse_heading(trimmed) {
            flush(&mut buf, &heading, max_chars, &mut out);
            heading = Some(title.to_string());
            continue;
        }

        if trimmed.is_empty() {
            flush(&mut buf, &heading, max_chars, &mut out);
        } else {
            buf.push(line);
        }
    }
    flush(&mut buf, &heading, max_chars, &mut out);

    out
}

/// Returns the heading title if `line` is an ATX heading.
fn parse_heading(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    (!title.is_empty()).then_some(title)
}

fn flush(buf: &mut Vec<&str>, heading: &Option<String>, max_chars: usize, out: &mut Vec<Paragraph>) {
    if buf.is_empty() {
        return;
    }
    let joined = buf.join("\n");
    buf.clear();
    for piece in split_oversized(joined.trim(), max_chars) {
        if piece.chars().count() >= MIN_PARAGRAPH_CHARS {
            out.push(Paragraph {
                heading: heading.clone(),
                text: piece.to_string(),
            });
        }
    }
}

/// Hard-split `text` into pieces of at most `max_chars` bytes, preferring
/// newline or space boundaries.
fn split_oversized(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while remaining.len() > max_chars {
        let limit = snap_to_char_boundary(remaining, max_chars);
        let split_at = remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .map(|pos| pos + 1)
            .filter(|&pos| pos > 0 && pos < remaining.len())
            .unwrap_or(limit);
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = remaining[split_at..].trim_start();
    }
    if !remaining.is_empty() {
        pieces.push(remaining);
    }
    pieces
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let paras = chunk_markdown("First paragraph.\n\nSecond paragraph.\nstill second.", 700);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].text, "First paragraph.");
        assert_eq!(paras[1].text, "Second paragraph.\nstill second.");
        assert!(paras.iter().all(|p| p.heading.is_none()));
    }

    #[test]
    fn test_headings_tag_following_paragraphs() {
        let text = "# Title\n\nIntro text.\n\n## Setup ##\nInstall the tool.\n\nConfigure it.";
        let paras = chunk_markdown(text, 700);
        assert_eq!(paras.len(), 3);
        assert_eq!(paras[0].heading.as_deref(), Some("Title"));
        assert_eq!(paras[1].heading.as_deref(), Some("Setup"));
        assert_eq!(paras[1].text, "Install the tool.");
        assert_eq!(paras[2].heading.as_deref(), Some("Setup"));
    }

    #[test]
    fn test_hashtag_without_space_is_not_heading() {
        let paras = chunk_markdown("#hashtag text", 700);
        assert_eq!(paras.len(), 1);
        assert!(paras[0].heading.is_none());
    }

    #[test]
    fn test_code_fence_kept_whole() {
        let text = "Before.\n\n```\nline one\n\nline two\n```\n\nAfter.";
        let paras = chunk_markdown(text, 700);
        assert_eq!(paras.len(), 3);
        assert!(paras[1].text.contains("line one\n\nline two"));
    }

    #[test]
    fn test_tiny_paragraphs_dropped() {
        let paras = chunk_markdown("ok\n\nA real paragraph.", 700);
        assert_eq!(paras.len(), 1);
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let text = (0..60).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        let paras = chunk_markdown(&text, 10);
        assert!(paras.len() > 1);
        for p in &paras {
            assert!(p.text.len() <= 40);
        }
    }

    #[test]
    fn test_multibyte_utf8_split() {
        let text = "┌──────────────────┐ │ Hello world │ └──────────────────┘";
        let paras = chunk_markdown(text, 2);
        assert!(!paras.is_empty());
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_markdown("", 700).is_empty());
    }
}
