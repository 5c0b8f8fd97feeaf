//! Stateful streaming tokenizer.
//!
//! A plain, single-threaded state object, not a coroutine, so its
//! behaviour is testable at arbitrary chunk boundaries. Every emitted
//! block is a `ContentBlock::Text`: fenced code and image references are
//! rendered strings, not separate wire types.

use serde_json::json;

use super::block::{Annotations, ContentBlock};

/// Tokenizer state. One instance per in-flight streamed prompt: strictly
/// one stream in flight per prompt.
#[derive(Debug, Default)]
pub struct StreamTokenizer {
    in_code_block: bool,
    language: String,
    buffer: String,
}

impl StreamTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of text, returning zero or more completed blocks.
    pub fn push(&mut self, chunk: &str) -> Vec<ContentBlock> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();

        loop {
            if self.in_code_block {
                match find_fence_close(&self.buffer) {
                    Some((close_start, remainder_start)) => {
                        let body_end = if close_start > 0 && self.buffer.as_bytes()[close_start - 1] == b'\n'
                        {
                            close_start - 1
                        } else {
                            close_start
                        };
                        let body = self.buffer[..body_end].to_string();
                        let rendered = format!("```{}\n{body}\n```", self.language);
                        out.push(ContentBlock::text(rendered));
                        self.buffer = self.buffer[remainder_start..].to_string();
                        self.in_code_block = false;
                        self.language.clear();
                    }
                    None => break,
                }
            } else if let Some(open) = find_triple_backtick(&self.buffer) {
                let before = self.buffer[..open].trim().to_string();
                if !before.is_empty() {
                    out.push(ContentBlock::text(before));
                }
                let after = &self.buffer[open + 3..];
                let lang_len = after
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '+'))
                    .unwrap_or(after.len());
                let lang = after[..lang_len].to_string();
                let rest = &after[lang_len..];
                if let Some(nl) = rest.find('\n') {
                    let remainder = rest[nl + 1..].to_string();
                    self.language = lang;
                    self.in_code_block = true;
                    self.buffer = remainder;
                } else {
                    // Fence opening not fully resolved yet (language token
                    // still streaming in); hold everything from the fence on.
                    self.buffer = self.buffer[open..].to_string();
                    break;
                }
            } else {
                let partial = trailing_partial_backticks(&self.buffer);
                if partial > 0 {
                    let hold_from = self.buffer.len() - partial;
                    if let Some(last_nl) = self.buffer[..hold_from].rfind('\n') {
                        let emit = self.buffer[..=last_nl].to_string();
                        out.push(ContentBlock::text(emit));
                        self.buffer = self.buffer[last_nl + 1..].to_string();
                        continue;
                    }
                    break;
                }

                if let Some((start, end)) = find_image_reference(&self.buffer) {
                    let before = self.buffer[..start].to_string();
                    if !before.is_empty() {
                        out.push(ContentBlock::text(before));
                    }
                    let reference = self.buffer[start..end].to_string();
                    out.push(ContentBlock::text_with_annotations(
                        reference,
                        Annotations::default().with_meta(json!({"isImageReference": true})),
                    ));
                    self.buffer = self.buffer[end..].to_string();
                    continue;
                }

                if let Some(last_nl) = self.buffer.rfind('\n') {
                    let emit = self.buffer[..=last_nl].to_string();
                    out.push(ContentBlock::text(emit));
                    self.buffer = self.buffer[last_nl + 1..].to_string();
                } else if self.buffer.len() > 100 {
                    out.push(ContentBlock::text(self.buffer.clone()));
                    self.buffer.clear();
                } else {
                    break;
                }
            }
        }

        out
    }

    /// Flush the residual buffer at end-of-stream.
    pub fn finish(mut self) -> Vec<ContentBlock> {
        let trimmed = self.buffer.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if self.in_code_block {
            vec![ContentBlock::text(format!(
                "```{}\n{}\n```",
                self.language, trimmed
            ))]
        } else {
            vec![ContentBlock::text(trimmed.to_string())]
        }
    }
}

fn find_triple_backtick(s: &str) -> Option<usize> {
    s.find("```")
}

/// 1 or 2 trailing backticks that could still grow into a full fence.
fn trailing_partial_backticks(s: &str) -> usize {
    let count = s.chars().rev().take_while(|&c| c == '`').count();
    if count == 1 || count == 2 {
        count
    } else {
        0
    }
}

/// Find a closing fence: a `` ``` `` preceded by newline-or-start and
/// followed by newline-or-end-or-whitespace. Returns the fence's start
/// index and the index the remaining buffer should resume from (skipping
/// one trailing newline, if present).
fn find_fence_close(buffer: &str) -> Option<(usize, usize)> {
    let bytes = buffer.as_bytes();
    let mut search_from = 0;
    while let Some(rel) = buffer[search_from..].find("```") {
        let idx = search_from + rel;
        let preceded_ok = idx == 0 || bytes[idx - 1] == b'\n';
        let after_idx = idx + 3;
        let followed_ok = after_idx >= bytes.len()
            || bytes[after_idx] == b'\n'
            || (buffer[after_idx..].chars().next().is_some_and(char::is_whitespace));
        if preceded_ok && followed_ok {
            let remainder_start = if after_idx < bytes.len() && bytes[after_idx] == b'\n' {
                after_idx + 1
            } else {
                after_idx
            };
            return Some((idx, remainder_start));
        }
        search_from = idx + 3;
    }
    None
}

/// Find a `[Image data: ...]` reference, returning its `[..]` span.
fn find_image_reference(buffer: &str) -> Option<(usize, usize)> {
    let start = buffer.find("[Image data: ")?;
    let end = buffer[start..].find(']').map(|i| start + i + 1)?;
    Some((start, end))
}

fn text_of(block: &ContentBlock) -> Option<&str> {
    match block {
        ContentBlock::Text(t) => Some(&t.text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_code_block_emits_as_one_block_across_chunks() {
        let mut tok = StreamTokenizer::new();
        let b1 = tok.push("Intro line\n");
        let b2 = tok.push("```go\nfmt.");
        let b3 = tok.push("Println(\"hi\")\n```\n");

        assert_eq!(b1.len(), 1);
        assert_eq!(text_of(&b1[0]).unwrap(), "Intro line\n");

        assert!(b2.is_empty());

        assert_eq!(b3.len(), 1);
        assert_eq!(
            text_of(&b3[0]).unwrap(),
            "```go\nfmt.Println(\"hi\")\n```"
        );
    }

    #[test]
    fn finalize_flushes_residual_text() {
        let mut tok = StreamTokenizer::new();
        tok.push("trailing fragment, no newline");
        let rest = tok.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(text_of(&rest[0]).unwrap(), "trailing fragment, no newline");
    }

    #[test]
    fn finalize_flushes_unterminated_code_block() {
        let mut tok = StreamTokenizer::new();
        tok.push("```rust\nfn main() {}");
        let rest = tok.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(
            text_of(&rest[0]).unwrap(),
            "```rust\nfn main() {}\n```"
        );
    }

    #[test]
    fn image_reference_is_annotated() {
        let mut tok = StreamTokenizer::new();
        let blocks = tok.push("before\n[Image data: image/png, 1.2KB base64]\nafter\n");
        assert!(blocks.iter().any(|b| {
            matches!(b, ContentBlock::Text(t) if t.annotations.as_ref()
                .and_then(|a| a.meta.as_ref())
                .map(|m| m["isImageReference"] == true)
                .unwrap_or(false))
        }));
    }

    #[test]
    fn streaming_equivalence_across_arbitrary_chunk_boundaries() {
        let whole = "Some prose first.\n\n```python\nprint('hi')\nprint('again')\n```\n\nMore prose after.\n";

        let mut whole_tok = StreamTokenizer::new();
        let mut whole_blocks = whole_tok.push(whole);
        whole_blocks.extend(whole_tok.finish());
        let whole_texts: Vec<String> = whole_blocks.iter().filter_map(|b| text_of(b).map(str::to_string)).collect();

        // Split into single-byte-ish chunks (char boundaries) to stress
        // the tokenizer at arbitrary cut points.
        let chars: Vec<char> = whole.chars().collect();
        let mut chunked_tok = StreamTokenizer::new();
        let mut chunked_blocks = Vec::new();
        for window in chars.chunks(3) {
            let s: String = window.iter().collect();
            chunked_blocks.extend(chunked_tok.push(&s));
        }
        chunked_blocks.extend(chunked_tok.finish());
        let chunked_texts: Vec<String> = chunked_blocks.iter().filter_map(|b| text_of(b).map(str::to_string)).collect();

        let whole_joined: String = whole_texts.concat();
        let chunked_joined: String = chunked_texts.concat();
        assert_eq!(whole_joined, chunked_joined);
    }
}
