//! Block validation and block→prompt-string serialization.

use super::block::{Annotations, ContentBlock, EmbeddedResourceContents};
use super::format::{base64_decoded_len, format_len, format_size, is_valid_base64};

/// Per-block metadata recorded alongside the serialized prompt string.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlockMeta {
    pub index: usize,
    pub kind: &'static str,
    pub emitted_size: usize,
    pub sanitized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone)]
pub struct SerializeResult {
    pub prompt: String,
    pub metadata: Vec<BlockMeta>,
}

/// Validate every block's variant invariants, collecting *all* violations
/// in order rather than stopping at the first. Each message is
/// `Block N: <detail>`.
pub fn validate_blocks(blocks: &[ContentBlock]) -> Vec<String> {
    blocks
        .iter()
        .enumerate()
        .filter_map(|(i, b)| validate_one(i, b).err())
        .collect()
}

fn validate_one(index: usize, block: &ContentBlock) -> Result<(), String> {
    let prefix = |detail: &str| format!("Block {index}: {detail}");

    match block {
        ContentBlock::Text(t) => validate_annotations(index, t.annotations.as_ref())?,
        ContentBlock::Code(c) => validate_annotations(index, c.annotations.as_ref())?,
        ContentBlock::Image(img) => {
            if !is_valid_base64(&img.data) {
                return Err(prefix("image data must be valid base64"));
            }
            validate_annotations(index, img.annotations.as_ref())?;
        }
        ContentBlock::Audio(a) => {
            if !is_valid_base64(&a.data) {
                return Err(prefix("audio data must be valid base64"));
            }
            validate_annotations(index, a.annotations.as_ref())?;
        }
        ContentBlock::Resource(r) => {
            if let EmbeddedResourceContents::Blob(blob) = &r.resource {
                if !is_valid_base64(&blob.blob) {
                    return Err(prefix("resource blob must be valid base64"));
                }
            }
            validate_annotations(index, r.annotations.as_ref())?;
        }
        ContentBlock::ResourceLink(link) => {
            if link.uri.is_empty() {
                return Err(prefix("resource_link requires a non-empty uri"));
            }
            if link.name.is_empty() {
                return Err(prefix("resource_link requires a non-empty name"));
            }
            validate_annotations(index, link.annotations.as_ref())?;
        }
    }
    Ok(())
}

fn validate_annotations(index: usize, annotations: Option<&Annotations>) -> Result<(), String> {
    let Some(annotations) = annotations else {
        return Ok(());
    };
    if let Some(priority) = annotations.priority {
        if priority < 0.0 {
            return Err(format!("Block {index}: annotations.priority must be non-negative"));
        }
    }
    if let Some(ref last_modified) = annotations.last_modified {
        if chrono::DateTime::parse_from_rfc3339(last_modified).is_err() {
            return Err(format!(
                "Block {index}: annotations.lastModified must be ISO-8601"
            ));
        }
    }
    Ok(())
}

/// Normalize text for inclusion in a prompt: strip null bytes and collapse
/// CRLF/CR to LF.
pub fn normalize_text(text: &str) -> String {
    text.replace('\0', "").replace("\r\n", "\n").replace('\r', "\n")
}

/// Serialize content blocks into a single prompt string, failing on the
/// first validation violation encountered.
pub fn serialize_blocks(blocks: &[ContentBlock]) -> Result<SerializeResult, String> {
    let mut parts = Vec::with_capacity(blocks.len());
    let mut metadata = Vec::with_capacity(blocks.len());

    for (index, block) in blocks.iter().enumerate() {
        validate_one(index, block)?;
        let (text, sanitized) = render_block(block);
        metadata.push(BlockMeta {
            index,
            kind: block.kind(),
            emitted_size: text.len(),
            sanitized,
            annotations: block.annotations().cloned(),
        });
        parts.push(text);
    }

    Ok(SerializeResult {
        prompt: parts.join("\n\n"),
        metadata,
    })
}

fn render_block(block: &ContentBlock) -> (String, bool) {
    match block {
        ContentBlock::Text(t) => {
            let normalized = normalize_text(&t.text);
            let sanitized = normalized != t.text;
            (normalized, sanitized)
        }
        ContentBlock::Code(c) => {
            let lang = c.language.as_deref().unwrap_or("");
            let body = normalize_text(&c.content);
            let mut out = String::new();
            if let Some(name) = &c.file_name {
                out.push_str(&format!("# File: {name}\n"));
            }
            out.push_str(&format!("```{lang}\n{body}\n```"));
            (out, body != c.content)
        }
        ContentBlock::Image(img) => {
            let header = match &img.uri {
                Some(uri) => format!("# Image: {uri}"),
                None => format!("# Image ({})", img.mime_type),
            };
            let size = format_len(base64_decoded_len(&img.data));
            let out = format!(
                "{header}\n[Image data: {}, {size} base64]",
                img.mime_type
            );
            (out, false)
        }
        ContentBlock::Audio(a) => {
            let size = format_len(base64_decoded_len(&a.data));
            let subtype = a.mime_type.split('/').nth(1).unwrap_or(&a.mime_type);
            let out = format!("[Audio: {}, {size}, format: {subtype}]", a.mime_type);
            (out, false)
        }
        ContentBlock::Resource(r) => match &r.resource {
            EmbeddedResourceContents::Text(text_res) => {
                let mut out = format!("# Resource: {}\n", text_res.uri);
                if let Some(mime) = &text_res.mime_type {
                    out.push_str(&format!("# Mime: {mime}\n"));
                }
                let body = normalize_text(&text_res.text);
                let sanitized = body != text_res.text;
                out.push_str(&body);
                (out, sanitized)
            }
            EmbeddedResourceContents::Blob(blob_res) => {
                let mut out = format!("# Resource: {}\n", blob_res.uri);
                if let Some(mime) = &blob_res.mime_type {
                    out.push_str(&format!("# Mime: {mime}\n"));
                }
                out.push_str(&format!(
                    "[Binary data: {}]",
                    format_len(base64_decoded_len(&blob_res.blob))
                ));
                (out, false)
            }
        },
        ContentBlock::ResourceLink(link) => {
            let mut lines = vec![format!("# Resource Link: {}", link.name)];
            lines.push(format!("URI: {}", link.uri));
            if let Some(title) = &link.title {
                lines.push(format!("Title: {title}"));
            }
            if let Some(description) = &link.description {
                lines.push(format!("Description: {description}"));
            }
            if let Some(mime) = &link.mime_type {
                lines.push(format!("Mime: {mime}"));
            }
            if let Some(size) = &link.size {
                lines.push(format!("Size: {}", format_size(size)));
            }
            (lines.join("\n"), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::block::{AudioBlock, ByteSize, ImageBlock, ResourceLinkBlock, MAX_SAFE_INTEGER};
    use super::*;

    #[test]
    fn text_round_trip_strips_null_and_collapses_crlf() {
        let raw = "a\0b\r\nc\rd";
        let normalized = normalize_text(raw);
        assert_eq!(normalized, "ab\nc\nd");
    }

    #[test]
    fn rejects_non_base64_image_with_precise_message() {
        let block = ContentBlock::Image(ImageBlock {
            data: "not base64!!".to_string(),
            mime_type: "image/png".to_string(),
            uri: None,
            annotations: None,
        });
        let err = serialize_blocks(&[block]).unwrap_err();
        assert!(err.contains("valid base64"), "{err}");
        assert!(err.starts_with("Block 0:"));
    }

    #[test]
    fn rejects_non_base64_audio() {
        let block = ContentBlock::Audio(AudioBlock {
            data: "***".to_string(),
            mime_type: "audio/wav".to_string(),
            annotations: None,
        });
        let errs = validate_blocks(&[block]);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("valid base64"));
    }

    #[test]
    fn validate_is_total_and_order_preserving() {
        let good = ContentBlock::text("hi");
        let bad1 = ContentBlock::Image(ImageBlock {
            data: "bad".to_string(),
            mime_type: "image/png".to_string(),
            uri: None,
            annotations: None,
        });
        let bad2 = ContentBlock::ResourceLink(ResourceLinkBlock {
            uri: String::new(),
            name: "x".to_string(),
            title: None,
            description: None,
            mime_type: None,
            size: None,
            annotations: None,
        });
        let errs = validate_blocks(&[good, bad1, bad2]);
        assert_eq!(errs.len(), 2);
        assert!(errs[0].starts_with("Block 1:"));
        assert!(errs[1].starts_with("Block 2:"));
    }

    #[test]
    fn resource_link_size_exact_past_safe_integer() {
        let block = ContentBlock::ResourceLink(ResourceLinkBlock {
            uri: "file:///big".to_string(),
            name: "big.bin".to_string(),
            title: None,
            description: None,
            mime_type: None,
            size: Some(ByteSize((MAX_SAFE_INTEGER + 42).to_string())),
            annotations: None,
        });
        let result = serialize_blocks(&[block]).unwrap();
        assert!(result.prompt.contains(&format!("{} bytes", MAX_SAFE_INTEGER + 42)));
    }

    #[test]
    fn blocks_join_with_blank_line() {
        let result = serialize_blocks(&[ContentBlock::text("a"), ContentBlock::text("b")]).unwrap();
        assert_eq!(result.prompt, "a\n\nb");
        assert_eq!(result.metadata.len(), 2);
    }
}
