//! Content block types.
//!
//! Content blocks are a tagged union at rest and on the wire. Validators
//! work against the typed shape here, but unknown keys on resource/
//! resource-link variants are preserved under `_meta` rather than dropped,
//! since external callers may deliver fields this crate doesn't model yet.

use serde::{Deserialize, Serialize};

/// Who a block's annotation says it is intended for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    User,
    Assistant,
}

/// Optional annotation payload carried by most content block variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Audience>>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastModified")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "_meta")]
    pub meta: Option<serde_json::Value>,
}

impl Annotations {
    pub fn for_audience(audience: &[Audience]) -> Self {
        Self {
            audience: Some(audience.to_vec()),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// An arbitrary-precision, non-negative byte count.
///
/// `resource_link.size` can legitimately exceed `i64`/`f64`'s safe integer
/// range; we keep the original decimal text around so large values render
/// exactly instead of losing precision through a float round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteSize(pub String);

/// The largest integer an IEEE-754 f64 can represent exactly.
pub const MAX_SAFE_INTEGER: u128 = 9_007_199_254_740_991;

impl ByteSize {
    pub fn from_u64(n: u64) -> Self {
        ByteSize(n.to_string())
    }

    /// Parse as an unsigned 128-bit integer, if the digits fit.
    pub fn as_u128(&self) -> Option<u128> {
        self.0.parse().ok()
    }

    pub fn exceeds_safe_integer(&self) -> bool {
        match self.as_u128() {
            Some(n) => n > MAX_SAFE_INTEGER,
            None => true,
        }
    }
}

/// Tagged union over the ACP content block variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    Audio(AudioBlock),
    Resource(ResourceBlock),
    ResourceLink(ResourceLinkBlock),
    /// Internal-only: produced by the streaming tokenizer and by explicit
    /// code blocks in a prompt; never accepted from an external caller's
    /// `session/prompt` request body.
    Code(CodeBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBlock {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBlock {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddedResourceContents {
    Text(TextResourceContents),
    Blob(BlobResourceContents),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
    pub blob: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBlock {
    pub resource: EmbeddedResourceContents,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLinkBlock {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ByteSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "fileName")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock {
            text: text.into(),
            annotations: None,
        })
    }

    pub fn text_with_annotations(text: impl Into<String>, annotations: Annotations) -> Self {
        ContentBlock::Text(TextBlock {
            text: text.into(),
            annotations: Some(annotations),
        })
    }

    pub fn code(content: impl Into<String>, language: Option<String>) -> Self {
        ContentBlock::Code(CodeBlock {
            content: content.into(),
            language,
            file_name: None,
            annotations: None,
        })
    }

    pub fn annotations(&self) -> Option<&Annotations> {
        match self {
            ContentBlock::Text(b) => b.annotations.as_ref(),
            ContentBlock::Image(b) => b.annotations.as_ref(),
            ContentBlock::Audio(b) => b.annotations.as_ref(),
            ContentBlock::Resource(b) => b.annotations.as_ref(),
            ContentBlock::ResourceLink(b) => b.annotations.as_ref(),
            ContentBlock::Code(b) => b.annotations.as_ref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::Text(_) => "text",
            ContentBlock::Image(_) => "image",
            ContentBlock::Audio(_) => "audio",
            ContentBlock::Resource(_) => "resource",
            ContentBlock::ResourceLink(_) => "resource_link",
            ContentBlock::Code(_) => "code",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_exceeds_safe_integer() {
        let small = ByteSize::from_u64(1024);
        assert!(!small.exceeds_safe_integer());

        let huge = ByteSize("99999999999999999999999999".to_string());
        assert!(huge.exceeds_safe_integer());

        let boundary = ByteSize(MAX_SAFE_INTEGER.to_string());
        assert!(!boundary.exceeds_safe_integer());

        let just_over = ByteSize((MAX_SAFE_INTEGER + 1).to_string());
        assert!(just_over.exceeds_safe_integer());
    }

    #[test]
    fn round_trips_through_json() {
        let block = ContentBlock::text("hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        let back: ContentBlock = serde_json::from_value(json).unwrap();
        assert!(matches!(back, ContentBlock::Text(t) if t.text == "hello"));
    }
}
