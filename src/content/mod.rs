//! Content processing: typed blocks, serialization to prompt strings, and
//! the streaming response tokenizer.

mod block;
mod format;
mod serialize;
mod tokenizer;

pub use block::{
    Annotations, Audience, AudioBlock, BlobResourceContents, ByteSize, CodeBlock, ContentBlock,
    EmbeddedResourceContents, ImageBlock, ResourceBlock, ResourceLinkBlock, TextBlock,
    TextResourceContents, MAX_SAFE_INTEGER,
};
pub use format::{base64_decoded_len, format_len, format_size, is_valid_base64};
pub use serialize::{normalize_text, serialize_blocks, validate_blocks, BlockMeta, SerializeResult};
pub use tokenizer::StreamTokenizer;
