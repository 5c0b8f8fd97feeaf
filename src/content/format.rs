//! Size formatting and base64 validation helpers shared by the content
//! serializer.

use super::block::{ByteSize, MAX_SAFE_INTEGER};

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format a byte count using binary (1024-ary) units to one decimal place,
/// or render it verbatim suffixed with " bytes" when it exceeds the IEEE-754
/// safe integer range.
pub fn format_size(size: &ByteSize) -> String {
    if size.exceeds_safe_integer() {
        return format!("{} bytes", size.0);
    }

    let Some(n) = size.as_u128() else {
        return format!("{} bytes", size.0);
    };

    let mut value = n as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{n}{}", UNITS[0])
    } else {
        format!("{value:.1}{}", UNITS[unit_index])
    }
}

/// Format a raw byte length (not wrapped in `ByteSize`) the same way.
pub fn format_len(n: u64) -> String {
    format_size(&ByteSize::from_u64(n))
}

/// Validate that `s` is syntactically valid standard base64 (with padding).
///
/// Mirrors the alphabet/padding rules real base64 decoders enforce, without
/// pulling in a decoding crate just to validate shape: the content
/// processor only needs a yes/no answer plus an emitted size estimate.
pub fn is_valid_base64(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let bytes = s.as_bytes();
    if bytes.len() % 4 != 0 {
        return false;
    }
    let mut seen_padding = false;
    for &b in bytes {
        if seen_padding {
            if b != b'=' {
                return false;
            }
            continue;
        }
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' => {}
            b'=' => seen_padding = true,
            _ => return false,
        }
    }
    true
}

/// Estimate the decoded byte length of a base64 string (for size reporting).
pub fn base64_decoded_len(s: &str) -> u64 {
    let padding = s.chars().rev().take_while(|&c| c == '=').count() as u64;
    let len = s.len() as u64;
    if len == 0 {
        return 0;
    }
    (len / 4) * 3 - padding.min(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_binary_units() {
        assert_eq!(format_len(0), "0B");
        assert_eq!(format_len(512), "512B");
        assert_eq!(format_len(1024), "1.0KB");
        assert_eq!(format_len(1536), "1.5KB");
        assert_eq!(format_len(1024 * 1024), "1.0MB");
        assert_eq!(format_len(1024 * 1024 * 1024 * 2), "2.0GB");
    }

    #[test]
    fn renders_exact_bytes_past_safe_integer() {
        let huge = ByteSize((MAX_SAFE_INTEGER + 5).to_string());
        assert_eq!(format_size(&huge), format!("{} bytes", huge.0));
    }

    #[test]
    fn validates_base64_shape() {
        assert!(is_valid_base64("aGVsbG8="));
        assert!(is_valid_base64("aGVsbG8h"));
        assert!(!is_valid_base64("not base64!!"));
        assert!(!is_valid_base64(""));
        assert!(!is_valid_base64("abc")); // not a multiple of 4
    }
}
