//! Heartbeat phrase pool.
//!
//! A phrase is picked once on entry and reused for every tick of that
//! prompt's heartbeat loop. This crate has no `rand` dependency anywhere
//! in its stack, and pulling one in for five cosmetic strings isn't worth
//! it, so selection is deterministic: a counter seeded from the session
//! id's bytes picks the phrase.

use once_cell::sync::Lazy;

pub static HEARTBEAT_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Still working on it",
        "Thinking this through",
        "Making progress",
        "Working through the details",
        "Almost there",
    ]
});

pub fn select_phrase(session_id: &str) -> &'static str {
    let seed: usize = session_id.bytes().map(usize::from).sum();
    HEARTBEAT_PHRASES[seed % HEARTBEAT_PHRASES.len()]
}

pub fn format_tick(phrase: &str, elapsed_seconds: u64) -> String {
    format!("{phrase} ({elapsed_seconds}s)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_deterministic_per_session() {
        let a = select_phrase("session-one");
        let b = select_phrase("session-one");
        assert_eq!(a, b);
    }

    #[test]
    fn tick_format_appends_elapsed_seconds() {
        assert_eq!(format_tick("Still working on it", 24), "Still working on it (24s)");
    }
}
