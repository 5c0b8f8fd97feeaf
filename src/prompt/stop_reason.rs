//! Stop-reason classification.

use serde::Serialize;

/// What the bridge/response parser reported about how a turn ended.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub reason: Option<String>,
    pub token_limit_reached: bool,
    pub turn_limit_reached: bool,
    pub refused: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    CapabilityUnavailable,
    Authentication,
    RateLimit,
    Timeout,
    Error,
    ContentPolicy,
    CapabilityLimit,
    Refused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    Cancelled,
    MaxTokens,
    MaxTurnRequests,
    Refusal(RefusalReason),
}

impl StopReason {
    /// The wire-level tag. Refusal is *always* reported as this string
    /// after the handler downgrades it; callers that need the
    /// pre-downgrade tag use this directly on the classification result
    /// before downgrading, never after.
    pub fn wire_name(&self) -> &'static str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::Cancelled => "cancelled",
            StopReason::MaxTokens => "max_tokens",
            StopReason::MaxTurnRequests => "max_turn_requests",
            StopReason::Refusal(_) => "refusal",
        }
    }
}

/// Classify in a fixed order: cancellation, token limit, turn limit,
/// refusal/error, otherwise end_turn.
pub fn classify(cancelled: bool, meta: &ResponseMeta) -> StopReason {
    if cancelled {
        return StopReason::Cancelled;
    }
    if meta.reason.as_deref() == Some("max_tokens") || meta.token_limit_reached {
        return StopReason::MaxTokens;
    }
    if meta.reason.as_deref() == Some("max_turn_requests") || meta.turn_limit_reached {
        return StopReason::MaxTurnRequests;
    }
    if meta.error.is_some() || meta.refused || meta.reason.as_deref() == Some("error") {
        let refined = match &meta.error {
            Some(err) => classify_error_message(err),
            None => classify_refusal_without_error(meta),
        };
        return StopReason::Refusal(refined);
    }
    StopReason::EndTurn
}

fn classify_error_message(msg: &str) -> RefusalReason {
    let lower = msg.to_lowercase();
    if lower.contains("capability")
        || lower.contains("not supported")
        || lower.contains("unavailable")
        || lower.contains("not available")
        || lower.contains("not installed")
    {
        RefusalReason::CapabilityUnavailable
    } else if lower.contains("auth") || lower.contains("login") || lower.contains("unauthorized") {
        RefusalReason::Authentication
    } else if lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("429") {
        RefusalReason::RateLimit
    } else if lower.contains("timeout") || lower.contains("timed out") {
        RefusalReason::Timeout
    } else {
        RefusalReason::Error
    }
}

fn classify_refusal_without_error(meta: &ResponseMeta) -> RefusalReason {
    let reason = meta.reason.as_deref().unwrap_or("");
    if reason.contains("policy") {
        RefusalReason::ContentPolicy
    } else if reason.contains("capability") {
        RefusalReason::CapabilityLimit
    } else {
        RefusalReason::Refused
    }
}

/// Human-readable explanation emitted before downgrading a refusal to
/// `end_turn`, tailored for each of `capability_unavailable`,
/// `authentication`, and a generic fallback.
pub fn human_explanation(reason: RefusalReason) -> String {
    match reason {
        RefusalReason::CapabilityUnavailable => {
            "I can't complete this because a capability this requires isn't available here.".to_string()
        }
        RefusalReason::Authentication => {
            "I can't complete this because cursor-agent isn't authenticated. Run `cursor-agent login` and try again.".to_string()
        }
        RefusalReason::RateLimit => "I hit a rate limit while processing this. Please try again shortly.".to_string(),
        RefusalReason::Timeout => "The request timed out before it could finish.".to_string(),
        RefusalReason::ContentPolicy => "I'm not able to help with that request.".to_string(),
        RefusalReason::CapabilityLimit => "That's outside what I can do in this environment.".to_string(),
        RefusalReason::Error | RefusalReason::Refused => {
            "I ran into a problem completing this request.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_wins_over_everything() {
        let meta = ResponseMeta { token_limit_reached: true, ..Default::default() };
        assert_eq!(classify(true, &meta), StopReason::Cancelled);
    }

    #[test]
    fn max_tokens_before_refusal() {
        let meta = ResponseMeta {
            token_limit_reached: true,
            error: Some("boom".into()),
            ..Default::default()
        };
        assert_eq!(classify(false, &meta), StopReason::MaxTokens);
    }

    #[test]
    fn authentication_error_classified_from_message() {
        let meta = ResponseMeta { error: Some("401 Unauthorized: please login".into()), ..Default::default() };
        assert_eq!(classify(false, &meta), StopReason::Refusal(RefusalReason::Authentication));
    }

    #[test]
    fn refusal_without_error_uses_reason_text() {
        let meta = ResponseMeta { refused: true, reason: Some("content policy violation".into()), ..Default::default() };
        assert_eq!(classify(false, &meta), StopReason::Refusal(RefusalReason::ContentPolicy));
    }

    #[test]
    fn clean_response_is_end_turn() {
        assert_eq!(classify(false, &ResponseMeta::default()), StopReason::EndTurn);
    }

    #[test]
    fn cli_not_installed_classifies_as_capability_unavailable() {
        let meta = ResponseMeta {
            error: Some(crate::error::AgentError::CliNotInstalled.to_string()),
            ..Default::default()
        };
        assert_eq!(classify(false, &meta), StopReason::Refusal(RefusalReason::CapabilityUnavailable));
    }
}
