use serde::{Deserialize, Serialize};

/// What to do when the embedding provider fails during example selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Fail the question with a selection failure record.
    #[default]
    Block,
    /// Fall back to fixed pool order and keep going.
    Allow,
}

impl ErrorPolicy {
    pub fn apply_to_error(&self, error: &dyn std::fmt::Display) -> ErrorPolicyResult {
        match self {
            ErrorPolicy::Block => ErrorPolicyResult::Blocked {
                reason: format!("example selection failed (fail-closed): {}", error),
            },
            ErrorPolicy::Allow => ErrorPolicyResult::Allowed {
                warning: format!("example selection failed (fail-open): {}", error),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorPolicyResult {
    Blocked { reason: String },
    Allowed { warning: String },
}

impl ErrorPolicyResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ErrorPolicyResult::Blocked { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ErrorPolicyResult::Blocked { reason } => reason,
            ErrorPolicyResult::Allowed { warning } => warning,
        }
    }
}

/// Structured audit event for a fail-open fallback.
pub fn log_fail_safe(reason: &str, question_id: &str) {
    tracing::warn!(
        event = "nl2sql.failsafe.triggered",
        reason = %reason,
        question_id = %question_id,
        action = "fallback_first_n",
        "Fail-safe triggered: {}", reason
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_block() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Block);
    }

    #[test]
    fn results_carry_messages() {
        let err = anyhow::anyhow!("embedder down");
        let blocked = ErrorPolicy::Block.apply_to_error(&err);
        assert!(blocked.is_blocked());
        assert!(blocked.message().contains("fail-closed"));
        let allowed = ErrorPolicy::Allow.apply_to_error(&err);
        assert!(!allowed.is_blocked());
        assert!(allowed.message().contains("embedder down"));
    }

    #[test]
    fn parses_from_yaml() {
        let p: ErrorPolicy = serde_yaml::from_str("allow").unwrap();
        assert_eq!(p, ErrorPolicy::Allow);
    }
}
