//! Allow/deny results produced by the auth validator and the rate limiter.

use std::time::Duration;

use crate::error::GatewayError;

/// A tagged allow/deny result.
///
/// Consumed once by the router and never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    /// The request may proceed.
    Allowed(T),
    /// The request is refused.
    Denied(Denial),
}

impl<T> Verdict<T> {
    /// Check if the verdict allows the request.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Convert into a `Result`, turning a denial into its gateway error.
    pub fn into_result(self) -> Result<T, GatewayError> {
        match self {
            Self::Allowed(value) => Ok(value),
            Self::Denied(denial) => Err(denial.into()),
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Missing, invalid or expired credential.
    Unauthenticated,
    /// Quota for the current window is used up.
    RateLimited,
}

impl DenyReason {
    /// Wire reason code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// A denial with its reason and optional retry hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Reason code.
    pub reason: DenyReason,
    /// Human-readable detail.
    pub message: String,
    /// Time until the client may retry.
    pub retry_after: Option<Duration>,
}

impl Denial {
    /// Denial for a missing or unknown credential.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            reason: DenyReason::Unauthenticated,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Denial for an exhausted quota.
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            reason: DenyReason::RateLimited,
            message: format!("rate limit exceeded, retry after {}s", retry_after.as_secs()),
            retry_after: Some(retry_after),
        }
    }
}

impl From<Denial> for GatewayError {
    fn from(denial: Denial) -> Self {
        match denial.reason {
            DenyReason::Unauthenticated => GatewayError::Unauthenticated(denial.message),
            DenyReason::RateLimited => GatewayError::RateLimited {
                retry_after: denial.retry_after.unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_into_error() {
        let err: GatewayError = Denial::rate_limited(Duration::from_secs(12)).into();
        assert_eq!(err.reason(), "rate_limited");
        match err {
            GatewayError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(12));
            },
            other => panic!("unexpected error: {other:?}"),
        }

        let err: GatewayError = Denial::unauthenticated("missing credential").into();
        assert_eq!(err.reason(), DenyReason::Unauthenticated.code());
    }

    #[test]
    fn test_verdict_into_result() {
        let allowed: Verdict<u8> = Verdict::Allowed(7);
        assert!(allowed.is_allowed());
        assert_eq!(allowed.into_result().unwrap(), 7);

        let denied: Verdict<u8> = Verdict::Denied(Denial::unauthenticated("nope"));
        assert!(!denied.is_allowed());
        assert!(denied.into_result().is_err());
    }
}
