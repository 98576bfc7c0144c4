//! Provider client errors.

use crate::types::ApiErrorBody;

/// Error codes the provider uses for an unaffordable submission.
const FUNDS_CODES: [&str; 2] = ["INSUFFICIENT_WALLET_FUNDS", "INSUFFICIENT_FUNDS"];

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a structured error body.
    #[error("API error {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Api {
        status: u16,
        code: Option<String>,
        message: Option<String>,
        /// Shortfall in cents, already net of the current balance.
        required_cents: Option<i64>,
        balance_cents: Option<i64>,
    },

    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Build an API error from a status code and decoded error body.
    pub fn from_body(status: u16, body: ApiErrorBody) -> Self {
        Self::Api {
            status,
            code: body.code,
            message: body.message,
            required_cents: body.required_cents,
            balance_cents: body.balance_cents,
        }
    }

    /// Whether this error means the wallet cannot cover the submission.
    pub fn is_insufficient_funds(&self) -> bool {
        match self {
            Self::Api { code: Some(code), .. } => {
                FUNDS_CODES.iter().any(|c| c.eq_ignore_ascii_case(code))
            }
            _ => false,
        }
    }

    /// Shortfall reported by a funds error, when present.
    pub fn funds_shortfall_cents(&self) -> Option<i64> {
        match self {
            Self::Api { required_cents, .. } if self.is_insufficient_funds() => *required_cents,
            _ => None,
        }
    }

    /// Provider-authored message suitable for showing to the user.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}
