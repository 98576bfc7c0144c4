//! Top-up prompt state.

use reelgen_core::wallet::{clamp_topup_amount, suggested_topup_cents};

/// An open insufficient-funds prompt.
///
/// While one exists, new submissions are refused so the user resolves
/// the balance before queueing more work.
#[derive(Debug, Clone, PartialEq)]
pub struct TopUpPrompt {
    pub message: String,
    /// How far the balance fell short, in cents.
    pub shortfall_cents: i64,
    /// Currently selected top-up amount, always at or above the floor.
    pub amount_cents: i64,
}

impl TopUpPrompt {
    /// Open a prompt for a shortfall, preselecting the smallest offered
    /// amount that covers it.
    pub fn for_shortfall(shortfall_cents: i64, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            shortfall_cents,
            amount_cents: suggested_topup_cents(shortfall_cents),
        }
    }

    /// Change the selected amount, clamped to the provider floor.
    pub fn select_amount(&mut self, cents: i64) {
        self.amount_cents = clamp_topup_amount(cents);
    }
}
