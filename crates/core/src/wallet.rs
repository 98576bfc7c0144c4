//! Wallet math for the insufficient-funds flow.
//!
//! All amounts are integer minor units (cents). The top-up prompt offers
//! fixed presets and a custom amount with a hard floor.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Membership and payment
// ---------------------------------------------------------------------------

/// Membership tier, sent with every preflight so the quote reflects
/// tier pricing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberTier {
    #[default]
    Member,
    Plus,
    Pro,
}

/// How a submission is paid for. Only wallet-backed submissions get a
/// balance check before any record is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    #[default]
    Wallet,
    Platform,
}

// ---------------------------------------------------------------------------
// Top-up constants
// ---------------------------------------------------------------------------

/// Preset top-up amounts offered in the prompt, in cents.
pub const TOPUP_PRESETS_CENTS: [i64; 3] = [500, 1_000, 2_500];
/// Smallest top-up the payment provider accepts, in cents.
pub const MIN_TOPUP_CENTS: i64 = 500;

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Funds needed up front for a submission of `iterations` outputs.
pub fn required_cents(unit_price_cents: i64, iterations: u32) -> i64 {
    unit_price_cents.max(0) * i64::from(iterations)
}

/// How much the balance falls short of the required amount. Never
/// negative; zero means the submission is affordable.
pub fn shortfall_cents(required: i64, balance: i64) -> i64 {
    (required - balance).max(0)
}

/// Clamp a user-chosen top-up amount to the provider's floor.
pub fn clamp_topup_amount(cents: i64) -> i64 {
    cents.max(MIN_TOPUP_CENTS)
}

/// Smallest offered amount that covers the shortfall: the first preset
/// at or above it, or the clamped shortfall itself when every preset is
/// too small.
pub fn suggested_topup_cents(shortfall: i64) -> i64 {
    TOPUP_PRESETS_CENTS
        .iter()
        .copied()
        .find(|&preset| preset >= shortfall)
        .unwrap_or_else(|| clamp_topup_amount(shortfall))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Format minor units for display, `"$4.00"` style for known currencies
/// and `"CUR 4.00"` otherwise.
pub fn format_minor_units(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    let major = abs / 100;
    let minor = abs % 100;
    match currency.to_ascii_uppercase().as_str() {
        "USD" => format!("{sign}${major}.{minor:02}"),
        "EUR" => format!("{sign}\u{20ac}{major}.{minor:02}"),
        "GBP" => format!("{sign}\u{a3}{major}.{minor:02}"),
        other => format!("{sign}{other} {major}.{minor:02}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- amounts --

    #[test]
    fn required_scales_with_iterations() {
        assert_eq!(required_cents(250, 4), 1_000);
        assert_eq!(required_cents(250, 1), 250);
    }

    #[test]
    fn shortfall_never_negative() {
        assert_eq!(shortfall_cents(1_000, 400), 600);
        assert_eq!(shortfall_cents(400, 1_000), 0);
    }

    #[test]
    fn topup_clamped_to_floor() {
        assert_eq!(clamp_topup_amount(100), MIN_TOPUP_CENTS);
        assert_eq!(clamp_topup_amount(750), 750);
    }

    #[test]
    fn suggestion_picks_first_covering_preset() {
        assert_eq!(suggested_topup_cents(300), 500);
        assert_eq!(suggested_topup_cents(600), 1_000);
        assert_eq!(suggested_topup_cents(2_500), 2_500);
    }

    #[test]
    fn suggestion_above_presets_uses_shortfall() {
        assert_eq!(suggested_topup_cents(4_200), 4_200);
    }

    // -- formatting --

    #[test]
    fn known_currencies_use_symbols() {
        assert_eq!(format_minor_units(450, "USD"), "$4.50");
        assert_eq!(format_minor_units(1_000, "eur"), "\u{20ac}10.00");
        assert_eq!(format_minor_units(99, "GBP"), "\u{a3}0.99");
    }

    #[test]
    fn unknown_currency_uses_code_prefix() {
        assert_eq!(format_minor_units(1_234, "CHF"), "CHF 12.34");
    }

    #[test]
    fn negative_amounts_carry_the_sign() {
        assert_eq!(format_minor_units(-250, "USD"), "-$2.50");
    }

    // -- wire names --

    #[test]
    fn tier_and_mode_use_wire_names() {
        assert_eq!(serde_json::to_string(&MemberTier::Plus).unwrap(), "\"Plus\"");
        assert_eq!(
            serde_json::to_string(&PaymentMode::Platform).unwrap(),
            "\"platform\""
        );
        assert_eq!(
            serde_json::from_str::<MemberTier>("\"Pro\"").unwrap(),
            MemberTier::Pro
        );
    }
}
