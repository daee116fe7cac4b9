//! Conversions between user-entered decimal amounts and raw on-chain integers.

use ethers::types::{Address, U256};
use ethers::utils::{format_units, parse_units, to_checksum};
use thiserror::Error;

/// Maximum number of fractional digits shown to users.
pub const DISPLAY_DECIMALS: usize = 6;

/// Error returned when a user-entered amount cannot be staked.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative")]
    Negative,
    #[error("amount must be greater than zero")]
    Zero,
    #[error("amount has more than {max} decimal places")]
    TooPrecise { max: u32 },
    #[error("amount is not a number: {0}")]
    Malformed(String),
}

/// Parse a decimal amount (`"1.5"`) into raw units with `decimals` places.
///
/// Zero parses successfully; see [`parse_stake_amount`] for the strictly positive variant.
pub fn parse_amount(input: &str, decimals: u32) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative);
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.')
        || trimmed.matches('.').count() > 1
    {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }
    if let Some((_, fraction)) = trimmed.split_once('.') {
        if fraction.len() > decimals as usize {
            return Err(AmountError::TooPrecise { max: decimals });
        }
    }
    let parsed = parse_units(trimmed, decimals)
        .map_err(|err| AmountError::Malformed(format!("{trimmed}: {err}")))?;
    Ok(parsed.into())
}

/// Parse an amount that must be strictly positive.
pub fn parse_stake_amount(input: &str, decimals: u32) -> Result<U256, AmountError> {
    let amount = parse_amount(input, decimals)?;
    if amount.is_zero() {
        return Err(AmountError::Zero);
    }
    Ok(amount)
}

/// Check an edit of the stake input field.
///
/// Accepts what the form accepts: digits and at most one decimal point, with no more
/// fractional digits than the currency supports. An empty field is a valid edit.
pub fn validate_input(input: &str, decimals: u32) -> Result<(), AmountError> {
    match parse_amount(input, decimals) {
        Ok(_) | Err(AmountError::Empty) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Format raw units for display: rounded to at most [`DISPLAY_DECIMALS`] fractional
/// digits, trailing zeros trimmed.
pub fn format_amount(raw: U256, decimals: u32) -> String {
    let formatted = match format_units(round_to_display(raw, decimals), decimals) {
        Ok(formatted) => formatted,
        Err(_) => return raw.to_string(),
    };
    let (whole, fraction) = match formatted.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => return formatted,
    };
    let shown = &fraction[..fraction.len().min(DISPLAY_DECIMALS)];
    let shown = shown.trim_end_matches('0');
    if shown.is_empty() {
        if whole == "0" && !raw.is_zero() {
            return format!("<0.{}1", "0".repeat(DISPLAY_DECIMALS - 1));
        }
        return whole.to_string();
    }
    format!("{whole}.{shown}")
}

/// Round half up to [`DISPLAY_DECIMALS`] fractional digits.
fn round_to_display(raw: U256, decimals: u32) -> U256 {
    let hidden = (decimals as usize).saturating_sub(DISPLAY_DECIMALS);
    if hidden == 0 || hidden > 77 {
        return raw;
    }
    let step = U256::exp10(hidden);
    match raw.checked_add(step / 2) {
        Some(bumped) => bumped / step * step,
        None => raw,
    }
}

/// Checksummed address shortened to `0x1234...abcd`.
pub fn shorten_address(address: &Address) -> String {
    let full = to_checksum(address, None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
