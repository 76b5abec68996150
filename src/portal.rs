//! Client portal sign-in checks.
//!
//! A client proves who they are by presenting the last four digits of their
//! government id. Stored ids are sealed with [`SealCategory::GovernmentId`].

use subtle::ConstantTimeEq;
use tracing::error;
use zeroize::Zeroizing;

use crate::error::CoreError;
use crate::secret_box::{SealCategory, SecretBox};

const GOVERNMENT_ID_DIGITS: usize = 9;
const CHECK_DIGITS: usize = 4;

fn digits(value: &str) -> Zeroizing<String> {
    Zeroizing::new(value.chars().filter(char::is_ascii_digit).collect())
}

/// Whether the last four digits of `stored` equal `provided`.
///
/// Separators are ignored on both sides. A stored value that is not exactly
/// nine digits never matches.
pub fn last_four_matches(stored: &str, provided: &str) -> bool {
    let stored = digits(stored);
    let provided = digits(provided);

    if stored.len() != GOVERNMENT_ID_DIGITS || provided.len() != CHECK_DIGITS {
        return false;
    }

    let tail = &stored.as_bytes()[GOVERNMENT_ID_DIGITS - CHECK_DIGITS..];
    bool::from(tail.ct_eq(provided.as_bytes()))
}

/// Open a sealed government id of a client of `tenant_id` and compare its
/// last four digits.
///
/// A stored value that cannot be opened fails closed with
/// [`CoreError::CredentialUnavailable`].
pub fn verify_sealed_last_four(
    secret_box: &SecretBox,
    tenant_id: &str,
    sealed: &str,
    provided: &str,
) -> Result<bool, CoreError> {
    let plaintext = Zeroizing::new(
        secret_box
            .open_as(SealCategory::GovernmentId, sealed)
            .map_err(|e| {
                error!(tenant_id, error = %e, "stored government id cannot be opened");
                CoreError::CredentialUnavailable(tenant_id.to_string())
            })?,
    );
    Ok(last_four_matches(&plaintext, provided))
}
