//! Password generation.
//!
//! Three modes, checked in order: a named host policy, the RACF generator
//! for that schema, and random base62 of the configured length. The legacy
//! formatter path (`prefix{{PASSWORD}}suffix`) survives for root rotation
//! and pre-policy configurations.

pub mod racf;

use rand::Rng;
use rand::distr::Alphanumeric;

use dirvault_directory::Schema;

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::host::SystemView;

/// Default generated password length.
pub const DEFAULT_PASSWORD_LENGTH: usize = 64;

/// Fixed prefix injected by the legacy path to satisfy directory complexity
/// rules (an upper, a lower, a digit and symbols).
pub const PASSWORD_COMPLEXITY_PREFIX: &str = "?@09AZ";

/// Replacement token for the legacy formatter.
pub const PASSWORD_FIELD_TEMPLATE: &str = "{{PASSWORD}}";

/// Minimum number of random characters any generated password must carry.
pub const MINIMUM_PASSWORD_LENGTH: usize = 8;

/// Random base62 string of exactly `length` characters.
pub fn random_base62(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generate a password for the current configuration.
///
/// A configured policy delegates to the host; the RACF schema uses its
/// character-class generator; everything else gets random base62.
pub async fn generate_password(
    config: &EngineConfig,
    system: &dyn SystemView,
) -> Result<String> {
    if let Some(policy) = &config.password_policy {
        return system.generate_password_from_policy(policy).await;
    }

    let length = if config.length == 0 {
        DEFAULT_PASSWORD_LENGTH
    } else {
        config.length
    };

    if config.directory.schema == Schema::Racf {
        return racf::racf_custom_password(length);
    }
    Ok(random_base62(length))
}

/// Validate the legacy length/formatter pair.
pub fn validate_password_settings(formatter: &str, total_length: usize) -> Result<()> {
    if formatter.is_empty() {
        let minimum = PASSWORD_COMPLEXITY_PREFIX.len() + MINIMUM_PASSWORD_LENGTH;
        if total_length < minimum {
            return Err(EngineError::validation(format!(
                "password length {total_length} is less than the minimum required ({minimum})"
            )));
        }
        return Ok(());
    }

    let slot = password_slot_length(formatter, total_length);
    if slot < MINIMUM_PASSWORD_LENGTH as isize {
        return Err(EngineError::validation(format!(
            "password length {slot} is smaller than desired length {MINIMUM_PASSWORD_LENGTH}"
        )));
    }

    match formatter.matches(PASSWORD_FIELD_TEMPLATE).count() {
        0 => Err(EngineError::validation(format!(
            "{formatter} must contain password replacement field of {PASSWORD_FIELD_TEMPLATE}"
        ))),
        1 => Ok(()),
        _ => Err(EngineError::validation(format!(
            "{formatter} must contain one password replacement field of {PASSWORD_FIELD_TEMPLATE}"
        ))),
    }
}

/// Legacy generation: random material through the formatter, or the
/// complexity prefix plus filler truncated to the total length.
pub fn generate_formatted_password(formatter: &str, total_length: usize) -> Result<String> {
    validate_password_settings(formatter, total_length)?;

    if formatter.is_empty() {
        let filler = random_base62(total_length);
        let password = format!("{PASSWORD_COMPLEXITY_PREFIX}{filler}");
        return Ok(password[..total_length].to_string());
    }

    let slot = password_slot_length(formatter, total_length) as usize;
    Ok(formatter.replacen(PASSWORD_FIELD_TEMPLATE, &random_base62(slot), 1))
}

/// Characters left for random material once the formatter's fixed text is
/// subtracted from the total length.
fn password_slot_length(formatter: &str, total_length: usize) -> isize {
    let fixed = formatter.len() as isize - PASSWORD_FIELD_TEMPLATE.len() as isize;
    total_length as isize - fixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_base62_alphabet_and_length() {
        let password = random_base62(64);
        assert_eq!(password.len(), 64);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        // Vanishingly unlikely to collide.
        assert_ne!(random_base62(64), random_base62(64));
    }

    #[test]
    fn test_validate_without_formatter() {
        assert!(validate_password_settings("", 14).is_ok());
        let err = validate_password_settings("", 13).unwrap_err();
        assert!(err.to_string().contains("minimum required"));
    }

    #[test]
    fn test_validate_with_formatter() {
        assert!(validate_password_settings("pre{{PASSWORD}}", 20).is_ok());

        // No token.
        assert!(validate_password_settings("just-text", 20).is_err());

        // Two tokens.
        assert!(validate_password_settings("{{PASSWORD}}{{PASSWORD}}", 40).is_err());

        // Fixed text leaves fewer than 8 password characters.
        let err = validate_password_settings("0123456789abcd{{PASSWORD}}", 20).unwrap_err();
        assert!(err.to_string().contains("smaller than desired length"));
    }

    #[test]
    fn test_formatted_password_without_formatter() {
        let password = generate_formatted_password("", 20).unwrap();
        assert_eq!(password.len(), 20);
        assert!(password.starts_with(PASSWORD_COMPLEXITY_PREFIX));
    }

    #[test]
    fn test_formatted_password_with_formatter() {
        let password = generate_formatted_password("pre-{{PASSWORD}}-post", 30).unwrap();
        assert_eq!(password.len(), 30);
        assert!(password.starts_with("pre-"));
        assert!(password.ends_with("-post"));
    }
}
