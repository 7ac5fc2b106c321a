//! RACF password generation.

use rand::Rng;

use crate::core::error::{EngineError, Result};
use crate::password::random_base62;

const SYMBOLS: &[u8] = b"@#$";

/// Generate a password meeting RACF requirements: at least one upper case
/// character, one lower case character, one digit and one of `@#$`.
///
/// Generation retries until the requirements hold; in practice a handful of
/// attempts suffice, and the 100-attempt ceiling has never been observed.
pub fn racf_custom_password(length: usize) -> Result<String> {
    if length > 255 {
        return Err(EngineError::validation("max password length exceeded"));
    }
    if length < 4 {
        return Err(EngineError::validation(
            "RACF passwords need at least 4 characters",
        ));
    }

    for _ in 0..100 {
        let base = random_base62(length);

        let mut rng = rand::rng();
        let symbol = SYMBOLS[rng.random_range(0..SYMBOLS.len())] as char;
        let position = rng.random_range(0..length);

        let password: String = base
            .chars()
            .enumerate()
            .map(|(i, c)| if i == position { symbol } else { c })
            .collect();

        if meets_requirements(&password, length) {
            return Ok(password);
        }
    }
    Err(EngineError::validation(
        "unable to generate password in 100 tries",
    ))
}

fn meets_requirements(candidate: &str, length: usize) -> bool {
    candidate.len() == length
        && candidate.chars().any(|c| c.is_ascii_lowercase())
        && candidate.chars().any(|c| c.is_ascii_uppercase())
        && candidate.chars().any(|c| c.is_ascii_digit())
        && candidate.chars().any(|c| SYMBOLS.contains(&(c as u8)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meets_all_character_classes() {
        for _ in 0..50 {
            let password = racf_custom_password(8).unwrap();
            assert_eq!(password.len(), 8);
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
            assert!(password.chars().any(|c| "@#$".contains(c)));
        }
    }

    #[test]
    fn test_length_bounds() {
        assert!(racf_custom_password(256).is_err());
        assert!(racf_custom_password(2).is_err());
        assert_eq!(racf_custom_password(255).unwrap().len(), 255);
    }

    #[test]
    fn test_requirements_check() {
        assert!(meets_requirements("aB3$efgh", 8));
        assert!(!meets_requirements("ab3$efgh", 8)); // no upper
        assert!(!meets_requirements("AB3$EFGH", 8)); // no lower
        assert!(!meets_requirements("aBc$efgh", 8)); // no digit
        assert!(!meets_requirements("aB3defgh", 8)); // no symbol
        assert!(!meets_requirements("aB3$efgh", 9)); // wrong length
    }
}
