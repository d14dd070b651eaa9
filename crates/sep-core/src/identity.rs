//! Device identity derivation (LFDI / SFDI)
//!
//! The LFDI is the leftmost 160 bits (40 hex characters) of a certificate's
//! SHA-256 fingerprint. The SFDI is the decimal value of the first 36 bits
//! (9 hex characters) of the LFDI followed by one mod-10 check digit.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of hex characters in an LFDI
pub const LFDI_LEN: usize = 40;

/// Number of LFDI hex characters folded into the SFDI
const SFDI_HEX_PREFIX: usize = 9;

/// Short-form device identifier
pub type Sfdi = u64;

/// Errors from identity derivation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("LFDI must be {LFDI_LEN} hex characters, got {0}")]
    Length(usize),

    #[error("LFDI contains non-hex character '{0}'")]
    NotHex(char),

    #[error("fingerprint too short: {0} hex characters after removing separators")]
    ShortFingerprint(usize),
}

/// Result type for identity derivation
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Left-truncated fingerprint device identifier
///
/// Always exactly 40 hex characters, stored in upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Lfdi(String);

impl Lfdi {
    /// Validate a 40 character hex string. Lower case digits are accepted
    /// and upper-cased.
    pub fn new(value: impl Into<String>) -> IdentityResult<Self> {
        let mut value = value.into();
        validate(&value)?;
        value.make_ascii_uppercase();
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short-form identifier of this LFDI
    pub fn sfdi(&self) -> Sfdi {
        // Validated on construction, so the prefix is always hex
        sfdi_digits(&self.0[..SFDI_HEX_PREFIX])
    }
}

impl fmt::Display for Lfdi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Lfdi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Lfdi {
    type Error = IdentityError;

    fn try_from(value: String) -> IdentityResult<Self> {
        Lfdi::new(value)
    }
}

impl From<Lfdi> for String {
    fn from(lfdi: Lfdi) -> Self {
        lfdi.0
    }
}

fn validate(value: &str) -> IdentityResult<()> {
    let len = value.chars().count();
    if len != LFDI_LEN {
        return Err(IdentityError::Length(len));
    }
    match value.chars().find(|c| !c.is_ascii_hexdigit()) {
        Some(bad) => Err(IdentityError::NotHex(bad)),
        None => Ok(()),
    }
}

/// Derive an LFDI from a certificate fingerprint.
///
/// Colon separators are stripped and the first 40 characters kept.
///
/// ```
/// # use sep_core::identity::lfdi_from_fingerprint;
/// let fp = "3E:4F:45:AB:31:ED:FE:5B:67:E3:43:E5:E4:56:2E:31:98:4E:23:E5:11:22";
/// let lfdi = lfdi_from_fingerprint(fp).unwrap();
/// assert_eq!(lfdi.as_str(), "3E4F45AB31EDFE5B67E343E5E4562E31984E23E5");
/// ```
pub fn lfdi_from_fingerprint(fingerprint: &str) -> IdentityResult<Lfdi> {
    let stripped: String = fingerprint.chars().filter(|&c| c != ':').collect();
    let len = stripped.chars().count();
    if len < LFDI_LEN {
        return Err(IdentityError::ShortFingerprint(len));
    }
    Lfdi::new(stripped.chars().take(LFDI_LEN).collect::<String>())
}

/// Derive the SFDI from an LFDI string.
///
/// Fails unless the input is exactly 40 hex characters.
///
/// ```
/// # use sep_core::identity::sfdi_from_lfdi;
/// assert_eq!(
///     sfdi_from_lfdi("3E4F45AB31EDFE5B67E343E5E4562E31984E23E5").unwrap(),
///     167261211391
/// );
/// ```
pub fn sfdi_from_lfdi(lfdi: &str) -> IdentityResult<Sfdi> {
    validate(lfdi)?;
    Ok(sfdi_digits(&lfdi[..SFDI_HEX_PREFIX]))
}

fn sfdi_digits(prefix: &str) -> Sfdi {
    // 9 hex digits fit in 36 bits, so neither step can overflow a u64
    let value = prefix
        .chars()
        .filter_map(|c| c.to_digit(16))
        .fold(0u64, |acc, d| acc * 16 + u64::from(d));
    let digit_sum: u64 = value
        .to_string()
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(u64::from)
        .sum();
    let check = (10 - digit_sum % 10) % 10;
    value * 10 + check
}

#[cfg(test)]
mod tests {
    use super::*;

    const LFDI: &str = "3E4F45AB31EDFE5B67E343E5E4562E31984E23E5";

    fn digit_sum(n: u64) -> u64 {
        n.to_string().chars().filter_map(|c| c.to_digit(10)).map(u64::from).sum()
    }

    /// Deterministic pseudo-random 40 char hex strings
    fn lfdis(count: usize) -> Vec<String> {
        let mut state: u64 = 0x2030_5;
        (0..count)
            .map(|_| {
                (0..LFDI_LEN)
                    .map(|_| {
                        state = state
                            .wrapping_mul(6364136223846793005)
                            .wrapping_add(1442695040888963407);
                        let nibble = (state >> 60) as u32;
                        std::char::from_digit(nibble, 16).unwrap_or('0')
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_known_sfdi() {
        assert_eq!(sfdi_from_lfdi(LFDI).unwrap(), 167261211391);
        assert_eq!(Lfdi::new(LFDI).unwrap().sfdi(), 167261211391);
    }

    #[test]
    fn test_sfdi_case_insensitive() {
        assert_eq!(
            sfdi_from_lfdi(&LFDI.to_lowercase()).unwrap(),
            sfdi_from_lfdi(LFDI).unwrap()
        );
    }

    #[test]
    fn test_check_digit_zero_when_sum_is_multiple_of_ten() {
        // 0x000000019 = 25 -> digit sum 7 -> check 3
        let lfdi = format!("000000019{}", "0".repeat(31));
        assert_eq!(sfdi_from_lfdi(&lfdi).unwrap(), 253);
        // 0x000000037 = 55 -> digit sum 10 -> check 0
        let lfdi = format!("000000037{}", "0".repeat(31));
        assert_eq!(sfdi_from_lfdi(&lfdi).unwrap(), 550);
        // all zeros -> 0 then check 0
        assert_eq!(sfdi_from_lfdi(&"0".repeat(40)).unwrap(), 0);
    }

    #[test]
    fn test_checksum_law() {
        for lfdi in lfdis(500) {
            let sfdi = sfdi_from_lfdi(&lfdi).unwrap();
            assert_eq!(digit_sum(sfdi) % 10, 0, "lfdi {} sfdi {}", lfdi, sfdi);
            // leading digits are the decimal value of the first 9 hex chars
            let prefix = u64::from_str_radix(&lfdi[..9], 16).unwrap();
            assert_eq!(sfdi / 10, prefix);
        }
    }

    #[test]
    fn test_sfdi_rejects_bad_lfdi() {
        assert_eq!(sfdi_from_lfdi(&LFDI[..39]), Err(IdentityError::Length(39)));
        assert_eq!(
            sfdi_from_lfdi(&format!("{}0", LFDI)),
            Err(IdentityError::Length(41))
        );
        let bad = format!("G{}", &LFDI[1..]);
        assert_eq!(sfdi_from_lfdi(&bad), Err(IdentityError::NotHex('G')));
    }

    #[test]
    fn test_lfdi_from_fingerprint_strips_separators() {
        let fp: String = LFDI
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":");
        assert_eq!(lfdi_from_fingerprint(&fp).unwrap().as_str(), LFDI);

        let sha256 = format!("{}{}", LFDI, "AB".repeat(12));
        assert_eq!(lfdi_from_fingerprint(&sha256).unwrap().as_str(), LFDI);
    }

    #[test]
    fn test_lowercase_fingerprint_gives_uppercase_lfdi() {
        let fp = "3e:4f:45:ab:31:ed:fe:5b:67:e3:43:e5:e4:56:2e:31:98:4e:23:e5";
        let lfdi = lfdi_from_fingerprint(fp).unwrap();
        assert_eq!(lfdi.as_str(), LFDI);
        assert_eq!(lfdi, Lfdi::new(LFDI).unwrap());
        assert_eq!(lfdi.sfdi(), 167261211391);
    }

    #[test]
    fn test_lfdi_from_short_fingerprint_fails() {
        assert_eq!(
            lfdi_from_fingerprint("AB:CD"),
            Err(IdentityError::ShortFingerprint(4))
        );
    }

    #[test]
    fn test_lfdi_serde_validates() {
        let lfdi: Lfdi = serde_json::from_str(&format!("\"{}\"", LFDI)).unwrap();
        assert_eq!(lfdi.as_str(), LFDI);
        assert!(serde_json::from_str::<Lfdi>("\"abc\"").is_err());
    }
}
