//! Rendering raw digests as text

use crate::error::{HashError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ALPHABET_26: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Output alphabet for digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Base {
    /// Lowercase hexadecimal
    #[default]
    Hex,
    /// RFC 4648 base32, lowercase, without padding
    Base32,
    /// Lowercase latin letters; the digest is read as a big-endian integer
    /// and written in base 26
    #[serde(alias = "alpha", alias = "26")]
    Abc,
}

impl Base {
    /// Render `digest` in this alphabet
    pub fn encode(&self, digest: &[u8]) -> String {
        match self {
            Self::Hex => hex::encode(digest),
            Self::Base32 => {
                base32::encode(base32::Alphabet::Rfc4648Lower { padding: false }, digest)
            }
            Self::Abc => encode_radix(digest, ALPHABET_26),
        }
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base32 => "base32",
            Self::Abc => "abc",
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Base {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex" | "16" => Ok(Self::Hex),
            "base32" | "32" => Ok(Self::Base32),
            "abc" | "alpha" | "26" => Ok(Self::Abc),
            _ => Err(HashError::InvalidBase(s.to_string())),
        }
    }
}

/// Write `bytes`, read as an unsigned big-endian integer, in the radix given
/// by `alphabet`, most significant digit first.
///
/// Each leading zero byte becomes one leading zero digit.
fn encode_radix(bytes: &[u8], alphabet: &[u8]) -> String {
    let radix = alphabet.len() as u32;
    let mut digits: Vec<u8> = Vec::with_capacity(bytes.len() * 2);
    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();

    // Repeated long division of the big integer by the radix
    while !number.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(number.len());
        for &byte in &number {
            let acc = (remainder << 8) | u32::from(byte);
            let q = acc / radix;
            remainder = acc % radix;
            if !(quotient.is_empty() && q == 0) {
                quotient.push(q as u8);
            }
        }
        digits.push(alphabet[remainder as usize]);
        number = quotient;
    }

    let leading_zeros = bytes.iter().take_while(|b| **b == 0).count();
    digits.extend(std::iter::repeat(alphabet[0]).take(leading_zeros));
    if digits.is_empty() {
        digits.push(alphabet[0]);
    }
    digits.reverse();

    digits.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_encoding_lowercase() {
        let encoded = Base::Hex.encode(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(encoded, "deadbeef");
    }

    #[test]
    fn test_base32_unpadded_lowercase() {
        // RFC 4648 test vector "foobar" -> MZXW6YTBOI (padded form has no '=')
        assert_eq!(Base::Base32.encode(b"foobar"), "mzxw6ytboi");
        // "f" would be "MY======" with padding
        assert_eq!(Base::Base32.encode(b"f"), "my");
    }

    #[test]
    fn test_abc_small_numbers() {
        assert_eq!(Base::Abc.encode(&[0]), "a");
        assert_eq!(Base::Abc.encode(&[1]), "b");
        assert_eq!(Base::Abc.encode(&[25]), "z");
        assert_eq!(Base::Abc.encode(&[26]), "ba");
        // 0x01_00 = 256 = 9 * 26 + 22 -> "jw"
        assert_eq!(Base::Abc.encode(&[1, 0]), "jw");
    }

    #[test]
    fn test_abc_keeps_leading_zero_bytes() {
        assert_eq!(Base::Abc.encode(&[0, 0, 1]), "aab");
    }

    #[test]
    fn test_abc_only_letters() {
        let encoded = Base::Abc.encode(&[0xff; 32]);
        assert!(encoded.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_parse_base() {
        assert_eq!("hex".parse::<Base>().unwrap(), Base::Hex);
        assert_eq!("32".parse::<Base>().unwrap(), Base::Base32);
        assert_eq!("ABC".parse::<Base>().unwrap(), Base::Abc);
        assert!(matches!("base64".parse::<Base>(), Err(HashError::InvalidBase(_))));
    }
}
