//! Request fingerprinting
//!
//! Provides [`Fingerprint`], a strongly-typed 32-byte digest identifying
//! cache-equivalent requests. Parts are normalized and sorted before hashing
//! so that semantically identical requests collide regardless of call-site
//! formatting or argument order. Only the digest is ever stored or used as a
//! filename, so raw request material (including credentials embedded in a
//! query by a careless caller) never reaches disk.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte request fingerprint (Blake3)
///
/// Stable across process restarts. Immutable and cheap to clone (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint for a request
    ///
    /// `category` names the kind of call (e.g. `"company"`); `parts` are the
    /// request arguments. Each part is case-folded and whitespace-collapsed,
    /// then the parts are sorted so argument order does not matter.
    #[must_use]
    pub fn new(category: &str, parts: &[&str]) -> Self {
        let mut normalized: Vec<String> = parts.iter().map(|p| normalize(p)).collect();
        normalized.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(normalize(category).as_bytes());
        for part in &normalized {
            hasher.update(&[0]);
            hasher.update(part.as_bytes());
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a fingerprint from raw bytes
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if the fingerprint is all zeros (placeholder/uninitialized)
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Default for Fingerprint {
    /// All-zero placeholder fingerprint
    fn default() -> Self {
        Self([0u8; 32])
    }
}

/// Case-fold and collapse whitespace
fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error parsing a fingerprint from hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFingerprintError;

impl Display for ParseFingerprintError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid fingerprint hex")
    }
}

impl std::error::Error for ParseFingerprintError {}

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ParseFingerprintError)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| ParseFingerprintError)?;
        Ok(Self(arr))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
