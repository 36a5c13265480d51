//! Keytab files for the built-in mechanism.
//!
//! A keytab lists service principals and their long-term keys as TOML:
//!
//! ```toml
//! [[entries]]
//! principal = "TestService@server.example"
//! key = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
//! ```
//!
//! Keys are hex-encoded and must be at least [`MIN_KEY_SIZE`] bytes.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::name::Name;

/// Minimum long-term key size (256 bits)
pub const MIN_KEY_SIZE: usize = 32;

/// Errors from loading or parsing a keytab
#[derive(Debug, Error)]
pub enum KeytabError {
    /// The keytab file could not be read
    #[error("cannot read keytab {path}: {source}")]
    Read {
        /// Keytab location
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The keytab is not valid TOML or misses fields
    #[error("cannot parse keytab: {0}")]
    Parse(#[from] toml::de::Error),

    /// An entry carries unusable key material
    #[error("invalid key for {principal}: {reason}")]
    InvalidKey {
        /// Principal of the offending entry
        principal: String,
        /// What is wrong with the key
        reason: String,
    },
}

/// Key material (secret bytes), zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    /// Create new key material from bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random key of [`MIN_KEY_SIZE`] bytes
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut bytes = vec![0u8; MIN_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    /// Create key material from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, &'static str> {
        hex_decode(hex).map(Self::new)
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;

        self.bytes.iter().fold(String::with_capacity(self.bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the key length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial([REDACTED, {} bytes])", self.bytes.len())
    }
}

/// One principal and its long-term key
#[derive(Debug, Clone)]
pub struct KeytabEntry {
    /// `primary@qualifier` principal
    pub principal: String,
    /// Long-term key
    pub key: KeyMaterial,
}

#[derive(Serialize, Deserialize)]
struct RawKeytab {
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Serialize, Deserialize)]
struct RawEntry {
    principal: String,
    key: String,
}

/// Parsed keytab
#[derive(Debug, Clone, Default)]
pub struct Keytab {
    entries: Vec<KeytabEntry>,
}

impl Keytab {
    /// Create an empty keytab
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry
    #[must_use]
    pub fn with_entry(mut self, principal: impl Into<String>, key: KeyMaterial) -> Self {
        self.entries.push(KeytabEntry {
            principal: principal.into(),
            key,
        });
        self
    }

    /// Load and validate a keytab file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeytabError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| KeytabError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate keytab TOML
    pub fn parse(content: &str) -> Result<Self, KeytabError> {
        let raw: RawKeytab = toml::from_str(content)?;
        let mut entries = Vec::with_capacity(raw.entries.len());

        for entry in raw.entries {
            let mut hex = entry.key;
            let key = KeyMaterial::from_hex(hex.trim()).map_err(|reason| KeytabError::InvalidKey {
                principal: entry.principal.clone(),
                reason: reason.to_string(),
            });
            hex.zeroize();
            let key = key?;
            if key.len() < MIN_KEY_SIZE {
                return Err(KeytabError::InvalidKey {
                    principal: entry.principal,
                    reason: format!("{} bytes (minimum {MIN_KEY_SIZE})", key.len()),
                });
            }
            entries.push(KeytabEntry {
                principal: entry.principal,
                key,
            });
        }

        Ok(Self { entries })
    }

    /// Serialize to keytab TOML
    pub fn to_toml_string(&self) -> String {
        let raw = RawKeytab {
            entries: self
                .entries
                .iter()
                .map(|e| RawEntry {
                    principal: e.principal.clone(),
                    key: e.key.to_hex(),
                })
                .collect(),
        };
        toml::to_string(&raw).unwrap_or_default()
    }

    /// First entry naming `name`
    pub fn find(&self, name: &Name) -> Option<&KeytabEntry> {
        self.entries.iter().find(|e| name.matches(&e.principal))
    }

    /// All entries
    pub fn entries(&self) -> &[KeytabEntry] {
        &self.entries
    }

    /// Check if the keytab has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Simple hex decoder
fn hex_decode(hex: &str) -> Result<Vec<u8>, &'static str> {
    if hex.len() % 2 != 0 {
        return Err("Invalid hex string length");
    }

    hex.as_bytes()
        .chunks(2)
        .map(|chunk| {
            let high = hex_char_to_nibble(chunk[0])?;
            let low = hex_char_to_nibble(chunk[1])?;
            Ok((high << 4) | low)
        })
        .collect()
}

fn hex_char_to_nibble(c: u8) -> Result<u8, &'static str> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err("Invalid hex character"),
    }
}
