//! Identities of the parties and contracts taking part in a sale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// An opaque, unforgeable account identity (e.g., an EVM address or a
/// Solana public key). Authentication happens upstream; here an `ID` is
/// only ever compared for equality.
///
/// Parses from `0x`-prefixed hex or from base58, and always displays
/// (and serializes) as `0x`-prefixed lowercase hex.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ID(Vec<u8>);

impl ID {
    /// Wrap raw identity bytes.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::EmptyIdentity` if `bytes` is empty.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, IdentityError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(IdentityError::EmptyIdentity);
        }
        Ok(Self(bytes))
    }

    /// Raw identity bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl FromStr for ID {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentityError::EmptyIdentity);
        }
        let bytes = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(h) => hex::decode(h)?,
            None => bs58::decode(s).into_vec()?,
        };
        Self::new(bytes)
    }
}

impl TryFrom<String> for ID {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ID> for String {
    fn from(value: ID) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID({})", self.to_hex())
    }
}
