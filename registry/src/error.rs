use thiserror::Error;

use crate::{AssetId, ID};

/// Errors raised by the title registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("asset {0} does not exist")]
    NonexistentAsset(AssetId),

    /// Only the current holder may approve a transfer.
    #[error("{caller} is not the holder of asset {asset}")]
    NotOwner { caller: ID, asset: AssetId },

    /// Operator is neither the holder nor the approved spender.
    #[error("{operator} is not approved to transfer asset {asset}")]
    NotApproved { operator: ID, asset: AssetId },

    /// `from` does not match the recorded holder.
    #[error("{from} does not hold asset {asset}")]
    WrongHolder { from: ID, asset: AssetId },

    #[error("holder cannot approve itself for asset {0}")]
    SelfApproval(AssetId),

    #[error("metadata URI must not be empty")]
    EmptyUri,

    #[error("asset identifier space exhausted")]
    IdsExhausted,

    /// The registry refused the call for reasons of its own.
    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("registry unavailable")]
    Unavailable,
}

/// Errors that might occur while parsing into an `ID`.
#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("cannot parse identity from empty string")]
    EmptyIdentity,
}
