use deed_registry::{AssetId, RegistryError, ID};
use thiserror::Error;

use crate::config::Role;

/// Escrow-related errors.
///
/// A call that returns any of these has left the coordinator (and the
/// registry) exactly as it found them.
#[derive(Debug, Error, PartialEq)]
pub enum EscrowError {
    /// Caller is not the party this operation is reserved for.
    #[error("{0} is not authorized for this operation")]
    Unauthorized(ID),

    /// No active listing for this asset.
    #[error("asset {0} is not listed")]
    NotListed(AssetId),

    #[error("asset {0} is already listed")]
    AlreadyListed(AssetId),

    /// The sale for this asset has been finalized; the listing is terminal.
    #[error("sale of asset {0} is already settled")]
    AlreadySettled(AssetId),

    #[error("inspection of asset {0} has not passed")]
    InspectionNotPassed(AssetId),

    #[error("sale has not been approved by the {0}")]
    ApprovalMissing(Role),

    #[error("insufficient funds: held {held}, required {required}")]
    InsufficientFunds { held: u128, required: u128 },

    /// The title registry refused or failed a transfer.
    #[error("registry transfer failed: {0}")]
    RegistryTransferFailed(#[from] RegistryError),

    #[error("invalid listing: {0}")]
    InvalidListing(String),

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("earnest deposit too small: deposited {deposited}, required {required}")]
    EarnestBelowMinimum { deposited: u128, required: u128 },

    #[error("balance overflow")]
    Overflow,

    /// A call arrived while another operation on the same coordinator was
    /// still running on this thread.
    #[error("reentrant call rejected")]
    Reentrant,

    #[error("escrow unavailable")]
    Unavailable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}
