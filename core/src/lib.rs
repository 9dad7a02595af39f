//! Multi-party escrow for tokenized real-estate titles.
//!
//! A seller lists a title held by the [`deed_registry`]; the buyer deposits
//! earnest value, an inspector records the inspection result, and buyer,
//! seller and lender each approve. Once the listing is fully funded the
//! seller finalizes, and the coordinator delivers the title to the buyer and
//! the held value to the seller in one step.

/// Coordinator configuration and party roles
pub mod config;
/// Escrow coordinator operations
pub mod escrow;
/// Event log entries
pub mod event;
/// Persisted state and JSON helpers
pub mod interface;
/// Per-asset listing records
pub mod listing;
/// Thread-safe shared handle
pub mod shared;

pub mod error;

pub use config::{CancellationPolicy, EscrowConfig, ListingRules, Role};
pub use deed_registry::{AssetId, AssetRegistry, Registry, RegistryError, SharedRegistry, ID};
pub use error::EscrowError;
pub use escrow::Escrow;
pub use event::EscrowEvent;
pub use interface::Snapshot;
pub use listing::{Listing, ListingStatus};
pub use shared::SharedEscrow;

pub type Result<T> = std::result::Result<T, EscrowError>;
