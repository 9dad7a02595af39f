//! Title registry: the single source of truth for who holds which
//! tokenized property title.
//!
//! The escrow coordinator only ever talks to a registry through the
//! [`AssetRegistry`] trait. [`Registry`] is an in-memory implementation
//! with ERC-721 semantics, and [`SharedRegistry`] a cloneable handle to one
//! so several parties can observe the same ownership records.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Registry error types
pub mod error;
/// Party and contract identities
pub mod identity;

pub use error::{IdentityError, RegistryError};
pub use identity::ID;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Unique identifier of a single title. Identifiers start at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for AssetId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Operations the escrow coordinator may invoke on a title registry.
///
/// Implementations must apply a transfer fully or not at all, and report
/// every refusal as an error.
pub trait AssetRegistry {
    /// Identity of the registry itself.
    fn address(&self) -> ID;

    /// Issue a new title to `caller` and return its identifier.
    fn mint(&mut self, caller: &ID, uri: &str) -> Result<AssetId>;

    /// Let `spender` transfer `asset` on the holder's behalf.
    /// Only the current holder may call this.
    fn approve(&mut self, caller: &ID, asset: AssetId, spender: &ID) -> Result<()>;

    fn get_approved(&self, asset: AssetId) -> Result<Option<ID>>;

    fn owner_of(&self, asset: AssetId) -> Result<ID>;

    fn token_uri(&self, asset: AssetId) -> Result<String>;

    /// Move `asset` from `from` to `to`. `operator` must be the holder or
    /// the approved spender, and `from` must be the holder. Clears any
    /// outstanding approval.
    fn transfer_from(&mut self, operator: &ID, from: &ID, to: &ID, asset: AssetId) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Title {
    owner: ID,
    approved: Option<ID>,
    uri: String,
}

/// In-memory title registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    address: ID,
    titles: BTreeMap<AssetId, Title>,
    last_id: u64,
}

impl Registry {
    pub fn new(address: ID) -> Self {
        Self {
            address,
            titles: BTreeMap::new(),
            last_id: 0,
        }
    }

    /// Number of titles issued so far.
    pub fn total_supply(&self) -> u64 {
        self.last_id
    }

    fn title(&self, asset: AssetId) -> Result<&Title> {
        self.titles
            .get(&asset)
            .ok_or(RegistryError::NonexistentAsset(asset))
    }
}

impl AssetRegistry for Registry {
    fn address(&self) -> ID {
        self.address.clone()
    }

    fn mint(&mut self, caller: &ID, uri: &str) -> Result<AssetId> {
        if uri.trim().is_empty() {
            return Err(RegistryError::EmptyUri);
        }
        let next = self
            .last_id
            .checked_add(1)
            .ok_or(RegistryError::IdsExhausted)?;
        let asset = AssetId(next);
        self.titles.insert(
            asset,
            Title {
                owner: caller.clone(),
                approved: None,
                uri: uri.to_string(),
            },
        );
        self.last_id = next;
        debug!(%asset, owner = %caller, "title minted");
        Ok(asset)
    }

    fn approve(&mut self, caller: &ID, asset: AssetId, spender: &ID) -> Result<()> {
        let title = self
            .titles
            .get_mut(&asset)
            .ok_or(RegistryError::NonexistentAsset(asset))?;
        if title.owner != *caller {
            return Err(RegistryError::NotOwner {
                caller: caller.clone(),
                asset,
            });
        }
        if title.owner == *spender {
            return Err(RegistryError::SelfApproval(asset));
        }
        title.approved = Some(spender.clone());
        debug!(%asset, %spender, "transfer approved");
        Ok(())
    }

    fn get_approved(&self, asset: AssetId) -> Result<Option<ID>> {
        Ok(self.title(asset)?.approved.clone())
    }

    fn owner_of(&self, asset: AssetId) -> Result<ID> {
        Ok(self.title(asset)?.owner.clone())
    }

    fn token_uri(&self, asset: AssetId) -> Result<String> {
        Ok(self.title(asset)?.uri.clone())
    }

    fn transfer_from(&mut self, operator: &ID, from: &ID, to: &ID, asset: AssetId) -> Result<()> {
        let title = self
            .titles
            .get_mut(&asset)
            .ok_or(RegistryError::NonexistentAsset(asset))?;
        if title.owner != *from {
            return Err(RegistryError::WrongHolder {
                from: from.clone(),
                asset,
            });
        }
        let authorized = title.owner == *operator || title.approved.as_ref() == Some(operator);
        if !authorized {
            return Err(RegistryError::NotApproved {
                operator: operator.clone(),
                asset,
            });
        }
        title.owner = to.clone();
        title.approved = None;
        debug!(%asset, %from, %to, "title transferred");
        Ok(())
    }
}

/// Cloneable, thread-safe handle to a [`Registry`]. Every clone observes
/// the same titles.
#[derive(Debug, Clone)]
pub struct SharedRegistry(Arc<Mutex<Registry>>);

impl SharedRegistry {
    pub fn new(address: ID) -> Self {
        Self::from(Registry::new(address))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>> {
        self.0.lock().map_err(|_| RegistryError::Unavailable)
    }

    pub fn total_supply(&self) -> Result<u64> {
        Ok(self.lock()?.total_supply())
    }
}

impl From<Registry> for SharedRegistry {
    fn from(registry: Registry) -> Self {
        Self(Arc::new(Mutex::new(registry)))
    }
}

impl AssetRegistry for SharedRegistry {
    fn address(&self) -> ID {
        // The address never changes, so a poisoned lock still holds a valid one.
        match self.0.lock() {
            Ok(r) => r.address(),
            Err(poisoned) => poisoned.into_inner().address(),
        }
    }

    fn mint(&mut self, caller: &ID, uri: &str) -> Result<AssetId> {
        self.lock()?.mint(caller, uri)
    }

    fn approve(&mut self, caller: &ID, asset: AssetId, spender: &ID) -> Result<()> {
        self.lock()?.approve(caller, asset, spender)
    }

    fn get_approved(&self, asset: AssetId) -> Result<Option<ID>> {
        self.lock()?.get_approved(asset)
    }

    fn owner_of(&self, asset: AssetId) -> Result<ID> {
        self.lock()?.owner_of(asset)
    }

    fn token_uri(&self, asset: AssetId) -> Result<String> {
        self.lock()?.token_uri(asset)
    }

    fn transfer_from(&mut self, operator: &ID, from: &ID, to: &ID, asset: AssetId) -> Result<()> {
        self.lock()?.transfer_from(operator, from, to, asset)
    }
}
