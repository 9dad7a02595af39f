//! Coordinator configuration, fixed at construction.

use std::fmt;

use deed_registry::ID;
use serde::{Deserialize, Serialize};

use crate::{EscrowError, Result};

/// The parts a party can play in a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Seller,
    Buyer,
    Inspector,
    Lender,
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        match self {
            Role::Seller => "seller",
            Role::Buyer => "buyer",
            Role::Inspector => "inspector",
            Role::Lender => "lender",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Checks applied to listing terms and earnest deposits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingRules {
    /// Reject listings whose `escrow_amount` exceeds the purchase price.
    pub cap_escrow_at_price: bool,
    /// Reject earnest deposits that leave the buyer's cumulative
    /// deposit below the listing's `escrow_amount`.
    pub min_earnest_deposit: bool,
}

impl Default for ListingRules {
    fn default() -> Self {
        Self {
            cap_escrow_at_price: true,
            min_earnest_deposit: false,
        }
    }
}

/// How held value is split when a listing is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Every funder gets back exactly what they put in.
    #[default]
    RefundAll,
    /// As `RefundAll`, except that a buyer walking away after a passed
    /// inspection forfeits up to `escrow_amount` of their deposit to the
    /// seller.
    ForfeitEarnest,
}

/// Immutable coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// The coordinator's own identity on the title registry.
    pub escrow_address: ID,
    /// Identity of the title registry the coordinator is bound to.
    pub registry_address: ID,
    pub seller: ID,
    pub inspector: ID,
    pub lender: ID,
    #[serde(default)]
    pub rules: ListingRules,
    #[serde(default)]
    pub cancellation: CancellationPolicy,
}

impl EscrowConfig {
    pub fn new(
        escrow_address: ID,
        registry_address: ID,
        seller: ID,
        inspector: ID,
        lender: ID,
    ) -> Self {
        Self {
            escrow_address,
            registry_address,
            seller,
            inspector,
            lender,
            rules: ListingRules::default(),
            cancellation: CancellationPolicy::default(),
        }
    }

    pub fn with_rules(mut self, rules: ListingRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_cancellation(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation = policy;
        self
    }

    /// Every configured identity must be distinct; otherwise one party
    /// could satisfy two independent conditions.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("escrow", &self.escrow_address),
            ("registry", &self.registry_address),
            ("seller", &self.seller),
            ("inspector", &self.inspector),
            ("lender", &self.lender),
        ];
        for (i, (a, x)) in named.iter().enumerate() {
            for (b, y) in &named[i + 1..] {
                if x == y {
                    return Err(EscrowError::InvalidConfig(format!(
                        "{} and {} share identity {}",
                        a, b, x
                    )));
                }
            }
        }
        Ok(())
    }

    /// The configured identity holding a fixed role. Buyers are chosen per
    /// listing and have none.
    pub fn identity_of(&self, role: Role) -> Option<&ID> {
        match role {
            Role::Seller => Some(&self.seller),
            Role::Inspector => Some(&self.inspector),
            Role::Lender => Some(&self.lender),
            Role::Buyer => None,
        }
    }

    /// Reject `caller` unless it holds the fixed `role`.
    pub fn ensure_role(&self, caller: &ID, role: Role) -> Result<()> {
        match self.identity_of(role) {
            Some(holder) if holder == caller => Ok(()),
            _ => Err(EscrowError::Unauthorized(caller.clone())),
        }
    }
}
