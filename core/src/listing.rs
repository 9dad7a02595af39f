//! Per-asset listing records.

use std::collections::{BTreeMap, BTreeSet};

use deed_registry::{AssetId, ID};
use serde::{Deserialize, Serialize};

use crate::config::Role;
use crate::{EscrowError, Result};

/// Lifecycle of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Accepting deposits, inspection results and approvals.
    Active,
    /// Title delivered to the buyer, funds to the seller.
    Settled,
    /// Unwound: title back with the seller, funds refunded.
    Cancelled,
}

impl ListingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Sale state for a single title held by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub buyer: ID,
    pub purchase_price: u128,
    /// Minimum earnest deposit expected from the buyer.
    pub escrow_amount: u128,
    pub inspection_passed: bool,
    pub approvals: BTreeSet<ID>,
    /// Value held for this asset. Always equals the sum of `contributions`
    /// while the listing is active, and zero once it is terminal.
    pub held_balance: u128,
    pub contributions: BTreeMap<ID, u128>,
    pub status: ListingStatus,
}

impl Listing {
    pub fn new(buyer: ID, purchase_price: u128, escrow_amount: u128) -> Self {
        Self {
            buyer,
            purchase_price,
            escrow_amount,
            inspection_passed: false,
            approvals: BTreeSet::new(),
            held_balance: 0,
            contributions: BTreeMap::new(),
            status: ListingStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }

    pub fn is_approved_by(&self, party: &ID) -> bool {
        self.approvals.contains(party)
    }

    pub fn contribution_of(&self, party: &ID) -> u128 {
        self.contributions.get(party).copied().unwrap_or(0)
    }

    /// Record `amount` received from `from`. Nothing changes on overflow.
    pub(crate) fn credit(&mut self, from: &ID, amount: u128) -> Result<()> {
        let held = self
            .held_balance
            .checked_add(amount)
            .ok_or(EscrowError::Overflow)?;
        let contributed = self
            .contribution_of(from)
            .checked_add(amount)
            .ok_or(EscrowError::Overflow)?;
        self.held_balance = held;
        self.contributions.insert(from.clone(), contributed);
        Ok(())
    }

    /// Check the balance bookkeeping of a record loaded from outside: an
    /// active listing holds exactly what was contributed, a terminal one
    /// holds nothing.
    pub(crate) fn check_balances(&self, asset: AssetId) -> Result<()> {
        let contributed = self
            .contributions
            .values()
            .try_fold(0u128, |acc, amount| acc.checked_add(*amount))
            .ok_or_else(|| {
                EscrowError::Snapshot(format!("asset {}: contributions overflow", asset))
            })?;
        let expected = if self.is_active() { contributed } else { 0 };
        if self.held_balance != expected {
            return Err(EscrowError::Snapshot(format!(
                "asset {}: held balance {} but expected {}",
                asset, self.held_balance, expected
            )));
        }
        Ok(())
    }

    /// First party, in buyer/seller/lender order, that has not signed off.
    pub fn missing_approval(&self, seller: &ID, lender: &ID) -> Option<Role> {
        [
            (Role::Buyer, &self.buyer),
            (Role::Seller, seller),
            (Role::Lender, lender),
        ]
        .into_iter()
        .find(|(_, party)| !self.is_approved_by(party))
        .map(|(role, _)| role)
    }

    /// Sale conditions, checked in a fixed order: inspection, approvals,
    /// then funds.
    pub(crate) fn ensure_settleable(
        &self,
        asset: AssetId,
        seller: &ID,
        lender: &ID,
    ) -> Result<()> {
        if !self.inspection_passed {
            return Err(EscrowError::InspectionNotPassed(asset));
        }
        if let Some(role) = self.missing_approval(seller, lender) {
            return Err(EscrowError::ApprovalMissing(role));
        }
        if self.held_balance < self.purchase_price {
            return Err(EscrowError::InsufficientFunds {
                held: self.held_balance,
                required: self.purchase_price,
            });
        }
        Ok(())
    }

    /// Who receives what if this listing is unwound now.
    ///
    /// Every funder gets their own contribution back. With
    /// `forfeit_earnest`, up to `escrow_amount` of the buyer's share goes
    /// to `seller` instead.
    pub(crate) fn refunds(&self, seller: &ID, forfeit_earnest: bool) -> Vec<(ID, u128)> {
        let mut split = self.contributions.clone();
        if forfeit_earnest {
            let forfeited = self.contribution_of(&self.buyer).min(self.escrow_amount);
            if forfeited > 0 {
                if let Some(paid) = split.get_mut(&self.buyer) {
                    *paid -= forfeited;
                }
                // bounded by held_balance
                *split.entry(seller.clone()).or_insert(0) += forfeited;
            }
        }
        split.into_iter().filter(|(_, amount)| *amount > 0).collect()
    }
}
