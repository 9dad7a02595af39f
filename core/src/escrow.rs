//! The escrow coordinator: listing, deposits, inspection, approvals, and
//! settlement or cancellation of title sales.
//!
//! Every mutating operation validates against current state, then either
//! applies all of its effects or none. Terminal state is committed before
//! the registry is called and rolled back if the registry refuses.

use std::collections::BTreeMap;

use deed_registry::{AssetId, AssetRegistry, ID};
use tracing::{info, warn};

use crate::config::EscrowConfig;
use crate::event::EscrowEvent;
use crate::interface::Snapshot;
use crate::listing::{Listing, ListingStatus};
use crate::{CancellationPolicy, EscrowError, Result, Role};

/// Escrow coordinator bound to a title registry `R`.
#[derive(Debug)]
pub struct Escrow<R> {
    config: EscrowConfig,
    registry: R,
    listings: BTreeMap<AssetId, Listing>,
    /// Value released by the coordinator, per recipient.
    payouts: BTreeMap<ID, u128>,
    events: Vec<EscrowEvent>,
}

fn ensure_caller(caller: &ID, expected: &ID) -> Result<()> {
    if caller != expected {
        return Err(EscrowError::Unauthorized(caller.clone()));
    }
    Ok(())
}

impl<R: AssetRegistry> Escrow<R> {
    /// Bind a coordinator to `registry`.
    ///
    /// # Errors
    ///
    /// Returns `EscrowError::InvalidConfig` if the configuration is invalid
    /// or names a different registry than the one supplied.
    pub fn new(config: EscrowConfig, registry: R) -> Result<Self> {
        config.validate()?;
        let address = registry.address();
        if address != config.registry_address {
            return Err(EscrowError::InvalidConfig(format!(
                "configured for registry {}, got {}",
                config.registry_address, address
            )));
        }
        Ok(Self {
            config,
            registry,
            listings: BTreeMap::new(),
            payouts: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    /// Rebuild a coordinator from a [`Snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `EscrowError::Snapshot` if any listing's held balance does not
    /// match its recorded contributions.
    pub fn restore(snapshot: Snapshot, registry: R) -> Result<Self> {
        let Snapshot {
            config,
            listings,
            payouts,
            events,
        } = snapshot;
        for (asset, listing) in &listings {
            listing.check_balances(*asset)?;
        }
        let mut escrow = Self::new(config, registry)?;
        escrow.listings = listings;
        escrow.payouts = payouts;
        escrow.events = events;
        Ok(escrow)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            config: self.config.clone(),
            listings: self.listings.clone(),
            payouts: self.payouts.clone(),
            events: self.events.clone(),
        }
    }

    /// Take custody of `asset` and open it for sale to `buyer`.
    ///
    /// The seller must have approved the coordinator on the registry
    /// beforehand.
    pub fn list(
        &mut self,
        caller: &ID,
        asset: AssetId,
        buyer: ID,
        purchase_price: u128,
        escrow_amount: u128,
    ) -> Result<()> {
        self.config.ensure_role(caller, Role::Seller)?;
        if self.listings.get(&asset).is_some_and(Listing::is_active) {
            return Err(EscrowError::AlreadyListed(asset));
        }
        self.check_terms(&buyer, purchase_price, escrow_amount)?;

        let escrow = self.config.escrow_address.clone();
        self.registry
            .transfer_from(&escrow, caller, &escrow, asset)
            .inspect_err(|e| warn!(%asset, error = %e, "custody transfer refused"))?;

        self.listings.insert(
            asset,
            Listing::new(buyer.clone(), purchase_price, escrow_amount),
        );
        info!(%asset, %buyer, %purchase_price, %escrow_amount, "property listed");
        self.events.push(EscrowEvent::Listed {
            asset,
            buyer,
            purchase_price,
            escrow_amount,
        });
        Ok(())
    }

    fn check_terms(&self, buyer: &ID, purchase_price: u128, escrow_amount: u128) -> Result<()> {
        let cfg = &self.config;
        if [&cfg.seller, &cfg.inspector, &cfg.lender, &cfg.escrow_address].contains(&buyer) {
            return Err(EscrowError::InvalidListing(format!(
                "buyer {} already holds another role",
                buyer
            )));
        }
        if purchase_price == 0 {
            return Err(EscrowError::InvalidListing(
                "purchase price must be non-zero".to_string(),
            ));
        }
        if cfg.rules.cap_escrow_at_price && escrow_amount > purchase_price {
            return Err(EscrowError::InvalidListing(format!(
                "escrow amount {} exceeds purchase price {}",
                escrow_amount, purchase_price
            )));
        }
        Ok(())
    }

    /// Buyer's earnest deposit. Cumulative across calls.
    pub fn deposit_earnest(&mut self, caller: &ID, asset: AssetId, value: u128) -> Result<()> {
        let listing = self.active_listing(asset)?;
        ensure_caller(caller, &listing.buyer)?;
        if value == 0 {
            return Err(EscrowError::ZeroAmount);
        }
        if self.config.rules.min_earnest_deposit {
            let deposited = listing
                .contribution_of(caller)
                .checked_add(value)
                .ok_or(EscrowError::Overflow)?;
            if deposited < listing.escrow_amount {
                return Err(EscrowError::EarnestBelowMinimum {
                    deposited,
                    required: listing.escrow_amount,
                });
            }
        }

        let listing = self.active_listing_mut(asset)?;
        listing.credit(caller, value)?;
        info!(%asset, amount = %value, held = %listing.held_balance, "earnest deposited");
        self.events.push(EscrowEvent::EarnestDeposited {
            asset,
            from: caller.clone(),
            amount: value,
        });
        Ok(())
    }

    /// Top up the value held for `asset`. Anyone may fund a listing.
    pub fn fund(&mut self, caller: &ID, asset: AssetId, value: u128) -> Result<()> {
        if value == 0 {
            self.active_listing(asset)?;
            return Err(EscrowError::ZeroAmount);
        }
        let listing = self.active_listing_mut(asset)?;
        listing.credit(caller, value)?;
        info!(%asset, from = %caller, amount = %value, held = %listing.held_balance, "listing funded");
        self.events.push(EscrowEvent::Funded {
            asset,
            from: caller.clone(),
            amount: value,
        });
        Ok(())
    }

    /// Record the inspector's verdict. The latest call wins.
    pub fn update_inspection_status(
        &mut self,
        caller: &ID,
        asset: AssetId,
        passed: bool,
    ) -> Result<()> {
        self.active_listing(asset)?;
        self.config.ensure_role(caller, Role::Inspector)?;

        self.active_listing_mut(asset)?.inspection_passed = passed;
        info!(%asset, passed, "inspection updated");
        self.events
            .push(EscrowEvent::InspectionUpdated { asset, passed });
        Ok(())
    }

    /// Sign off on the sale as buyer, seller or lender. Approving twice is
    /// a no-op.
    pub fn approve_sale(&mut self, caller: &ID, asset: AssetId) -> Result<()> {
        let listing = self.active_listing(asset)?;
        let eligible = *caller == listing.buyer
            || *caller == self.config.seller
            || *caller == self.config.lender;
        if !eligible {
            return Err(EscrowError::Unauthorized(caller.clone()));
        }

        if self.active_listing_mut(asset)?.approvals.insert(caller.clone()) {
            info!(%asset, by = %caller, "sale approved");
            self.events.push(EscrowEvent::SaleApproved {
                asset,
                by: caller.clone(),
            });
        }
        Ok(())
    }

    /// Settle the sale: title to the buyer, the full held balance to the
    /// seller.
    pub fn finalize_sale(&mut self, caller: &ID, asset: AssetId) -> Result<()> {
        let listing = self.active_listing(asset)?;
        self.config.ensure_role(caller, Role::Seller)?;
        listing
            .ensure_settleable(asset, &self.config.seller, &self.config.lender)
            .inspect_err(|e| warn!(%asset, reason = %e, "finalize rejected"))?;

        let amount = listing.held_balance;
        let buyer = listing.buyer.clone();
        let seller = self.config.seller.clone();
        let proceeds = self
            .payout_of(&seller)
            .checked_add(amount)
            .ok_or(EscrowError::Overflow)?;

        let before = self.commit_terminal(asset, ListingStatus::Settled)?;
        let escrow = self.config.escrow_address.clone();
        if let Err(e) = self.registry.transfer_from(&escrow, &escrow, &buyer, asset) {
            warn!(%asset, error = %e, "title delivery refused, settlement rolled back");
            self.listings.insert(asset, before);
            return Err(e.into());
        }
        self.payouts.insert(seller.clone(), proceeds);

        info!(%asset, %buyer, %seller, amount = %amount, "sale settled");
        self.events.push(EscrowEvent::Settled {
            asset,
            buyer,
            seller,
            amount,
        });
        Ok(())
    }

    /// Unwind an active listing: title back to the seller, held value back
    /// to whoever put it in (see [`CancellationPolicy`]).
    pub fn cancel_sale(&mut self, caller: &ID, asset: AssetId) -> Result<()> {
        let listing = self.active_listing(asset)?;
        let by_buyer = *caller == listing.buyer;
        if !by_buyer && *caller != self.config.seller {
            return Err(EscrowError::Unauthorized(caller.clone()));
        }

        let forfeit = by_buyer
            && listing.inspection_passed
            && self.config.cancellation == CancellationPolicy::ForfeitEarnest;
        let refunds = listing.refunds(&self.config.seller, forfeit);

        let mut credited: BTreeMap<ID, u128> = BTreeMap::new();
        for (party, amount) in &refunds {
            let current = credited
                .get(party)
                .copied()
                .unwrap_or_else(|| self.payout_of(party));
            let total = current.checked_add(*amount).ok_or(EscrowError::Overflow)?;
            credited.insert(party.clone(), total);
        }

        let before = self.commit_terminal(asset, ListingStatus::Cancelled)?;
        let escrow = self.config.escrow_address.clone();
        let seller = self.config.seller.clone();
        if let Err(e) = self.registry.transfer_from(&escrow, &escrow, &seller, asset) {
            warn!(%asset, error = %e, "title return refused, cancellation rolled back");
            self.listings.insert(asset, before);
            return Err(e.into());
        }
        self.payouts.extend(credited);

        info!(%asset, by = %caller, refunds = refunds.len(), "sale cancelled");
        self.events.push(EscrowEvent::Cancelled {
            asset,
            by: caller.clone(),
            refunds,
        });
        Ok(())
    }

    // Marks the listing terminal and zeroes its balance, returning the
    // prior record so the caller can roll back.
    fn commit_terminal(&mut self, asset: AssetId, status: ListingStatus) -> Result<Listing> {
        let listing = self.active_listing_mut(asset)?;
        let before = listing.clone();
        listing.status = status;
        listing.held_balance = 0;
        Ok(before)
    }

    fn active_listing(&self, asset: AssetId) -> Result<&Listing> {
        match self.listings.get(&asset) {
            Some(l) if l.is_active() => Ok(l),
            Some(l) if l.status == ListingStatus::Settled => {
                Err(EscrowError::AlreadySettled(asset))
            }
            _ => Err(EscrowError::NotListed(asset)),
        }
    }

    fn active_listing_mut(&mut self, asset: AssetId) -> Result<&mut Listing> {
        match self.listings.get_mut(&asset) {
            Some(l) if l.is_active() => Ok(l),
            Some(l) if l.status == ListingStatus::Settled => {
                Err(EscrowError::AlreadySettled(asset))
            }
            _ => Err(EscrowError::NotListed(asset)),
        }
    }
}

// Read-only accessors
impl<R> Escrow<R> {
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Identity of the title registry.
    pub fn nft_address(&self) -> &ID {
        &self.config.registry_address
    }

    pub fn seller(&self) -> &ID {
        &self.config.seller
    }

    pub fn inspector(&self) -> &ID {
        &self.config.inspector
    }

    pub fn lender(&self) -> &ID {
        &self.config.lender
    }

    /// The record for `asset`, active or terminal.
    pub fn listing(&self, asset: AssetId) -> Option<&Listing> {
        self.listings.get(&asset)
    }

    pub fn is_listed(&self, asset: AssetId) -> bool {
        self.listing(asset).is_some_and(Listing::is_active)
    }

    pub fn buyer(&self, asset: AssetId) -> Option<&ID> {
        self.listing(asset).map(|l| &l.buyer)
    }

    pub fn purchase_price(&self, asset: AssetId) -> Option<u128> {
        self.listing(asset).map(|l| l.purchase_price)
    }

    pub fn escrow_amount(&self, asset: AssetId) -> Option<u128> {
        self.listing(asset).map(|l| l.escrow_amount)
    }

    pub fn inspection_passed(&self, asset: AssetId) -> bool {
        self.listing(asset).is_some_and(|l| l.inspection_passed)
    }

    pub fn approval(&self, asset: AssetId, party: &ID) -> bool {
        self.listing(asset).is_some_and(|l| l.is_approved_by(party))
    }

    /// Value held for `asset`.
    pub fn held_balance(&self, asset: AssetId) -> u128 {
        self.listing(asset).map_or(0, |l| l.held_balance)
    }

    /// Total value currently held in escrow across all listings. Each
    /// listing's balance is overflow-checked on its own, so the sum saturates
    /// at `u128::MAX`.
    pub fn get_balance(&self) -> u128 {
        self.listings
            .values()
            .fold(0u128, |acc, l| acc.saturating_add(l.held_balance))
    }

    /// Total value the coordinator has released to `party`.
    pub fn payout_of(&self, party: &ID) -> u128 {
        self.payouts.get(party).copied().unwrap_or(0)
    }

    pub fn events(&self) -> &[EscrowEvent] {
        &self.events
    }
}
