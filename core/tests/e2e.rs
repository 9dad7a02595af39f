use std::str::FromStr as _;
use std::sync::{Arc, Mutex, OnceLock};

use deed_escrow_core::{
    AssetId, AssetRegistry, CancellationPolicy, Escrow, EscrowConfig, EscrowError, EscrowEvent,
    Registry, RegistryError, Result, Role, SharedEscrow, SharedRegistry, ID,
};

const URI: &str = "https://ipfs.io/ipfs/QmTudSYeM7mz3PkYEWXWqPjomRPHogcMFSq7XAvsvsgAPS";

fn assert_err<T, E>(res: Result<T>, expected: E)
where
    E: std::fmt::Debug + PartialEq<E>,
    EscrowError: Into<E> + PartialEq<E>,
{
    match res {
        Err(e) => assert_eq!(e.into(), expected),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

fn id(s: &str) -> ID {
    ID::from_str(s).unwrap()
}

struct Parties {
    buyer: ID,
    seller: ID,
    inspector: ID,
    lender: ID,
    escrow: ID,
    registry: ID,
}

impl Parties {
    fn new() -> Self {
        Self {
            buyer: id("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            seller: id("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"),
            inspector: id("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC"),
            lender: id("0x90F79bf6EB2c4f870365E785982E1f101E93b906"),
            escrow: id("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
            registry: id("0x5FbDB2315678afecb367f032d93F642f64180aa3"),
        }
    }

    fn config(&self) -> EscrowConfig {
        EscrowConfig::new(
            self.escrow.clone(),
            self.registry.clone(),
            self.seller.clone(),
            self.inspector.clone(),
            self.lender.clone(),
        )
    }
}

/// Seller mints title #1 and approves the coordinator for it.
fn deploy(config: EscrowConfig, p: &Parties) -> (Escrow<SharedRegistry>, SharedRegistry, AssetId) {
    let mut registry = SharedRegistry::new(p.registry.clone());
    let asset = registry.mint(&p.seller, URI).unwrap();
    registry.approve(&p.seller, asset, &p.escrow).unwrap();
    let escrow = Escrow::new(config, registry.clone()).unwrap();
    (escrow, registry, asset)
}

/// Listed for 10 with earnest 1; buyer deposited 5; inspection passed;
/// all three parties approved.
fn approved_sale() -> (Escrow<SharedRegistry>, SharedRegistry, Parties, AssetId) {
    let p = Parties::new();
    let (mut escrow, registry, asset) = deploy(p.config(), &p);

    escrow.list(&p.seller, asset, p.buyer.clone(), 10, 1).unwrap();
    escrow.deposit_earnest(&p.buyer, asset, 5).unwrap();
    escrow.update_inspection_status(&p.inspector, asset, true).unwrap();
    escrow.approve_sale(&p.buyer, asset).unwrap();
    escrow.approve_sale(&p.seller, asset).unwrap();
    escrow.approve_sale(&p.lender, asset).unwrap();
    (escrow, registry, p, asset)
}

#[test]
fn deployment() {
    let (escrow, registry, p, _) = approved_sale();
    assert_eq!(escrow.nft_address(), &registry.address());
    assert_eq!(escrow.seller(), &p.seller);
    assert_eq!(escrow.inspector(), &p.inspector);
    assert_eq!(escrow.lender(), &p.lender);
}

#[test]
fn listing() {
    let (escrow, registry, p, asset) = approved_sale();
    assert_eq!(registry.owner_of(asset).unwrap(), p.escrow);
    assert!(escrow.is_listed(asset));
    assert_eq!(escrow.buyer(asset), Some(&p.buyer));
    assert_eq!(escrow.purchase_price(asset), Some(10));
    assert_eq!(escrow.escrow_amount(asset), Some(1));
    assert_eq!(registry.token_uri(asset).unwrap(), URI);
}

#[test]
fn deposits_and_approvals() {
    let (mut escrow, _, p, asset) = approved_sale();
    assert_eq!(escrow.get_balance(), 5);

    for party in [&p.buyer, &p.seller, &p.lender] {
        assert!(escrow.approval(asset, party));
    }
    assert!(!escrow.approval(asset, &p.inspector));

    escrow.deposit_earnest(&p.buyer, asset, 2).unwrap();
    assert_eq!(escrow.held_balance(asset), 7);
    assert_eq!(escrow.listing(asset).unwrap().contribution_of(&p.buyer), 7);
}

#[test]
fn role_checks() {
    let (mut escrow, _, p, asset) = approved_sale();
    let stranger = id("0x15d34AAf54267DB7D7c367839AAf71A00a2C6A65");

    assert_err(
        escrow.list(&p.buyer, asset, p.buyer.clone(), 10, 1),
        EscrowError::Unauthorized(p.buyer.clone()),
    );
    assert_err(
        escrow.deposit_earnest(&p.lender, asset, 1),
        EscrowError::Unauthorized(p.lender.clone()),
    );
    assert_err(
        escrow.update_inspection_status(&p.seller, asset, false),
        EscrowError::Unauthorized(p.seller.clone()),
    );
    assert_err(
        escrow.approve_sale(&stranger, asset),
        EscrowError::Unauthorized(stranger.clone()),
    );
    assert_err(
        escrow.approve_sale(&p.inspector, asset),
        EscrowError::Unauthorized(p.inspector.clone()),
    );
    assert_err(
        escrow.finalize_sale(&p.buyer, asset),
        EscrowError::Unauthorized(p.buyer.clone()),
    );
    assert_err(
        escrow.cancel_sale(&p.lender, asset),
        EscrowError::Unauthorized(p.lender.clone()),
    );
    assert_err(
        escrow.list(&p.seller, asset, p.buyer.clone(), 10, 1),
        EscrowError::AlreadyListed(asset),
    );

    // anyone may fund
    escrow.fund(&stranger, asset, 1).unwrap();
    assert_eq!(escrow.get_balance(), 6);
}

#[test]
fn unlisted_asset_rejects_everything() {
    let p = Parties::new();
    let (mut escrow, registry, _) = deploy(p.config(), &p);
    let asset = AssetId(42);

    assert_err(
        escrow.deposit_earnest(&p.buyer, asset, 1),
        EscrowError::NotListed(asset),
    );
    assert_err(escrow.fund(&p.lender, asset, 1), EscrowError::NotListed(asset));
    assert_err(
        escrow.update_inspection_status(&p.inspector, asset, true),
        EscrowError::NotListed(asset),
    );
    assert_err(escrow.approve_sale(&p.buyer, asset), EscrowError::NotListed(asset));
    assert_err(escrow.finalize_sale(&p.seller, asset), EscrowError::NotListed(asset));
    assert_err(escrow.cancel_sale(&p.seller, asset), EscrowError::NotListed(asset));

    // listing a title the coordinator was never approved for
    let mut other = registry.clone();
    let unapproved = other.mint(&p.seller, "ipfs://unapproved").unwrap();
    assert_err(
        escrow.list(&p.seller, unapproved, p.buyer.clone(), 10, 1),
        EscrowError::RegistryTransferFailed(RegistryError::NotApproved {
            operator: p.escrow.clone(),
            asset: unapproved,
        }),
    );
    assert!(!escrow.is_listed(unapproved));
    assert_eq!(registry.owner_of(unapproved).unwrap(), p.seller);
    assert!(escrow.events().is_empty());
}

#[test]
fn inspection_is_latest_write() {
    let (mut escrow, _, p, asset) = approved_sale();
    escrow.fund(&p.lender, asset, 5).unwrap();

    escrow.update_inspection_status(&p.inspector, asset, false).unwrap();
    assert!(!escrow.inspection_passed(asset));
    let before = escrow.snapshot();
    assert_err(
        escrow.finalize_sale(&p.seller, asset),
        EscrowError::InspectionNotPassed(asset),
    );
    assert_eq!(escrow.snapshot(), before);

    escrow.update_inspection_status(&p.inspector, asset, true).unwrap();
    escrow.finalize_sale(&p.seller, asset).unwrap();
}

#[test]
fn failed_finalize_changes_nothing() {
    let p = Parties::new();
    let (mut escrow, registry, asset) = deploy(p.config(), &p);
    escrow.list(&p.seller, asset, p.buyer.clone(), 10, 1).unwrap();
    escrow.deposit_earnest(&p.buyer, asset, 5).unwrap();
    escrow.update_inspection_status(&p.inspector, asset, true).unwrap();
    escrow.approve_sale(&p.buyer, asset).unwrap();
    escrow.approve_sale(&p.seller, asset).unwrap();

    let before = escrow.snapshot();
    assert_err(
        escrow.finalize_sale(&p.seller, asset),
        EscrowError::ApprovalMissing(Role::Lender),
    );
    assert_eq!(escrow.snapshot(), before);

    escrow.approve_sale(&p.lender, asset).unwrap();
    let before = escrow.snapshot();
    assert_err(
        escrow.finalize_sale(&p.seller, asset),
        EscrowError::InsufficientFunds { held: 5, required: 10 },
    );
    assert_eq!(escrow.snapshot(), before);
    assert_eq!(escrow.get_balance(), 5);
    assert_eq!(registry.owner_of(asset).unwrap(), p.escrow);
}

#[test]
fn finalize_sale() {
    let (mut escrow, registry, p, asset) = approved_sale();

    // lender sends the rest
    escrow.fund(&p.lender, asset, 5).unwrap();
    assert_eq!(escrow.get_balance(), 10);

    escrow.finalize_sale(&p.seller, asset).unwrap();
    assert_eq!(escrow.get_balance(), 0);
    assert_eq!(registry.owner_of(asset).unwrap(), p.buyer);
    assert_eq!(escrow.payout_of(&p.seller), 10);
    assert!(!escrow.is_listed(asset));
    assert_eq!(
        escrow.events().last(),
        Some(&EscrowEvent::Settled {
            asset,
            buyer: p.buyer.clone(),
            seller: p.seller.clone(),
            amount: 10,
        })
    );

    // terminal: nothing else goes through
    assert_err(
        escrow.deposit_earnest(&p.buyer, asset, 1),
        EscrowError::AlreadySettled(asset),
    );
    assert_err(
        escrow.finalize_sale(&p.seller, asset),
        EscrowError::AlreadySettled(asset),
    );
    assert_err(escrow.fund(&p.lender, asset, 1), EscrowError::AlreadySettled(asset));
    assert_err(
        escrow.approve_sale(&p.buyer, asset),
        EscrowError::AlreadySettled(asset),
    );
    assert_err(
        escrow.cancel_sale(&p.buyer, asset),
        EscrowError::AlreadySettled(asset),
    );
    assert_eq!(escrow.payout_of(&p.seller), 10);
}

#[test]
fn overfunded_sale_pays_everything_to_seller() {
    let (mut escrow, _, p, asset) = approved_sale();
    escrow.fund(&p.lender, asset, 8).unwrap();
    escrow.finalize_sale(&p.seller, asset).unwrap();
    assert_eq!(escrow.payout_of(&p.seller), 13);
    assert_eq!(escrow.get_balance(), 0);
}

#[test]
fn cancel_after_failed_inspection_refunds_funders() {
    let (mut escrow, registry, p, asset) = approved_sale();
    escrow.fund(&p.lender, asset, 3).unwrap();
    escrow.update_inspection_status(&p.inspector, asset, false).unwrap();

    escrow.cancel_sale(&p.buyer, asset).unwrap();
    assert_eq!(registry.owner_of(asset).unwrap(), p.seller);
    assert_eq!(escrow.get_balance(), 0);
    assert_eq!(escrow.payout_of(&p.buyer), 5);
    assert_eq!(escrow.payout_of(&p.lender), 3);
    assert_eq!(escrow.payout_of(&p.seller), 0);
    assert!(!escrow.is_listed(asset));
    assert_err(
        escrow.deposit_earnest(&p.buyer, asset, 1),
        EscrowError::NotListed(asset),
    );

    // the seller can put the title back on the market
    let mut handle = registry.clone();
    handle.approve(&p.seller, asset, &p.escrow).unwrap();
    escrow.list(&p.seller, asset, p.buyer.clone(), 12, 2).unwrap();
    assert!(escrow.is_listed(asset));
    assert!(!escrow.inspection_passed(asset));
    assert!(!escrow.approval(asset, &p.buyer));
    assert_eq!(escrow.held_balance(asset), 0);
}

#[test]
fn buyer_walking_away_forfeits_earnest() {
    let p = Parties::new();
    let config = p.config().with_cancellation(CancellationPolicy::ForfeitEarnest);
    let (mut escrow, _, asset) = deploy(config, &p);
    escrow.list(&p.seller, asset, p.buyer.clone(), 10, 2).unwrap();
    escrow.deposit_earnest(&p.buyer, asset, 5).unwrap();
    escrow.update_inspection_status(&p.inspector, asset, true).unwrap();

    escrow.cancel_sale(&p.buyer, asset).unwrap();
    assert_eq!(escrow.payout_of(&p.seller), 2);
    assert_eq!(escrow.payout_of(&p.buyer), 3);
}

#[test]
fn seller_cancel_never_forfeits() {
    let p = Parties::new();
    let config = p.config().with_cancellation(CancellationPolicy::ForfeitEarnest);
    let (mut escrow, _, asset) = deploy(config, &p);
    escrow.list(&p.seller, asset, p.buyer.clone(), 10, 2).unwrap();
    escrow.deposit_earnest(&p.buyer, asset, 5).unwrap();
    escrow.update_inspection_status(&p.inspector, asset, true).unwrap();

    escrow.cancel_sale(&p.seller, asset).unwrap();
    assert_eq!(escrow.payout_of(&p.seller), 0);
    assert_eq!(escrow.payout_of(&p.buyer), 5);
}

/// Registry that refuses to deliver titles to one blocked identity.
#[derive(Debug)]
struct BlockingRegistry {
    inner: Registry,
    blocked: ID,
}

impl AssetRegistry for BlockingRegistry {
    fn address(&self) -> ID {
        self.inner.address()
    }
    fn mint(&mut self, caller: &ID, uri: &str) -> deed_registry::Result<AssetId> {
        self.inner.mint(caller, uri)
    }
    fn approve(&mut self, caller: &ID, asset: AssetId, spender: &ID) -> deed_registry::Result<()> {
        self.inner.approve(caller, asset, spender)
    }
    fn get_approved(&self, asset: AssetId) -> deed_registry::Result<Option<ID>> {
        self.inner.get_approved(asset)
    }
    fn owner_of(&self, asset: AssetId) -> deed_registry::Result<ID> {
        self.inner.owner_of(asset)
    }
    fn token_uri(&self, asset: AssetId) -> deed_registry::Result<String> {
        self.inner.token_uri(asset)
    }
    fn transfer_from(
        &mut self,
        operator: &ID,
        from: &ID,
        to: &ID,
        asset: AssetId,
    ) -> deed_registry::Result<()> {
        if *to == self.blocked {
            return Err(RegistryError::Rejected(format!("{} is frozen", to)));
        }
        self.inner.transfer_from(operator, from, to, asset)
    }
}

/// Listed for 10, fully funded by the buyer, inspected and approved, on a
/// registry that refuses deliveries to `blocked`.
fn blocked_sale(p: &Parties, blocked: &ID) -> (Escrow<BlockingRegistry>, AssetId) {
    let mut inner = Registry::new(p.registry.clone());
    let asset = inner.mint(&p.seller, URI).unwrap();
    inner.approve(&p.seller, asset, &p.escrow).unwrap();
    let registry = BlockingRegistry {
        inner,
        blocked: blocked.clone(),
    };

    let mut escrow = Escrow::new(p.config(), registry).unwrap();
    escrow.list(&p.seller, asset, p.buyer.clone(), 10, 1).unwrap();
    escrow.deposit_earnest(&p.buyer, asset, 10).unwrap();
    escrow.update_inspection_status(&p.inspector, asset, true).unwrap();
    for party in [&p.buyer, &p.seller, &p.lender] {
        escrow.approve_sale(party, asset).unwrap();
    }
    (escrow, asset)
}

#[test]
fn registry_refusal_rolls_back_settlement() {
    let p = Parties::new();
    let (mut escrow, asset) = blocked_sale(&p, &p.buyer);

    let before = escrow.snapshot();
    assert_err(
        escrow.finalize_sale(&p.seller, asset),
        EscrowError::RegistryTransferFailed(RegistryError::Rejected(format!(
            "{} is frozen",
            p.buyer
        ))),
    );
    assert_eq!(escrow.snapshot(), before);
    assert!(escrow.is_listed(asset));
    assert_eq!(escrow.get_balance(), 10);
    assert_eq!(escrow.payout_of(&p.seller), 0);
    assert_eq!(escrow.registry().owner_of(asset).unwrap(), p.escrow);

    // the way out still works
    escrow.cancel_sale(&p.buyer, asset).unwrap();
    assert_eq!(escrow.payout_of(&p.buyer), 10);
    assert_eq!(escrow.registry().owner_of(asset).unwrap(), p.seller);
}

#[test]
fn registry_refusal_rolls_back_cancellation() {
    let p = Parties::new();
    let (mut escrow, asset) = blocked_sale(&p, &p.seller);

    let before = escrow.snapshot();
    for caller in [&p.seller, &p.buyer] {
        assert_err(
            escrow.cancel_sale(caller, asset),
            EscrowError::RegistryTransferFailed(RegistryError::Rejected(format!(
                "{} is frozen",
                p.seller
            ))),
        );
        assert_eq!(escrow.snapshot(), before);
    }
    assert!(escrow.is_listed(asset));
    assert_eq!(escrow.get_balance(), 10);
    assert_eq!(escrow.payout_of(&p.buyer), 0);
    assert_eq!(escrow.registry().owner_of(asset).unwrap(), p.escrow);

    // settlement is unaffected
    escrow.finalize_sale(&p.seller, asset).unwrap();
    assert_eq!(escrow.payout_of(&p.seller), 10);
    assert_eq!(escrow.registry().owner_of(asset).unwrap(), p.buyer);
}

/// Registry that calls back into the coordinator while moving a title.
struct CallbackRegistry {
    inner: Registry,
    escrow: Arc<OnceLock<SharedEscrow<CallbackRegistry>>>,
    caller: ID,
    seen: Arc<Mutex<Vec<Result<()>>>>,
}

impl AssetRegistry for CallbackRegistry {
    fn address(&self) -> ID {
        self.inner.address()
    }
    fn mint(&mut self, caller: &ID, uri: &str) -> deed_registry::Result<AssetId> {
        self.inner.mint(caller, uri)
    }
    fn approve(&mut self, caller: &ID, asset: AssetId, spender: &ID) -> deed_registry::Result<()> {
        self.inner.approve(caller, asset, spender)
    }
    fn get_approved(&self, asset: AssetId) -> deed_registry::Result<Option<ID>> {
        self.inner.get_approved(asset)
    }
    fn owner_of(&self, asset: AssetId) -> deed_registry::Result<ID> {
        self.inner.owner_of(asset)
    }
    fn token_uri(&self, asset: AssetId) -> deed_registry::Result<String> {
        self.inner.token_uri(asset)
    }
    fn transfer_from(
        &mut self,
        operator: &ID,
        from: &ID,
        to: &ID,
        asset: AssetId,
    ) -> deed_registry::Result<()> {
        if let Some(escrow) = self.escrow.get() {
            let mut seen = self.seen.lock().unwrap();
            seen.push(escrow.finalize_sale(&self.caller, asset));
            seen.push(escrow.deposit_earnest(to, asset, 1));
        }
        self.inner.transfer_from(operator, from, to, asset)
    }
}

#[test]
fn reentrant_calls_during_settlement_fail() {
    let p = Parties::new();
    let mut inner = Registry::new(p.registry.clone());
    let asset = inner.mint(&p.seller, URI).unwrap();
    inner.approve(&p.seller, asset, &p.escrow).unwrap();

    let slot = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = CallbackRegistry {
        inner,
        escrow: Arc::clone(&slot),
        caller: p.seller.clone(),
        seen: Arc::clone(&seen),
    };
    let shared = SharedEscrow::new(Escrow::new(p.config(), registry).unwrap());

    shared.list(&p.seller, asset, p.buyer.clone(), 10, 1).unwrap();
    assert!(slot.set(shared.clone()).is_ok());

    shared.deposit_earnest(&p.buyer, asset, 4).unwrap();
    shared.fund(&p.lender, asset, 6).unwrap();
    shared.update_inspection_status(&p.inspector, asset, true).unwrap();
    for party in [&p.buyer, &p.seller, &p.lender] {
        shared.approve_sale(party, asset).unwrap();
    }
    shared.finalize_sale(&p.seller, asset).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![Err(EscrowError::Reentrant), Err(EscrowError::Reentrant)]);

    let (balance, payout, owner) = shared
        .read(|e| {
            (
                e.get_balance(),
                e.payout_of(&p.seller),
                e.registry().owner_of(asset),
            )
        })
        .unwrap();
    assert_eq!(balance, 0);
    assert_eq!(payout, 10);
    assert_eq!(owner.unwrap(), p.buyer);
}

#[test]
fn restore_from_snapshot() {
    let (escrow, registry, p, asset) = approved_sale();
    let snapshot = escrow.snapshot();
    drop(escrow);

    let mut restored = Escrow::restore(snapshot, registry.clone()).unwrap();
    restored.fund(&p.lender, asset, 5).unwrap();
    restored.finalize_sale(&p.seller, asset).unwrap();
    assert_eq!(registry.owner_of(asset).unwrap(), p.buyer);
    assert_eq!(restored.payout_of(&p.seller), 10);
    assert_eq!(
        restored
            .events()
            .iter()
            .filter(|e| e.asset() == asset)
            .count(),
        8
    );
}
