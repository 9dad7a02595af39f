use deed_registry::{AssetId, ID};
use serde::{Deserialize, Serialize};

/// Record of a successful state change, in the order it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowEvent {
    Listed {
        asset: AssetId,
        buyer: ID,
        purchase_price: u128,
        escrow_amount: u128,
    },
    EarnestDeposited {
        asset: AssetId,
        from: ID,
        amount: u128,
    },
    Funded {
        asset: AssetId,
        from: ID,
        amount: u128,
    },
    InspectionUpdated {
        asset: AssetId,
        passed: bool,
    },
    SaleApproved {
        asset: AssetId,
        by: ID,
    },
    Settled {
        asset: AssetId,
        buyer: ID,
        seller: ID,
        amount: u128,
    },
    Cancelled {
        asset: AssetId,
        by: ID,
        refunds: Vec<(ID, u128)>,
    },
}

impl EscrowEvent {
    pub fn asset(&self) -> AssetId {
        match self {
            Self::Listed { asset, .. }
            | Self::EarnestDeposited { asset, .. }
            | Self::Funded { asset, .. }
            | Self::InspectionUpdated { asset, .. }
            | Self::SaleApproved { asset, .. }
            | Self::Settled { asset, .. }
            | Self::Cancelled { asset, .. } => *asset,
        }
    }
}
