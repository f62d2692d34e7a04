//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Wallet model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub owner: String,
    /// Balance in the smallest currency unit, never negative
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(format!("unknown transaction kind '{other}'")),
        }
    }
}

/// Outcome recorded on a ledger row
///
/// Only `Success` is ever written by the engine; failed attempts surface
/// as errors and are never committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{other}'")),
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: i64,
    pub initiator_wallet_id: Uuid,
    pub initiator_owner: String,
    /// Present only for transfers
    pub recipient_wallet_id: Option<Uuid>,
    pub recipient_owner: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Whether the given wallet took part in this transaction
    pub fn involves(&self, wallet_id: Uuid) -> bool {
        self.initiator_wallet_id == wallet_id || self.recipient_wallet_id == Some(wallet_id)
    }
}

/// One page of a wallet's transaction history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub transactions: Vec<TransactionRecord>,
    /// Number of transactions matching the wallet across all pages
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

impl HistoryPage {
    pub fn empty(offset: i64, limit: i64) -> Self {
        Self {
            transactions: Vec::new(),
            total: 0,
            offset,
            limit,
        }
    }

    /// `ceil(total / limit)`
    pub fn total_pages(&self) -> i64 {
        if self.limit <= 0 {
            return 0;
        }
        (self.total + self.limit - 1) / self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            TransactionKind::Deposit,
            TransactionKind::Withdrawal,
            TransactionKind::Transfer,
        ] {
            assert_eq!(kind.to_string().parse::<TransactionKind>(), Ok(kind));
        }
        assert!("withdraw".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TransactionStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
        assert_eq!("failed".parse::<TransactionStatus>(), Ok(TransactionStatus::Failed));
    }

    #[test]
    fn test_total_pages() {
        let mut page = HistoryPage::empty(0, 10);
        assert_eq!(page.total_pages(), 0);

        page.total = 1;
        assert_eq!(page.total_pages(), 1);

        page.total = 10;
        assert_eq!(page.total_pages(), 1);

        page.total = 11;
        assert_eq!(page.total_pages(), 2);
    }

    #[test]
    fn test_involves() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            kind: TransactionKind::Transfer,
            status: TransactionStatus::Success,
            amount: 10,
            initiator_wallet_id: alice,
            initiator_owner: "alice".to_string(),
            recipient_wallet_id: Some(bob),
            recipient_owner: Some("bob".to_string()),
            idempotency_key: "k".to_string(),
            created_at: Utc::now(),
        };

        assert!(record.involves(alice));
        assert!(record.involves(bob));
        assert!(!record.involves(Uuid::new_v4()));
    }
}
