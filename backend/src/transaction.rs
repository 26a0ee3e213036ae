//! Lifecycle of secondary-market token listings.
//!
//! `pending` is the only non-terminal state. A pending record with a seller
//! and no buyer is an open marketplace listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConsultationStatus, Money, Percentage, TokenTransaction, TransactionStatus};
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub status: TransactionStatus,
    pub buyer_id: Option<i64>,
}

/// Body of `PATCH /api/token-transactions/:id/status`. The status stays a
/// raw string so an unknown value is reported as a 400, not a decode error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub buyer_id: Option<i64>,
}

impl StatusChangeRequest {
    pub fn parse(&self) -> Option<StatusChange> {
        let status = self.status.as_deref()?.parse().ok()?;
        Some(StatusChange {
            status,
            buyer_id: self.buyer_id,
        })
    }
}

/// Returns `current` moved to the requested state. Ownership and wallet
/// checks for a completion are the caller's responsibility.
pub fn apply(
    current: &TokenTransaction,
    change: StatusChange,
    now: DateTime<Utc>,
) -> Result<TokenTransaction, StorageError> {
    if current.status != TransactionStatus::Pending || change.status == TransactionStatus::Pending {
        return Err(StorageError::InvalidTransition {
            from: current.status.as_str(),
            to: change.status.as_str(),
        });
    }

    let mut next = current.clone();
    next.status = change.status;
    if change.status == TransactionStatus::Completed {
        let buyer = match (current.buyer_id, change.buyer_id) {
            (Some(reserved), Some(requested)) if reserved != requested => {
                return Err(StorageError::BuyerMismatch { expected: reserved });
            }
            (Some(buyer), _) | (None, Some(buyer)) => buyer,
            (None, None) => return Err(StorageError::MissingBuyer),
        };
        if current.seller_id == Some(buyer) {
            return Err(StorageError::SelfTrade);
        }
        next.buyer_id = Some(buyer);
        next.completed_at = Some(now);
    }
    Ok(next)
}

/// Consultations follow the same shape: `scheduled` is the only open state.
pub fn advance_consultation(
    current: ConsultationStatus,
    next: ConsultationStatus,
) -> Result<ConsultationStatus, StorageError> {
    if current != ConsultationStatus::Scheduled || next == ConsultationStatus::Scheduled {
        return Err(StorageError::InvalidTransition {
            from: current.as_str(),
            to: next.as_str(),
        });
    }
    Ok(next)
}

pub fn is_open_listing(tx: &TokenTransaction) -> bool {
    tx.status == TransactionStatus::Pending && tx.seller_id.is_some() && tx.buyer_id.is_none()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: i64,
    pub property_id: i64,
    pub seller_id: i64,
    pub percentage: Percentage,
    /// Price of one percent of ownership.
    pub price_per_unit: Money,
    pub total_price: Money,
    pub listed_date: DateTime<Utc>,
}

pub fn open_listing(tx: &TokenTransaction) -> Option<Listing> {
    if !is_open_listing(tx) {
        return None;
    }
    Some(Listing {
        id: tx.id,
        property_id: tx.property_id,
        seller_id: tx.seller_id?,
        percentage: tx.percentage,
        price_per_unit: tx.amount.per_percent(tx.percentage)?,
        total_price: tx.amount,
        listed_date: tx.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(seller: Option<i64>, buyer: Option<i64>) -> TokenTransaction {
        TokenTransaction {
            id: 3,
            property_id: 1,
            seller_id: seller,
            buyer_id: buyer,
            percentage: Percentage::from_whole(4),
            amount: Money::from_whole(26_000),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn complete(buyer_id: Option<i64>) -> StatusChange {
        StatusChange {
            status: TransactionStatus::Completed,
            buyer_id,
        }
    }

    #[test]
    fn completion_assigns_buyer_and_stamps_time() {
        let now = Utc::now();
        let done = apply(&listing(Some(1), None), complete(Some(2)), now).unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(done.buyer_id, Some(2));
        assert_eq!(done.completed_at, Some(now));
    }

    #[test]
    fn completion_requires_buyer() {
        let err = apply(&listing(Some(1), None), complete(None), Utc::now()).unwrap_err();
        assert!(matches!(err, StorageError::MissingBuyer));
    }

    #[test]
    fn reserved_buyer_must_match() {
        let tx = listing(Some(1), Some(5));
        assert!(apply(&tx, complete(None), Utc::now()).is_ok());
        assert!(matches!(
            apply(&tx, complete(Some(6)), Utc::now()),
            Err(StorageError::BuyerMismatch { expected: 5 })
        ));
    }

    #[test]
    fn seller_cannot_buy_own_listing() {
        let err = apply(&listing(Some(1), None), complete(Some(1)), Utc::now()).unwrap_err();
        assert!(matches!(err, StorageError::SelfTrade));
    }

    #[test]
    fn terminal_states_are_final() {
        let cancel = StatusChange {
            status: TransactionStatus::Cancelled,
            buyer_id: None,
        };
        let cancelled = apply(&listing(Some(1), None), cancel, Utc::now()).unwrap();
        assert_eq!(cancelled.completed_at, None);
        for change in [cancel, complete(Some(2))] {
            let err = apply(&cancelled, change, Utc::now()).unwrap_err();
            assert!(matches!(err, StorageError::InvalidTransition { from: "cancelled", .. }));
        }

        let pending_again = StatusChange {
            status: TransactionStatus::Pending,
            buyer_id: None,
        };
        assert!(apply(&listing(Some(1), None), pending_again, Utc::now()).is_err());
    }

    #[test]
    fn open_listing_derivation() {
        let open = open_listing(&listing(Some(1), None)).unwrap();
        assert_eq!(open.price_per_unit, Money::from_whole(6_500));
        assert_eq!(open.total_price, Money::from_whole(26_000));
        assert!(open_listing(&listing(None, None)).is_none());
        assert!(open_listing(&listing(Some(1), Some(2))).is_none());

        let mut sliver = listing(Some(1), None);
        sliver.amount = Money::from_whole(90_000_000_000_000_000);
        sliver.percentage = Percentage::from_hundredths(1);
        assert!(open_listing(&sliver).is_none());
    }

    #[test]
    fn consultation_lifecycle() {
        use ConsultationStatus::*;
        assert_eq!(advance_consultation(Scheduled, Completed).unwrap(), Completed);
        assert!(advance_consultation(Completed, Cancelled).is_err());
        assert!(advance_consultation(Scheduled, Scheduled).is_err());
    }

    #[test]
    fn status_request_parsing() {
        let raw = StatusChangeRequest {
            status: Some("completed".into()),
            buyer_id: Some(4),
        };
        assert_eq!(raw.parse(), Some(complete(Some(4))));
        let bogus = StatusChangeRequest {
            status: Some("archived".into()),
            buyer_id: None,
        };
        assert_eq!(bogus.parse(), None);
    }
}
