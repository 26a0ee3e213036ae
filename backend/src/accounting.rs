//! Ownership accounting.
//!
//! A property's `available_tokens` starts at the share offered to investors
//! and drops by exactly the percentage of every investment taken against it.
//! The admission checks here must run inside the same critical section (lock
//! or database transaction) as the decrement they guard.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Investment, Money, NewInvestment, Percentage, Property, TokenTransaction, TransactionStatus};
use crate::storage::StorageError;

/// Aggregate occupier ownership that grants residency rights.
pub const RESIDENCY_THRESHOLD: Percentage = Percentage::from_whole(55);

/// How an investment's dollar amount relates to the property price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmountPolicy {
    /// Accept any positive amount (price-locked deals).
    #[default]
    Unchecked,
    /// Amount must equal `price × percentage / 100`, to the cent.
    MatchPrice,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarketPolicy {
    pub amount: AmountPolicy,
    pub debit_wallets: bool,
}

/// Checks `request` against the current state of `property` and returns the
/// share left once it is accepted.
pub fn admit_investment(
    property: &Property,
    request: &NewInvestment,
    policy: AmountPolicy,
) -> Result<Percentage, StorageError> {
    if request.percentage < property.minimum_investment {
        return Err(StorageError::BelowMinimum {
            requested: request.percentage,
            minimum: property.minimum_investment,
        });
    }
    if request.percentage > property.available_tokens {
        return Err(StorageError::InsufficientTokens {
            requested: request.percentage,
            available: property.available_tokens,
        });
    }
    if policy == AmountPolicy::MatchPrice {
        let expected = property.price.share_of(request.percentage);
        if (request.amount - expected).hundredths().abs() > 1 {
            return Err(StorageError::AmountMismatch {
                amount: request.amount,
                expected,
            });
        }
    }
    Ok(property.available_tokens - request.percentage)
}

/// Balance left after paying `amount`.
pub fn debit(balance: Money, amount: Money) -> Result<Money, StorageError> {
    if amount > balance {
        return Err(StorageError::InsufficientFunds {
            balance,
            required: amount,
        });
    }
    Ok(balance - amount)
}

/// Balance after receiving `amount`.
pub fn credit(balance: Money, amount: Money) -> Result<Money, StorageError> {
    balance
        .checked_add(amount)
        .ok_or(StorageError::BalanceOverflow { balance, amount })
}

/// Share of `property_id` currently held by `user_id`: primary investments
/// plus completed purchases minus completed sales.
pub fn holding<'a>(
    user_id: i64,
    property_id: i64,
    investments: impl IntoIterator<Item = &'a Investment>,
    transactions: impl IntoIterator<Item = &'a TokenTransaction>,
) -> Percentage {
    let invested: Percentage = investments
        .into_iter()
        .filter(|i| i.user_id == user_id && i.property_id == property_id)
        .map(|i| i.percentage)
        .sum();

    transactions
        .into_iter()
        .filter(|t| t.property_id == property_id && t.status == TransactionStatus::Completed)
        .fold(invested, |held, t| {
            if t.buyer_id == Some(user_id) {
                held + t.percentage
            } else if t.seller_id == Some(user_id) {
                held - t.percentage
            } else {
                held
            }
        })
}

/// A seller may not complete a sale of more than they still hold.
pub fn ensure_seller_holds(held: Percentage, listing: &TokenTransaction) -> Result<(), StorageError> {
    if held < listing.percentage {
        return Err(StorageError::SellerOversold {
            held,
            requested: listing.percentage,
        });
    }
    Ok(())
}

/// `(current − invested) / invested × 100`, rounded to two places; zero when
/// nothing is invested.
pub fn growth_percentage(invested: Money, current: Money) -> f64 {
    if invested.hundredths() == 0 {
        return 0.0;
    }
    let growth = (current - invested).hundredths() as f64 / invested.hundredths() as f64 * 100.0;
    (growth * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub property_id: i64,
    pub invested_percentage: Percentage,
    pub effective_percentage: Percentage,
    pub amount: Money,
    pub is_occupier: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub user_id: i64,
    pub total_invested: Money,
    pub portfolio_value: Money,
    pub growth_percentage: f64,
    pub properties_owned: usize,
    pub holdings: Vec<Holding>,
}

/// Dashboard figures for one user. Capital invested and current value are
/// reported separately; value is `invested × multiplier`.
pub fn portfolio(
    user_id: i64,
    investments: &[Investment],
    transactions: &[TokenTransaction],
    multiplier: f64,
) -> PortfolioSummary {
    let mine: Vec<&Investment> = investments.iter().filter(|i| i.user_id == user_id).collect();
    let total_invested: Money = mine.iter().map(|i| i.amount).sum();
    let portfolio_value = total_invested.scale(multiplier);

    let owned: BTreeSet<i64> = mine.iter().map(|i| i.property_id).collect();
    let mut touched = owned.clone();
    touched.extend(
        transactions
            .iter()
            .filter(|t| {
                t.status == TransactionStatus::Completed
                    && (t.buyer_id == Some(user_id) || t.seller_id == Some(user_id))
            })
            .map(|t| t.property_id),
    );

    let mut by_property: BTreeMap<i64, Holding> = BTreeMap::new();
    for property_id in touched {
        let entries = mine.iter().filter(|i| i.property_id == property_id);
        by_property.insert(
            property_id,
            Holding {
                property_id,
                invested_percentage: entries.clone().map(|i| i.percentage).sum(),
                effective_percentage: holding(
                    user_id,
                    property_id,
                    mine.iter().copied(),
                    transactions,
                ),
                amount: entries.clone().map(|i| i.amount).sum(),
                is_occupier: entries.clone().any(|i| i.is_occupier),
            },
        );
    }

    PortfolioSummary {
        user_id,
        total_invested,
        portfolio_value,
        growth_percentage: growth_percentage(total_invested, portfolio_value),
        properties_owned: owned.len(),
        holdings: by_property.into_values().collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipBreakdown {
    pub property_id: i64,
    pub available_tokens: Percentage,
    pub investor_percentage: Percentage,
    pub occupier_percentage: Percentage,
    /// Share never offered to investors (held by the listing homebuyer).
    pub retained_percentage: Percentage,
    pub residency_eligible: bool,
}

pub fn ownership(property: &Property, investments: &[Investment]) -> OwnershipBreakdown {
    let mine = investments.iter().filter(|i| i.property_id == property.id);
    let investor_percentage: Percentage = mine.clone().map(|i| i.percentage).sum();
    let occupier_percentage: Percentage = mine.filter(|i| i.is_occupier).map(|i| i.percentage).sum();
    let retained = Percentage::FULL - property.available_tokens - investor_percentage;

    OwnershipBreakdown {
        property_id: property.id,
        available_tokens: property.available_tokens,
        investor_percentage,
        occupier_percentage,
        retained_percentage: retained.max(Percentage::ZERO),
        residency_eligible: occupier_percentage >= RESIDENCY_THRESHOLD,
    }
}
