//! Storage engine.
//!
//! Every backend guarantees that the multi-step units (investment admission
//! with its token decrement, trade completion with its ownership check, and
//! any wallet movement riding along) commit as a whole or not at all.

use crate::models::{
    Consultation, ConsultationStatus, Investment, Money, NewConsultation, NewInvestment,
    NewProperty, NewTokenTransaction, NewUser, Percentage, Property, PropertyStatus,
    TokenTransaction, User,
};
use crate::transaction::StatusChange;

pub mod memory;
pub mod postgres;
pub mod seed;

pub use memory::MemStorage;
pub use postgres::PgStorage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Email already exists")]
    DuplicateEmail,
    #[error("Investment of {requested}% is below the minimum of {minimum}%")]
    BelowMinimum {
        requested: Percentage,
        minimum: Percentage,
    },
    #[error("Not enough tokens available: requested {requested}%, available {available}%")]
    InsufficientTokens {
        requested: Percentage,
        available: Percentage,
    },
    #[error("Amount {amount} does not match {expected} for the requested share")]
    AmountMismatch { amount: Money, expected: Money },
    #[error("Insufficient wallet balance: {balance} available, {required} required")]
    InsufficientFunds { balance: Money, required: Money },
    #[error("Wallet balance {balance} cannot take a further {amount}")]
    BalanceOverflow { balance: Money, amount: Money },
    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("A buyer is required to complete a transaction")]
    MissingBuyer,
    #[error("Transaction is reserved for buyer {expected}")]
    BuyerMismatch { expected: i64 },
    #[error("Seller cannot buy their own listing")]
    SelfTrade,
    #[error("Seller holds {held}% but the listing sells {requested}%")]
    SellerOversold {
        held: Percentage,
        requested: Percentage,
    },
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StorageError::NotFound { entity, id }
    }
}

pub trait Storage: Send + Sync {
    // User operations
    fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;
    /// Uniqueness of username and email is checked in the same unit as the
    /// insert. `user.password` must already be hashed.
    fn create_user(&self, user: NewUser) -> Result<User, StorageError>;
    fn deposit(&self, user_id: i64, amount: Money) -> Result<User, StorageError>;

    // Property operations
    fn get_property(&self, id: i64) -> Result<Option<Property>, StorageError>;
    fn list_properties(&self) -> Result<Vec<Property>, StorageError>;
    fn list_properties_by_status(&self, status: PropertyStatus) -> Result<Vec<Property>, StorageError>;
    fn create_property(&self, property: NewProperty) -> Result<Property, StorageError>;
    fn update_property_status(&self, id: i64, status: PropertyStatus) -> Result<Property, StorageError>;

    // Investment operations
    fn get_investment(&self, id: i64) -> Result<Option<Investment>, StorageError>;
    fn list_investments_by_user(&self, user_id: i64) -> Result<Vec<Investment>, StorageError>;
    fn list_investments_by_property(&self, property_id: i64) -> Result<Vec<Investment>, StorageError>;
    /// Admits the investment and decrements the property's available tokens
    /// atomically.
    fn create_investment(&self, investment: NewInvestment) -> Result<Investment, StorageError>;

    // Token transaction operations
    fn get_token_transaction(&self, id: i64) -> Result<Option<TokenTransaction>, StorageError>;
    fn list_token_transactions_by_user(&self, user_id: i64) -> Result<Vec<TokenTransaction>, StorageError>;
    fn list_token_transactions_by_property(
        &self,
        property_id: i64,
    ) -> Result<Vec<TokenTransaction>, StorageError>;
    fn list_open_listings(&self) -> Result<Vec<TokenTransaction>, StorageError>;
    fn create_token_transaction(
        &self,
        transaction: NewTokenTransaction,
    ) -> Result<TokenTransaction, StorageError>;
    fn update_token_transaction_status(
        &self,
        id: i64,
        change: StatusChange,
    ) -> Result<TokenTransaction, StorageError>;

    // Consultation operations
    fn get_consultation(&self, id: i64) -> Result<Option<Consultation>, StorageError>;
    fn list_consultations_by_user(&self, user_id: i64) -> Result<Vec<Consultation>, StorageError>;
    fn create_consultation(&self, consultation: NewConsultation) -> Result<Consultation, StorageError>;
    fn update_consultation_status(
        &self,
        id: i64,
        status: ConsultationStatus,
    ) -> Result<Consultation, StorageError>;
}
