//! In-memory storage.
//!
//! All tables live behind one `RwLock`. Every write, including the
//! check-then-decrement of an investment, runs under the write guard, so
//! concurrent investors cannot both pass the availability check against a
//! stale `available_tokens`.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{Storage, StorageError};
use crate::accounting::{self, MarketPolicy};
use crate::models::{
    Consultation, ConsultationStatus, Investment, Money, NewConsultation, NewInvestment,
    NewProperty, NewTokenTransaction, NewUser, Property, PropertyStatus, TokenTransaction,
    TransactionStatus, User, DEFAULT_WALLET_BALANCE,
};
use crate::transaction::{self, StatusChange};

struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn insert_with(&mut self, build: impl FnOnce(i64) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).cloned()
    }

    fn filter(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        self.rows.values().filter(|row| pred(row)).cloned().collect()
    }
}

struct Tables {
    users: Table<User>,
    properties: Table<Property>,
    investments: Table<Investment>,
    token_transactions: Table<TokenTransaction>,
    consultations: Table<Consultation>,
}

impl Tables {
    fn user_mut(&mut self, id: i64) -> Result<&mut User, StorageError> {
        self.users
            .rows
            .get_mut(&id)
            .ok_or(StorageError::not_found("User", id))
    }

    fn require_user(&self, id: i64) -> Result<(), StorageError> {
        if self.users.rows.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::not_found("User", id))
        }
    }

    fn require_property(&self, id: i64) -> Result<(), StorageError> {
        if self.properties.rows.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::not_found("Property", id))
        }
    }
}

pub struct MemStorage {
    tables: RwLock<Tables>,
    policy: MarketPolicy,
}

impl MemStorage {
    pub fn new(policy: MarketPolicy) -> Self {
        Self {
            tables: RwLock::new(Tables {
                users: Table::new(),
                properties: Table::new(),
                investments: Table::new(),
                token_transactions: Table::new(),
                consultations: Table::new(),
            }),
            policy,
        }
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new(MarketPolicy::default())
    }
}

impl Storage for MemStorage {
    fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        Ok(self.tables.read().users.get(id))
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let tables = self.tables.read();
        Ok(tables.users.rows.values().find(|u| u.username == username).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let tables = self.tables.read();
        Ok(tables.users.rows.values().find(|u| u.email == email).cloned())
    }

    fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let mut tables = self.tables.write();
        if tables.users.rows.values().any(|u| u.username == user.username) {
            return Err(StorageError::DuplicateUsername);
        }
        if tables.users.rows.values().any(|u| u.email == user.email) {
            return Err(StorageError::DuplicateEmail);
        }

        let created = tables.users.insert_with(|id| User {
            id,
            username: user.username,
            password: user.password,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            profile_image: user.profile_image,
            role: user.role,
            is_investor: user.is_investor,
            is_homebuyer: user.is_homebuyer,
            wallet_balance: DEFAULT_WALLET_BALANCE,
            created_at: Utc::now(),
        });
        log::info!("Created user {} ({})", created.id, created.username);
        Ok(created)
    }

    fn deposit(&self, user_id: i64, amount: Money) -> Result<User, StorageError> {
        let mut tables = self.tables.write();
        let user = tables.user_mut(user_id)?;
        user.wallet_balance = accounting::credit(user.wallet_balance, amount)?;
        log::info!("Credited {} to wallet of user {}", amount, user_id);
        Ok(user.clone())
    }

    fn get_property(&self, id: i64) -> Result<Option<Property>, StorageError> {
        Ok(self.tables.read().properties.get(id))
    }

    fn list_properties(&self) -> Result<Vec<Property>, StorageError> {
        Ok(self.tables.read().properties.filter(|_| true))
    }

    fn list_properties_by_status(&self, status: PropertyStatus) -> Result<Vec<Property>, StorageError> {
        Ok(self.tables.read().properties.filter(|p| p.status == status))
    }

    fn create_property(&self, property: NewProperty) -> Result<Property, StorageError> {
        let mut tables = self.tables.write();
        if let Some(developer_id) = property.developer_id {
            tables.require_user(developer_id)?;
        }
        let created = tables.properties.insert_with(|id| Property {
            id,
            title: property.title,
            address: property.address,
            city: property.city,
            state: property.state,
            zip_code: property.zip_code,
            price: property.price,
            price_per_sqft: property.price_per_sqft,
            bedrooms: property.bedrooms,
            bathrooms: property.bathrooms,
            square_feet: property.square_feet,
            description: property.description,
            property_type: property.property_type,
            image_url: property.image_url,
            available_tokens: property.available_tokens,
            minimum_investment: property.minimum_investment,
            status: property.status,
            developer_id: property.developer_id,
            created_at: Utc::now(),
        });
        log::info!("Created property {} ({})", created.id, created.title);
        Ok(created)
    }

    fn update_property_status(&self, id: i64, status: PropertyStatus) -> Result<Property, StorageError> {
        let mut tables = self.tables.write();
        let property = tables
            .properties
            .rows
            .get_mut(&id)
            .ok_or(StorageError::not_found("Property", id))?;
        property.status = status;
        log::info!("Property {} is now {}", id, status);
        Ok(property.clone())
    }

    fn get_investment(&self, id: i64) -> Result<Option<Investment>, StorageError> {
        Ok(self.tables.read().investments.get(id))
    }

    fn list_investments_by_user(&self, user_id: i64) -> Result<Vec<Investment>, StorageError> {
        Ok(self.tables.read().investments.filter(|i| i.user_id == user_id))
    }

    fn list_investments_by_property(&self, property_id: i64) -> Result<Vec<Investment>, StorageError> {
        Ok(self.tables.read().investments.filter(|i| i.property_id == property_id))
    }

    fn create_investment(&self, investment: NewInvestment) -> Result<Investment, StorageError> {
        let mut tables = self.tables.write();
        let property = tables
            .properties
            .get(investment.property_id)
            .ok_or(StorageError::not_found("Property", investment.property_id))?;
        let user = tables
            .users
            .get(investment.user_id)
            .ok_or(StorageError::not_found("User", investment.user_id))?;

        // Every check runs before the first mutation.
        let remaining = accounting::admit_investment(&property, &investment, self.policy.amount)?;
        let balance = if self.policy.debit_wallets {
            Some(accounting::debit(user.wallet_balance, investment.amount)?)
        } else {
            None
        };

        if let Some(balance) = balance {
            tables.user_mut(user.id)?.wallet_balance = balance;
        }
        if let Some(row) = tables.properties.rows.get_mut(&property.id) {
            row.available_tokens = remaining;
        }
        let created = tables.investments.insert_with(|id| Investment {
            id,
            user_id: investment.user_id,
            property_id: investment.property_id,
            percentage: investment.percentage,
            amount: investment.amount,
            investment_date: Utc::now(),
            is_occupier: investment.is_occupier,
        });
        log::info!(
            "Investment {}: user {} took {}% of property {} ({}% left)",
            created.id,
            created.user_id,
            created.percentage,
            created.property_id,
            remaining
        );
        Ok(created)
    }

    fn get_token_transaction(&self, id: i64) -> Result<Option<TokenTransaction>, StorageError> {
        Ok(self.tables.read().token_transactions.get(id))
    }

    fn list_token_transactions_by_user(&self, user_id: i64) -> Result<Vec<TokenTransaction>, StorageError> {
        Ok(self
            .tables
            .read()
            .token_transactions
            .filter(|t| t.seller_id == Some(user_id) || t.buyer_id == Some(user_id)))
    }

    fn list_token_transactions_by_property(
        &self,
        property_id: i64,
    ) -> Result<Vec<TokenTransaction>, StorageError> {
        Ok(self
            .tables
            .read()
            .token_transactions
            .filter(|t| t.property_id == property_id))
    }

    fn list_open_listings(&self) -> Result<Vec<TokenTransaction>, StorageError> {
        Ok(self.tables.read().token_transactions.filter(transaction::is_open_listing))
    }

    fn create_token_transaction(
        &self,
        transaction: NewTokenTransaction,
    ) -> Result<TokenTransaction, StorageError> {
        let mut tables = self.tables.write();
        tables.require_property(transaction.property_id)?;
        for user_id in [transaction.seller_id, transaction.buyer_id].into_iter().flatten() {
            tables.require_user(user_id)?;
        }

        let created = tables.token_transactions.insert_with(|id| TokenTransaction {
            id,
            property_id: transaction.property_id,
            seller_id: transaction.seller_id,
            buyer_id: transaction.buyer_id,
            percentage: transaction.percentage,
            amount: transaction.amount,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        });
        log::info!(
            "Token transaction {} opened for {}% of property {}",
            created.id,
            created.percentage,
            created.property_id
        );
        Ok(created)
    }

    fn update_token_transaction_status(
        &self,
        id: i64,
        change: StatusChange,
    ) -> Result<TokenTransaction, StorageError> {
        let mut tables = self.tables.write();
        let current = tables
            .token_transactions
            .get(id)
            .ok_or(StorageError::not_found("Token transaction", id))?;
        let next = transaction::apply(&current, change, Utc::now())?;

        let mut balances: Vec<(i64, Money)> = Vec::new();
        if next.status == TransactionStatus::Completed {
            let buyer_id = next.buyer_id.ok_or(StorageError::MissingBuyer)?;
            let buyer = tables
                .users
                .get(buyer_id)
                .ok_or(StorageError::not_found("User", buyer_id))?;

            if let Some(seller_id) = next.seller_id {
                let held = accounting::holding(
                    seller_id,
                    next.property_id,
                    tables.investments.rows.values(),
                    tables.token_transactions.rows.values(),
                );
                accounting::ensure_seller_holds(held, &next)?;
            }

            if self.policy.debit_wallets {
                balances.push((buyer_id, accounting::debit(buyer.wallet_balance, next.amount)?));
                if let Some(seller_id) = next.seller_id {
                    let seller = tables
                        .users
                        .get(seller_id)
                        .ok_or(StorageError::not_found("User", seller_id))?;
                    balances.push((seller_id, accounting::credit(seller.wallet_balance, next.amount)?));
                }
            }
        }

        for (user_id, balance) in balances {
            tables.user_mut(user_id)?.wallet_balance = balance;
        }
        tables.token_transactions.rows.insert(id, next.clone());
        log::info!("Token transaction {} is now {}", id, next.status);
        Ok(next)
    }

    fn get_consultation(&self, id: i64) -> Result<Option<Consultation>, StorageError> {
        Ok(self.tables.read().consultations.get(id))
    }

    fn list_consultations_by_user(&self, user_id: i64) -> Result<Vec<Consultation>, StorageError> {
        Ok(self.tables.read().consultations.filter(|c| c.user_id == user_id))
    }

    fn create_consultation(&self, consultation: NewConsultation) -> Result<Consultation, StorageError> {
        let mut tables = self.tables.write();
        tables.require_user(consultation.user_id)?;
        tables.require_property(consultation.property_id)?;

        let created = tables.consultations.insert_with(|id| Consultation {
            id,
            user_id: consultation.user_id,
            property_id: consultation.property_id,
            consultation_type: consultation.consultation_type,
            notes: consultation.notes,
            status: ConsultationStatus::Scheduled,
            scheduled_date: consultation.scheduled_date,
            created_at: Utc::now(),
        });
        log::info!(
            "Consultation {} scheduled for user {} on property {}",
            created.id,
            created.user_id,
            created.property_id
        );
        Ok(created)
    }

    fn update_consultation_status(
        &self,
        id: i64,
        status: ConsultationStatus,
    ) -> Result<Consultation, StorageError> {
        let mut tables = self.tables.write();
        let consultation = tables
            .consultations
            .rows
            .get_mut(&id)
            .ok_or(StorageError::not_found("Consultation", id))?;
        consultation.status = transaction::advance_consultation(consultation.status, status)?;
        log::info!("Consultation {} is now {}", id, status);
        Ok(consultation.clone())
    }
}
