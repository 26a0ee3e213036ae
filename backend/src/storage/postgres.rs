//! Postgres storage via diesel.
//!
//! Multi-step units run inside one database transaction. Investment admission
//! locks the property row (`SELECT ... FOR UPDATE`) before reading
//! `available_tokens`; trade completion locks the transaction row and then
//! the involved user rows in id order.

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::{Storage, StorageError};
use crate::accounting::{self, MarketPolicy};
use crate::db::PgPool;
use crate::models::{
    Consultation, ConsultationStatus, Investment, Money, NewConsultation, NewInvestment,
    NewProperty, NewTokenTransaction, NewUser, Percentage, Property, PropertyStatus,
    TokenTransaction, TransactionStatus, UnknownVariant, User, DEFAULT_WALLET_BALANCE,
};
use crate::schema::{consultations, investments, properties, token_transactions, users};
use crate::transaction::{self, StatusChange};

impl From<DieselError> for StorageError {
    fn from(e: DieselError) -> Self {
        if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = &e {
            match info.constraint_name() {
                Some(name) if name.contains("username") => return StorageError::DuplicateUsername,
                Some(name) if name.contains("email") => return StorageError::DuplicateEmail,
                _ => {}
            }
        }
        StorageError::Backend(e.to_string())
    }
}

impl From<UnknownVariant> for StorageError {
    fn from(e: UnknownVariant) -> Self {
        StorageError::Backend(format!("corrupt row: {e}"))
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = users, check_for_backend(diesel::pg::Pg))]
struct UserRow {
    id: i64,
    username: String,
    password: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: String,
    profile_image: Option<String>,
    role: String,
    is_investor: bool,
    is_homebuyer: bool,
    wallet_balance: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            password: row.password,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            profile_image: row.profile_image,
            role: row.role.parse()?,
            is_investor: row.is_investor,
            is_homebuyer: row.is_homebuyer,
            wallet_balance: Money::from_hundredths(row.wallet_balance),
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUserRow<'a> {
    username: &'a str,
    password: &'a str,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    email: &'a str,
    profile_image: Option<&'a str>,
    role: &'a str,
    is_investor: bool,
    is_homebuyer: bool,
    wallet_balance: i64,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = properties, check_for_backend(diesel::pg::Pg))]
struct PropertyRow {
    id: i64,
    title: String,
    address: String,
    city: String,
    state: String,
    zip_code: String,
    price: i64,
    price_per_sqft: Option<i64>,
    bedrooms: i32,
    bathrooms: f64,
    square_feet: i32,
    description: Option<String>,
    property_type: String,
    image_url: Option<String>,
    available_tokens: i64,
    minimum_investment: i64,
    status: String,
    developer_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PropertyRow> for Property {
    type Error = StorageError;

    fn try_from(row: PropertyRow) -> Result<Self, Self::Error> {
        Ok(Property {
            id: row.id,
            title: row.title,
            address: row.address,
            city: row.city,
            state: row.state,
            zip_code: row.zip_code,
            price: Money::from_hundredths(row.price),
            price_per_sqft: row.price_per_sqft.map(Money::from_hundredths),
            bedrooms: row.bedrooms,
            bathrooms: row.bathrooms,
            square_feet: row.square_feet,
            description: row.description,
            property_type: row.property_type.parse()?,
            image_url: row.image_url,
            available_tokens: Percentage::from_hundredths(row.available_tokens),
            minimum_investment: Percentage::from_hundredths(row.minimum_investment),
            status: row.status.parse()?,
            developer_id: row.developer_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = properties)]
struct NewPropertyRow<'a> {
    title: &'a str,
    address: &'a str,
    city: &'a str,
    state: &'a str,
    zip_code: &'a str,
    price: i64,
    price_per_sqft: Option<i64>,
    bedrooms: i32,
    bathrooms: f64,
    square_feet: i32,
    description: Option<&'a str>,
    property_type: &'a str,
    image_url: Option<&'a str>,
    available_tokens: i64,
    minimum_investment: i64,
    status: &'a str,
    developer_id: Option<i64>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = investments, check_for_backend(diesel::pg::Pg))]
struct InvestmentRow {
    id: i64,
    user_id: i64,
    property_id: i64,
    percentage: i64,
    amount: i64,
    investment_date: DateTime<Utc>,
    is_occupier: bool,
}

impl TryFrom<InvestmentRow> for Investment {
    type Error = StorageError;

    fn try_from(row: InvestmentRow) -> Result<Self, Self::Error> {
        Ok(Investment {
            id: row.id,
            user_id: row.user_id,
            property_id: row.property_id,
            percentage: Percentage::from_hundredths(row.percentage),
            amount: Money::from_hundredths(row.amount),
            investment_date: row.investment_date,
            is_occupier: row.is_occupier,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = investments)]
struct NewInvestmentRow {
    user_id: i64,
    property_id: i64,
    percentage: i64,
    amount: i64,
    is_occupier: bool,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = token_transactions, check_for_backend(diesel::pg::Pg))]
struct TokenTransactionRow {
    id: i64,
    property_id: i64,
    seller_id: Option<i64>,
    buyer_id: Option<i64>,
    percentage: i64,
    amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TokenTransactionRow> for TokenTransaction {
    type Error = StorageError;

    fn try_from(row: TokenTransactionRow) -> Result<Self, Self::Error> {
        Ok(TokenTransaction {
            id: row.id,
            property_id: row.property_id,
            seller_id: row.seller_id,
            buyer_id: row.buyer_id,
            percentage: Percentage::from_hundredths(row.percentage),
            amount: Money::from_hundredths(row.amount),
            status: row.status.parse()?,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = token_transactions)]
struct NewTokenTransactionRow<'a> {
    property_id: i64,
    seller_id: Option<i64>,
    buyer_id: Option<i64>,
    percentage: i64,
    amount: i64,
    status: &'a str,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = consultations, check_for_backend(diesel::pg::Pg))]
struct ConsultationRow {
    id: i64,
    user_id: i64,
    property_id: i64,
    consultation_type: String,
    notes: Option<String>,
    status: String,
    scheduled_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ConsultationRow> for Consultation {
    type Error = StorageError;

    fn try_from(row: ConsultationRow) -> Result<Self, Self::Error> {
        Ok(Consultation {
            id: row.id,
            user_id: row.user_id,
            property_id: row.property_id,
            consultation_type: row.consultation_type.parse()?,
            notes: row.notes,
            status: row.status.parse()?,
            scheduled_date: row.scheduled_date,
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = consultations)]
struct NewConsultationRow<'a> {
    user_id: i64,
    property_id: i64,
    consultation_type: &'a str,
    notes: Option<&'a str>,
    status: &'a str,
    scheduled_date: DateTime<Utc>,
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, StorageError>
where
    T: TryFrom<R, Error = StorageError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn convert_opt<R, T>(row: Option<R>) -> Result<Option<T>, StorageError>
where
    T: TryFrom<R, Error = StorageError>,
{
    row.map(T::try_from).transpose()
}

fn user_exists(conn: &mut PgConnection, id: i64) -> Result<(), StorageError> {
    let found = users::table
        .find(id)
        .select(users::id)
        .first::<i64>(conn)
        .optional()?;
    found.map(|_| ()).ok_or(StorageError::not_found("User", id))
}

fn property_exists(conn: &mut PgConnection, id: i64) -> Result<(), StorageError> {
    let found = properties::table
        .find(id)
        .select(properties::id)
        .first::<i64>(conn)
        .optional()?;
    found.map(|_| ()).ok_or(StorageError::not_found("Property", id))
}

pub struct PgStorage {
    pool: PgPool,
    policy: MarketPolicy,
}

impl PgStorage {
    pub fn new(pool: PgPool, policy: MarketPolicy) -> Self {
        Self { pool, policy }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut PgConnection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conn = self.pool.get().map_err(|e| {
            log::error!("Failed to check out a database connection: {}", e);
            StorageError::Backend(e.to_string())
        })?;
        f(&mut conn)
    }
}

impl Storage for PgStorage {
    fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        self.with_conn(|conn| {
            let row = users::table
                .find(id)
                .select(UserRow::as_select())
                .first(conn)
                .optional()?;
            convert_opt(row)
        })
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        self.with_conn(|conn| {
            let row = users::table
                .filter(users::username.eq(username))
                .select(UserRow::as_select())
                .first(conn)
                .optional()?;
            convert_opt(row)
        })
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.with_conn(|conn| {
            let row = users::table
                .filter(users::email.eq(email))
                .select(UserRow::as_select())
                .first(conn)
                .optional()?;
            convert_opt(row)
        })
    }

    fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        // The unique indexes settle races; the lookups give the precise error.
        let created: User = self.with_conn(|conn| {
            conn.transaction(|conn| {
                let taken = users::table
                    .filter(users::username.eq(&user.username))
                    .select(users::id)
                    .first::<i64>(conn)
                    .optional()?;
                if taken.is_some() {
                    return Err(StorageError::DuplicateUsername);
                }
                let taken = users::table
                    .filter(users::email.eq(&user.email))
                    .select(users::id)
                    .first::<i64>(conn)
                    .optional()?;
                if taken.is_some() {
                    return Err(StorageError::DuplicateEmail);
                }

                let row = diesel::insert_into(users::table)
                    .values(NewUserRow {
                        username: &user.username,
                        password: &user.password,
                        first_name: user.first_name.as_deref(),
                        last_name: user.last_name.as_deref(),
                        email: &user.email,
                        profile_image: user.profile_image.as_deref(),
                        role: user.role.as_str(),
                        is_investor: user.is_investor,
                        is_homebuyer: user.is_homebuyer,
                        wallet_balance: DEFAULT_WALLET_BALANCE.hundredths(),
                    })
                    .returning(UserRow::as_returning())
                    .get_result(conn)?;
                User::try_from(row)
            })
        })?;
        log::info!("Created user {} ({})", created.id, created.username);
        Ok(created)
    }

    fn deposit(&self, user_id: i64, amount: Money) -> Result<User, StorageError> {
        let updated: User = self.with_conn(|conn| {
            conn.transaction(|conn| {
                let user: User = users::table
                    .find(user_id)
                    .select(UserRow::as_select())
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or(StorageError::not_found("User", user_id))?
                    .try_into()?;
                let balance = accounting::credit(user.wallet_balance, amount)?;
                let row: UserRow = diesel::update(users::table.find(user_id))
                    .set(users::wallet_balance.eq(balance.hundredths()))
                    .returning(UserRow::as_returning())
                    .get_result(conn)?;
                User::try_from(row)
            })
        })?;
        log::info!("Credited {} to wallet of user {}", amount, user_id);
        Ok(updated)
    }

    fn get_property(&self, id: i64) -> Result<Option<Property>, StorageError> {
        self.with_conn(|conn| {
            let row = properties::table
                .find(id)
                .select(PropertyRow::as_select())
                .first(conn)
                .optional()?;
            convert_opt(row)
        })
    }

    fn list_properties(&self) -> Result<Vec<Property>, StorageError> {
        self.with_conn(|conn| {
            let rows = properties::table
                .order(properties::id)
                .select(PropertyRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn list_properties_by_status(&self, status: PropertyStatus) -> Result<Vec<Property>, StorageError> {
        self.with_conn(|conn| {
            let rows = properties::table
                .filter(properties::status.eq(status.as_str()))
                .order(properties::id)
                .select(PropertyRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn create_property(&self, property: NewProperty) -> Result<Property, StorageError> {
        let created: Property = self.with_conn(|conn| {
            if let Some(developer_id) = property.developer_id {
                user_exists(conn, developer_id)?;
            }
            let row = diesel::insert_into(properties::table)
                .values(NewPropertyRow {
                    title: &property.title,
                    address: &property.address,
                    city: &property.city,
                    state: &property.state,
                    zip_code: &property.zip_code,
                    price: property.price.hundredths(),
                    price_per_sqft: property.price_per_sqft.map(Money::hundredths),
                    bedrooms: property.bedrooms,
                    bathrooms: property.bathrooms,
                    square_feet: property.square_feet,
                    description: property.description.as_deref(),
                    property_type: property.property_type.as_str(),
                    image_url: property.image_url.as_deref(),
                    available_tokens: property.available_tokens.hundredths(),
                    minimum_investment: property.minimum_investment.hundredths(),
                    status: property.status.as_str(),
                    developer_id: property.developer_id,
                })
                .returning(PropertyRow::as_returning())
                .get_result(conn)?;
            Property::try_from(row)
        })?;
        log::info!("Created property {} ({})", created.id, created.title);
        Ok(created)
    }

    fn update_property_status(&self, id: i64, status: PropertyStatus) -> Result<Property, StorageError> {
        let updated: Property = self.with_conn(|conn| {
            let row = diesel::update(properties::table.find(id))
                .set(properties::status.eq(status.as_str()))
                .returning(PropertyRow::as_returning())
                .get_result(conn)
                .optional()?;
            convert_opt(row)?.ok_or(StorageError::not_found("Property", id))
        })?;
        log::info!("Property {} is now {}", id, status);
        Ok(updated)
    }

    fn get_investment(&self, id: i64) -> Result<Option<Investment>, StorageError> {
        self.with_conn(|conn| {
            let row = investments::table
                .find(id)
                .select(InvestmentRow::as_select())
                .first(conn)
                .optional()?;
            convert_opt(row)
        })
    }

    fn list_investments_by_user(&self, user_id: i64) -> Result<Vec<Investment>, StorageError> {
        self.with_conn(|conn| {
            let rows = investments::table
                .filter(investments::user_id.eq(user_id))
                .order(investments::id)
                .select(InvestmentRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn list_investments_by_property(&self, property_id: i64) -> Result<Vec<Investment>, StorageError> {
        self.with_conn(|conn| {
            let rows = investments::table
                .filter(investments::property_id.eq(property_id))
                .order(investments::id)
                .select(InvestmentRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn create_investment(&self, investment: NewInvestment) -> Result<Investment, StorageError> {
        let policy = self.policy;
        let (created, remaining) = self.with_conn(|conn| {
            conn.transaction(|conn| {
                let property: Property = properties::table
                    .find(investment.property_id)
                    .select(PropertyRow::as_select())
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or(StorageError::not_found("Property", investment.property_id))?
                    .try_into()?;

                let user_query = users::table
                    .find(investment.user_id)
                    .select(UserRow::as_select());
                let user_row = if policy.debit_wallets {
                    user_query.for_update().first(conn).optional()?
                } else {
                    user_query.first(conn).optional()?
                };
                let user: User = user_row
                    .ok_or(StorageError::not_found("User", investment.user_id))?
                    .try_into()?;

                let remaining = accounting::admit_investment(&property, &investment, policy.amount)?;
                if policy.debit_wallets {
                    let balance = accounting::debit(user.wallet_balance, investment.amount)?;
                    diesel::update(users::table.find(user.id))
                        .set(users::wallet_balance.eq(balance.hundredths()))
                        .execute(conn)?;
                }
                diesel::update(properties::table.find(property.id))
                    .set(properties::available_tokens.eq(remaining.hundredths()))
                    .execute(conn)?;

                let row = diesel::insert_into(investments::table)
                    .values(NewInvestmentRow {
                        user_id: investment.user_id,
                        property_id: investment.property_id,
                        percentage: investment.percentage.hundredths(),
                        amount: investment.amount.hundredths(),
                        is_occupier: investment.is_occupier,
                    })
                    .returning(InvestmentRow::as_returning())
                    .get_result(conn)?;
                Ok((Investment::try_from(row)?, remaining))
            })
        })?;
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
        self.with_conn(|conn| {
            let row = token_transactions::table
                .find(id)
                .select(TokenTransactionRow::as_select())
                .first(conn)
                .optional()?;
            convert_opt(row)
        })
    }

    fn list_token_transactions_by_user(&self, user_id: i64) -> Result<Vec<TokenTransaction>, StorageError> {
        self.with_conn(|conn| {
            let rows = token_transactions::table
                .filter(
                    token_transactions::seller_id
                        .eq(user_id)
                        .or(token_transactions::buyer_id.eq(user_id)),
                )
                .order(token_transactions::id)
                .select(TokenTransactionRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn list_token_transactions_by_property(
        &self,
        property_id: i64,
    ) -> Result<Vec<TokenTransaction>, StorageError> {
        self.with_conn(|conn| {
            let rows = token_transactions::table
                .filter(token_transactions::property_id.eq(property_id))
                .order(token_transactions::id)
                .select(TokenTransactionRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn list_open_listings(&self) -> Result<Vec<TokenTransaction>, StorageError> {
        self.with_conn(|conn| {
            let rows = token_transactions::table
                .filter(token_transactions::status.eq(TransactionStatus::Pending.as_str()))
                .filter(token_transactions::seller_id.is_not_null())
                .filter(token_transactions::buyer_id.is_null())
                .order(token_transactions::id)
                .select(TokenTransactionRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn create_token_transaction(
        &self,
        transaction: NewTokenTransaction,
    ) -> Result<TokenTransaction, StorageError> {
        let created: TokenTransaction = self.with_conn(|conn| {
            property_exists(conn, transaction.property_id)?;
            for user_id in [transaction.seller_id, transaction.buyer_id].into_iter().flatten() {
                user_exists(conn, user_id)?;
            }
            let row = diesel::insert_into(token_transactions::table)
                .values(NewTokenTransactionRow {
                    property_id: transaction.property_id,
                    seller_id: transaction.seller_id,
                    buyer_id: transaction.buyer_id,
                    percentage: transaction.percentage.hundredths(),
                    amount: transaction.amount.hundredths(),
                    status: TransactionStatus::Pending.as_str(),
                })
                .returning(TokenTransactionRow::as_returning())
                .get_result(conn)?;
            TokenTransaction::try_from(row)
        })?;
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
        let policy = self.policy;
        let next: TokenTransaction = self.with_conn(|conn| {
            conn.transaction(|conn| {
                let current: TokenTransaction = token_transactions::table
                    .find(id)
                    .select(TokenTransactionRow::as_select())
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or(StorageError::not_found("Token transaction", id))?
                    .try_into()?;
                let next = transaction::apply(&current, change, Utc::now())?;

                if next.status == TransactionStatus::Completed {
                    let buyer_id = next.buyer_id.ok_or(StorageError::MissingBuyer)?;
                    let party_ids: Vec<i64> = [Some(buyer_id), next.seller_id].into_iter().flatten().collect();
                    // Locking the parties serializes completions that draw on
                    // the same seller's holding.
                    let parties: Vec<User> = convert(
                        users::table
                            .filter(users::id.eq_any(party_ids))
                            .order(users::id)
                            .select(UserRow::as_select())
                            .for_update()
                            .load(conn)?,
                    )?;
                    let party = |user_id: i64| {
                        parties
                            .iter()
                            .find(|u| u.id == user_id)
                            .ok_or(StorageError::not_found("User", user_id))
                    };
                    let buyer = party(buyer_id)?;

                    if let Some(seller_id) = next.seller_id {
                        let invested: Vec<Investment> = convert(
                            investments::table
                                .filter(investments::user_id.eq(seller_id))
                                .filter(investments::property_id.eq(next.property_id))
                                .select(InvestmentRow::as_select())
                                .load(conn)?,
                        )?;
                        let traded: Vec<TokenTransaction> = convert(
                            token_transactions::table
                                .filter(token_transactions::property_id.eq(next.property_id))
                                .filter(token_transactions::status.eq(TransactionStatus::Completed.as_str()))
                                .filter(
                                    token_transactions::seller_id
                                        .eq(seller_id)
                                        .or(token_transactions::buyer_id.eq(seller_id)),
                                )
                                .select(TokenTransactionRow::as_select())
                                .load(conn)?,
                        )?;
                        let held = accounting::holding(seller_id, next.property_id, &invested, &traded);
                        accounting::ensure_seller_holds(held, &next)?;
                    }

                    if policy.debit_wallets {
                        let buyer_balance = accounting::debit(buyer.wallet_balance, next.amount)?;
                        diesel::update(users::table.find(buyer_id))
                            .set(users::wallet_balance.eq(buyer_balance.hundredths()))
                            .execute(conn)?;
                        if let Some(seller_id) = next.seller_id {
                            let seller_balance = accounting::credit(party(seller_id)?.wallet_balance, next.amount)?;
                            diesel::update(users::table.find(seller_id))
                                .set(users::wallet_balance.eq(seller_balance.hundredths()))
                                .execute(conn)?;
                        }
                    }
                }

                diesel::update(token_transactions::table.find(id))
                    .set((
                        token_transactions::status.eq(next.status.as_str()),
                        token_transactions::buyer_id.eq(next.buyer_id),
                        token_transactions::completed_at.eq(next.completed_at),
                    ))
                    .execute(conn)?;
                Ok(next)
            })
        })?;
        log::info!("Token transaction {} is now {}", id, next.status);
        Ok(next)
    }

    fn get_consultation(&self, id: i64) -> Result<Option<Consultation>, StorageError> {
        self.with_conn(|conn| {
            let row = consultations::table
                .find(id)
                .select(ConsultationRow::as_select())
                .first(conn)
                .optional()?;
            convert_opt(row)
        })
    }

    fn list_consultations_by_user(&self, user_id: i64) -> Result<Vec<Consultation>, StorageError> {
        self.with_conn(|conn| {
            let rows = consultations::table
                .filter(consultations::user_id.eq(user_id))
                .order(consultations::scheduled_date)
                .select(ConsultationRow::as_select())
                .load(conn)?;
            convert(rows)
        })
    }

    fn create_consultation(&self, consultation: NewConsultation) -> Result<Consultation, StorageError> {
        let created: Consultation = self.with_conn(|conn| {
            user_exists(conn, consultation.user_id)?;
            property_exists(conn, consultation.property_id)?;
            let row = diesel::insert_into(consultations::table)
                .values(NewConsultationRow {
                    user_id: consultation.user_id,
                    property_id: consultation.property_id,
                    consultation_type: consultation.consultation_type.as_str(),
                    notes: consultation.notes.as_deref(),
                    status: ConsultationStatus::Scheduled.as_str(),
                    scheduled_date: consultation.scheduled_date,
                })
                .returning(ConsultationRow::as_returning())
                .get_result(conn)?;
            Consultation::try_from(row)
        })?;
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
        let updated: Consultation = self.with_conn(|conn| {
            conn.transaction(|conn| {
                let current: String = consultations::table
                    .find(id)
                    .select(consultations::status)
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or(StorageError::not_found("Consultation", id))?;
                let next = transaction::advance_consultation(current.parse()?, status)?;
                let row = diesel::update(consultations::table.find(id))
                    .set(consultations::status.eq(next.as_str()))
                    .returning(ConsultationRow::as_returning())
                    .get_result(conn)?;
                Consultation::try_from(row)
            })
        })?;
        log::info!("Consultation {} is now {}", id, status);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{PropertyType, UserRole};

    // Needs a migrated database:
    // `DATABASE_URL=... cargo test postgres -- --ignored`
    fn store() -> PgStorage {
        dotenv::dotenv().ok();
        let url = std::env::var("DATABASE_URL").unwrap();
        PgStorage::new(db::establish_pool(&url, 2).unwrap(), MarketPolicy::default())
    }

    #[test]
    #[ignore]
    fn postgres_investment_decrements_tokens() {
        let store = store();
        let suffix = Utc::now().timestamp_nanos_opt().unwrap();
        let user = store
            .create_user(NewUser {
                username: format!("pg-investor-{suffix}"),
                password: "hashed".into(),
                email: format!("pg-{suffix}@example.com"),
                first_name: None,
                last_name: None,
                profile_image: None,
                role: UserRole::Investor,
                is_investor: true,
                is_homebuyer: false,
            })
            .unwrap();
        let property = store
            .create_property(NewProperty {
                title: "Suburban Family Home".into(),
                address: "456 Oak Ave".into(),
                city: "Austin".into(),
                state: "TX".into(),
                zip_code: "78701".into(),
                price: Money::from_whole(450_000),
                price_per_sqft: None,
                bedrooms: 4,
                bathrooms: 2.5,
                square_feet: 2_000,
                description: None,
                property_type: PropertyType::House,
                image_url: None,
                available_tokens: Percentage::from_whole(40),
                minimum_investment: Percentage::from_whole(10),
                status: PropertyStatus::Active,
                developer_id: None,
            })
            .unwrap();

        store
            .create_investment(NewInvestment {
                user_id: user.id,
                property_id: property.id,
                percentage: Percentage::from_whole(10),
                amount: Money::from_whole(45_000),
                is_occupier: false,
            })
            .unwrap();
        let err = store
            .create_investment(NewInvestment {
                user_id: user.id,
                property_id: property.id,
                percentage: Percentage::from_whole(31),
                amount: Money::from_whole(139_500),
                is_occupier: false,
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::InsufficientTokens { .. }));

        let property = store.get_property(property.id).unwrap().unwrap();
        assert_eq!(property.available_tokens, Percentage::from_whole(30));
    }
}
