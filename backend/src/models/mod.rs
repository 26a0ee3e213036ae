use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod units;

pub use units::{Money, Percentage};

/// Balance credited to every account at registration.
pub const DEFAULT_WALLET_BALANCE: Money = Money::from_whole(10_000);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed set of values stored as text, both in JSON and in the database.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(UserRole {
    Investor => "investor",
    Developer => "developer",
    Admin => "admin",
});

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Investor
    }
}

text_enum!(PropertyType {
    Condo => "condo",
    House => "house",
    Townhouse => "townhouse",
    MultiFamily => "multi-family",
});

text_enum!(PropertyStatus {
    Active => "active",
    Pending => "pending",
    Sold => "sold",
});

impl Default for PropertyStatus {
    fn default() -> Self {
        PropertyStatus::Active
    }
}

text_enum!(
    /// State of a secondary-market token listing.
    TransactionStatus {
        Pending => "pending",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

text_enum!(ConsultationType {
    Homebuyer => "homebuyer",
    Investor => "investor",
});

text_enum!(ConsultationStatus {
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl Default for ConsultationStatus {
    fn default() -> Self {
        ConsultationStatus::Scheduled
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    /// PHC-formatted password hash. Never leaves the process.
    #[serde(skip_serializing)]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub profile_image: Option<String>,
    pub role: UserRole,
    pub is_investor: bool,
    pub is_homebuyer: bool,
    pub wallet_balance: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub is_investor: bool,
    #[serde(default)]
    pub is_homebuyer: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: i64,
    pub title: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub price: Money,
    pub price_per_sqft: Option<Money>,
    pub bedrooms: i32,
    pub bathrooms: f64,
    pub square_feet: i32,
    pub description: Option<String>,
    pub property_type: PropertyType,
    pub image_url: Option<String>,
    /// Share still open to investors.
    pub available_tokens: Percentage,
    /// Smallest share a single investment may acquire.
    pub minimum_investment: Percentage,
    pub status: PropertyStatus,
    pub developer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProperty {
    pub title: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub price: Money,
    #[serde(default)]
    pub price_per_sqft: Option<Money>,
    pub bedrooms: i32,
    pub bathrooms: f64,
    pub square_feet: i32,
    #[serde(default)]
    pub description: Option<String>,
    pub property_type: PropertyType,
    #[serde(default)]
    pub image_url: Option<String>,
    pub available_tokens: Percentage,
    pub minimum_investment: Percentage,
    #[serde(default)]
    pub status: PropertyStatus,
    #[serde(default)]
    pub developer_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: i64,
    pub user_id: i64,
    pub property_id: i64,
    pub percentage: Percentage,
    pub amount: Money,
    pub investment_date: DateTime<Utc>,
    pub is_occupier: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvestment {
    pub user_id: i64,
    pub property_id: i64,
    pub percentage: Percentage,
    pub amount: Money,
    #[serde(default)]
    pub is_occupier: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransaction {
    pub id: i64,
    pub property_id: i64,
    pub seller_id: Option<i64>,
    pub buyer_id: Option<i64>,
    pub percentage: Percentage,
    pub amount: Money,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTokenTransaction {
    pub property_id: i64,
    #[serde(default)]
    pub seller_id: Option<i64>,
    #[serde(default)]
    pub buyer_id: Option<i64>,
    pub percentage: Percentage,
    pub amount: Money,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: i64,
    pub user_id: i64,
    pub property_id: i64,
    #[serde(rename = "type")]
    pub consultation_type: ConsultationType,
    pub notes: Option<String>,
    pub status: ConsultationStatus,
    pub scheduled_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConsultation {
    pub user_id: i64,
    pub property_id: i64,
    #[serde(rename = "type")]
    pub consultation_type: ConsultationType,
    #[serde(default)]
    pub notes: Option<String>,
    pub scheduled_date: DateTime<Utc>,
}

/// Per-field validation messages, rendered as the `errors` object of a 400.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    fn require(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    #[cfg(test)]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn is_share(p: Percentage) -> bool {
    p.is_positive() && p <= Percentage::FULL
}

fn not_blank(s: &str) -> bool {
    !s.trim().is_empty()
}

impl NewUser {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        let name_len = self.username.trim().chars().count();
        errors.require(
            (3..=64).contains(&name_len),
            "username",
            "must be between 3 and 64 characters",
        );
        errors.require(
            self.password.chars().count() >= 6,
            "password",
            "must be at least 6 characters",
        );
        let email_ok = match self.email.trim().split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.'),
            None => false,
        };
        errors.require(email_ok, "email", "must be a valid email address");
        errors.into_result()
    }
}

impl NewProperty {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        errors.require(not_blank(&self.title), "title", "is required");
        errors.require(not_blank(&self.address), "address", "is required");
        errors.require(not_blank(&self.city), "city", "is required");
        errors.require(not_blank(&self.state), "state", "is required");
        errors.require(not_blank(&self.zip_code), "zipCode", "is required");
        errors.require(self.price.is_positive(), "price", "must be greater than 0");
        if let Some(per_sqft) = self.price_per_sqft {
            errors.require(!per_sqft.is_negative(), "pricePerSqft", "must not be negative");
        }
        errors.require(self.bedrooms >= 0, "bedrooms", "must not be negative");
        errors.require(
            self.bathrooms.is_finite() && self.bathrooms >= 0.0,
            "bathrooms",
            "must not be negative",
        );
        errors.require(self.square_feet > 0, "squareFeet", "must be greater than 0");
        errors.require(
            !self.available_tokens.is_negative() && self.available_tokens <= Percentage::FULL,
            "availableTokens",
            "must be between 0 and 100",
        );
        errors.require(
            is_share(self.minimum_investment),
            "minimumInvestment",
            "must be greater than 0 and at most 100",
        );
        errors.into_result()
    }
}

impl NewInvestment {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        errors.require(
            is_share(self.percentage),
            "percentage",
            "must be greater than 0 and at most 100",
        );
        errors.require(self.amount.is_positive(), "amount", "must be greater than 0");
        errors.into_result()
    }
}

impl NewTokenTransaction {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        errors.require(
            is_share(self.percentage),
            "percentage",
            "must be greater than 0 and at most 100",
        );
        errors.require(self.amount.is_positive(), "amount", "must be greater than 0");
        errors.require(
            matches!(self.status, None | Some(TransactionStatus::Pending)),
            "status",
            "new listings must be pending",
        );
        if let (Some(seller), Some(buyer)) = (self.seller_id, self.buyer_id) {
            errors.require(seller != buyer, "buyerId", "must differ from sellerId");
        }
        errors.into_result()
    }
}

impl NewConsultation {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if let Some(notes) = &self.notes {
            errors.require(
                notes.chars().count() <= 2000,
                "notes",
                "must be at most 2000 characters",
            );
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn property_payload() -> serde_json::Value {
        json!({
            "title": "Suburban Family Home",
            "address": "456 Oak Ave",
            "city": "Austin",
            "state": "TX",
            "zipCode": "78701",
            "price": 450000,
            "bedrooms": 4,
            "bathrooms": 2.5,
            "squareFeet": 2000,
            "propertyType": "house",
            "availableTokens": 40,
            "minimumInvestment": 10
        })
    }

    #[test]
    fn property_payload_defaults() {
        let property: NewProperty = serde_json::from_value(property_payload()).unwrap();
        assert_eq!(property.status, PropertyStatus::Active);
        assert_eq!(property.property_type, PropertyType::House);
        assert_eq!(property.available_tokens, Percentage::from_whole(40));
        assert!(property.validate().is_ok());
    }

    #[test]
    fn property_rejects_tokens_over_hundred() {
        let mut payload = property_payload();
        payload["availableTokens"] = json!(120);
        payload["minimumInvestment"] = json!(0);
        let property: NewProperty = serde_json::from_value(payload).unwrap();
        let errors = property.validate().unwrap_err();
        assert!(errors.contains("availableTokens"));
        assert!(errors.contains("minimumInvestment"));
    }

    #[test]
    fn enum_text_round_trip() {
        assert_eq!("multi-family".parse::<PropertyType>().unwrap(), PropertyType::MultiFamily);
        assert_eq!(TransactionStatus::Cancelled.as_str(), "cancelled");
        assert!("archived".parse::<TransactionStatus>().is_err());
        assert_eq!(serde_json::to_value(UserRole::Admin).unwrap(), json!("admin"));
    }

    #[test]
    fn user_never_serializes_password() {
        let user = User {
            id: 1,
            username: "alice".into(),
            password: "$argon2id$v=19$secret".into(),
            first_name: None,
            last_name: None,
            email: "alice@example.com".into(),
            profile_image: None,
            role: UserRole::Investor,
            is_investor: true,
            is_homebuyer: false,
            wallet_balance: DEFAULT_WALLET_BALANCE,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["walletBalance"], json!(10000));
    }

    #[test]
    fn user_validation() {
        let user: NewUser = serde_json::from_value(json!({
            "username": "al",
            "password": "123",
            "email": "nope"
        }))
        .unwrap();
        let errors = user.validate().unwrap_err();
        assert!(errors.contains("username"));
        assert!(errors.contains("password"));
        assert!(errors.contains("email"));
    }

    #[test]
    fn listing_must_start_pending() {
        let listing: NewTokenTransaction = serde_json::from_value(json!({
            "propertyId": 1,
            "sellerId": 2,
            "percentage": 5,
            "amount": 30000,
            "status": "completed"
        }))
        .unwrap();
        assert!(listing.validate().unwrap_err().contains("status"));
    }
}
