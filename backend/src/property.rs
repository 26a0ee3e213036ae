//! Property search: location, price range and type filters, sorting and
//! paging over a property list. Filters combine with AND.

use serde::Deserialize;
use std::cmp::Reverse;
use std::str::FromStr;

use crate::models::{FieldErrors, Money, Property, PropertyStatus, PropertyType};

pub const DEFAULT_PAGE_SIZE: usize = 9;
pub const MAX_PAGE_SIZE: usize = 100;

/// Inclusive price bounds in whole dollars: `"min-max"` or `"min+"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
    pub min: Money,
    pub max: Option<Money>,
}

impl PriceRange {
    pub fn contains(&self, price: Money) -> bool {
        price >= self.min && self.max.map_or(true, |max| price <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("price range must look like `min-max` or `min+`, got `{0}`")]
pub struct ParseRangeError(String);

impl FromStr for PriceRange {
    type Err = ParseRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRangeError(s.to_string());
        let whole = |part: &str| part.trim().parse::<u32>().map(|v| Money::from_whole(i64::from(v)));
        let s = s.trim();

        if let Some(min) = s.strip_suffix('+') {
            return Ok(PriceRange {
                min: whole(min).map_err(|_| err())?,
                max: None,
            });
        }
        let (min, max) = s.split_once('-').ok_or_else(err)?;
        let (min, max) = (whole(min).map_err(|_| err())?, whole(max).map_err(|_| err())?);
        if min > max {
            return Err(err());
        }
        Ok(PriceRange { min, max: Some(max) })
    }
}

/// Parses an optional range parameter; blank and `any` mean no bound.
pub fn parse_price_range(raw: Option<&str>) -> Result<Option<PriceRange>, ParseRangeError> {
    match raw.map(str::trim) {
        None | Some("") | Some("any") => Ok(None),
        Some(range) => range.parse().map(Some),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortOrder::Newest),
            "price-asc" => Ok(SortOrder::PriceAsc),
            "price-desc" => Ok(SortOrder::PriceDesc),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

/// Raw `GET /api/properties` query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyQuery {
    pub status: Option<String>,
    pub location: Option<String>,
    pub price_range: Option<String>,
    pub property_type: Option<String>,
    pub sort: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    pub status: Option<PropertyStatus>,
    location: Option<String>,
    price: Option<PriceRange>,
    property_type: Option<PropertyType>,
    sort: SortOrder,
    page: Option<Page>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl PropertyQuery {
    pub fn parse(&self) -> Result<PropertyFilter, FieldErrors> {
        let mut errors = FieldErrors::default();
        let mut filter = PropertyFilter {
            location: present(&self.location).map(str::to_lowercase),
            ..PropertyFilter::default()
        };

        if let Some(status) = present(&self.status) {
            match status.parse() {
                Ok(status) => filter.status = Some(status),
                Err(_) => errors.add("status", "must be one of active, pending, sold"),
            }
        }
        match parse_price_range(self.price_range.as_deref()) {
            Ok(range) => filter.price = range,
            Err(e) => errors.add("priceRange", e.to_string()),
        }
        match present(&self.property_type) {
            None | Some("all") => {}
            Some(kind) => match kind.parse() {
                Ok(kind) => filter.property_type = Some(kind),
                Err(_) => errors.add(
                    "propertyType",
                    "must be one of condo, house, townhouse, multi-family",
                ),
            },
        }
        if let Some(sort) = present(&self.sort) {
            match sort.parse() {
                Ok(sort) => filter.sort = sort,
                Err(()) => errors.add("sort", "must be one of newest, price-asc, price-desc"),
            }
        }
        if self.page.is_some() || self.per_page.is_some() {
            let number = self.page.unwrap_or(1);
            let size = self.per_page.unwrap_or(DEFAULT_PAGE_SIZE);
            if number == 0 {
                errors.add("page", "must be at least 1");
            }
            if size == 0 || size > MAX_PAGE_SIZE {
                errors.add("perPage", format!("must be between 1 and {MAX_PAGE_SIZE}"));
            }
            filter.page = Some(Page { number, size });
        }

        if errors.is_empty() {
            Ok(filter)
        } else {
            Err(errors)
        }
    }
}

impl PropertyFilter {
    pub fn matches(&self, property: &Property) -> bool {
        if let Some(status) = self.status {
            if property.status != status {
                return false;
            }
        }
        if let Some(needle) = &self.location {
            let haystack = format!("{} {} {}", property.city, property.state, property.zip_code);
            if !haystack.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(range) = &self.price {
            if !range.contains(property.price) {
                return false;
            }
        }
        if let Some(kind) = self.property_type {
            if property.property_type != kind {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, properties: Vec<Property>) -> Vec<Property> {
        let mut found: Vec<Property> = properties.into_iter().filter(|p| self.matches(p)).collect();
        match self.sort {
            SortOrder::Newest => found.sort_by_key(|p| Reverse((p.created_at, p.id))),
            SortOrder::PriceAsc => found.sort_by_key(|p| (p.price, p.id)),
            SortOrder::PriceDesc => found.sort_by_key(|p| (Reverse(p.price), p.id)),
        }
        match self.page {
            Some(Page { number, size }) => match number.saturating_sub(1).checked_mul(size) {
                Some(offset) => found.into_iter().skip(offset).take(size).collect(),
                None => Vec::new(),
            },
            None => found,
        }
    }
}
