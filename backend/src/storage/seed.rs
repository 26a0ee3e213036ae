use super::{Storage, StorageError};
use crate::models::{Money, NewProperty, Percentage, PropertyStatus, PropertyType};

struct Sample {
    title: &'static str,
    address: &'static str,
    city: &'static str,
    state: &'static str,
    zip_code: &'static str,
    price: i64,
    price_per_sqft: i64,
    bedrooms: i32,
    bathrooms: f64,
    square_feet: i32,
    description: &'static str,
    property_type: PropertyType,
    image_url: &'static str,
    available_tokens: i64,
}

const SAMPLES: [Sample; 3] = [
    Sample {
        title: "Modern Downtown Condo",
        address: "123 Main St",
        city: "San Francisco",
        state: "CA",
        zip_code: "94105",
        price: 600_000,
        price_per_sqft: 1_200,
        bedrooms: 2,
        bathrooms: 2.0,
        square_feet: 1_200,
        description: "Beautiful modern condo in the heart of downtown San Francisco.",
        property_type: PropertyType::Condo,
        image_url: "https://images.unsplash.com/photo-1580587771525-78b9dba3b914",
        available_tokens: 45,
    },
    Sample {
        title: "Suburban Family Home",
        address: "456 Oak Ave",
        city: "Austin",
        state: "TX",
        zip_code: "78701",
        price: 450_000,
        price_per_sqft: 225,
        bedrooms: 4,
        bathrooms: 2.5,
        square_feet: 2_000,
        description: "Spacious family home in a quiet suburban neighborhood.",
        property_type: PropertyType::House,
        image_url: "https://images.unsplash.com/photo-1568605114967-8130f3a36994",
        available_tokens: 40,
    },
    Sample {
        title: "Luxury Beachfront Villa",
        address: "789 Ocean Blvd",
        city: "Miami",
        state: "FL",
        zip_code: "33139",
        price: 1_200_000,
        price_per_sqft: 800,
        bedrooms: 3,
        bathrooms: 3.5,
        square_feet: 1_500,
        description: "Stunning beachfront villa with panoramic ocean views.",
        property_type: PropertyType::House,
        image_url: "https://images.unsplash.com/photo-1512917774080-9991f1c4c750",
        available_tokens: 35,
    },
];

/// Demo listings loaded into a fresh store.
pub fn sample_properties() -> Vec<NewProperty> {
    SAMPLES
        .iter()
        .map(|s| NewProperty {
            title: s.title.into(),
            address: s.address.into(),
            city: s.city.into(),
            state: s.state.into(),
            zip_code: s.zip_code.into(),
            price: Money::from_whole(s.price),
            price_per_sqft: Some(Money::from_whole(s.price_per_sqft)),
            bedrooms: s.bedrooms,
            bathrooms: s.bathrooms,
            square_feet: s.square_feet,
            description: Some(s.description.into()),
            property_type: s.property_type,
            image_url: Some(s.image_url.into()),
            available_tokens: Percentage::from_whole(s.available_tokens),
            minimum_investment: Percentage::from_whole(10),
            status: PropertyStatus::Active,
            developer_id: None,
        })
        .collect()
}

/// Inserts the sample listings unless the store already holds properties.
/// Returns how many were inserted.
pub fn seed(store: &dyn Storage) -> Result<usize, StorageError> {
    if !store.list_properties()?.is_empty() {
        log::info!("Store already has properties, skipping sample data");
        return Ok(0);
    }
    let mut inserted = 0;
    for property in sample_properties() {
        store.create_property(property)?;
        inserted += 1;
    }
    log::info!("Seeded {} sample properties", inserted);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    #[test]
    fn samples_are_valid() {
        for property in sample_properties() {
            assert!(property.validate().is_ok(), "{} failed validation", property.title);
        }
    }

    #[test]
    fn seeding_is_idempotent() {
        let store = MemStorage::default();
        assert_eq!(seed(&store).unwrap(), 3);
        assert_eq!(seed(&store).unwrap(), 0);

        let condo = store.get_property(1).unwrap().unwrap();
        assert_eq!(condo.title, "Modern Downtown Condo");
        assert_eq!(condo.available_tokens, Percentage::from_whole(45));
    }
}
