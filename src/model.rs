//! Record types flowing through the pipeline plus the closed category and
//! currency enumerations.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical product category. `Electronics` is the designated fallback and
/// the only variant that means "no specific signal matched".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Mobile Phones", alias = "mobile_phones")]
    MobilePhones,
    #[serde(rename = "Tablets", alias = "tablets")]
    Tablets,
    #[serde(rename = "Computers & Laptops", alias = "computers_laptops")]
    ComputersLaptops,
    #[serde(rename = "TVs & Monitors", alias = "tvs_monitors")]
    TvsMonitors,
    #[serde(rename = "Audio & Sound", alias = "audio_sound")]
    AudioSound,
    #[serde(rename = "Wearables", alias = "wearables")]
    Wearables,
    #[serde(rename = "Cameras & Photography", alias = "cameras_photography")]
    CamerasPhotography,
    #[serde(rename = "Gaming", alias = "gaming")]
    Gaming,
    #[serde(rename = "Large Home Appliances", alias = "large_home_appliances")]
    LargeHomeAppliances,
    #[serde(rename = "Small Home Appliances", alias = "small_home_appliances")]
    SmallHomeAppliances,
    #[serde(rename = "Kitchen Appliances", alias = "kitchen_appliances")]
    KitchenAppliances,
    #[serde(rename = "Air Conditioners & Cooling", alias = "air_conditioners_cooling")]
    AirConditionersCooling,
    #[serde(rename = "Personal Care", alias = "personal_care")]
    PersonalCare,
    #[serde(rename = "Power & Batteries", alias = "power_batteries")]
    PowerBatteries,
    #[serde(rename = "Networking", alias = "networking")]
    Networking,
    #[serde(rename = "Accessories", alias = "accessories")]
    Accessories,
    #[serde(rename = "Electronics", alias = "electronics")]
    Electronics,
}

impl Category {
    pub const FALLBACK: Category = Category::Electronics;

    pub const ALL: [Category; 17] = [
        Category::MobilePhones,
        Category::Tablets,
        Category::ComputersLaptops,
        Category::TvsMonitors,
        Category::AudioSound,
        Category::Wearables,
        Category::CamerasPhotography,
        Category::Gaming,
        Category::LargeHomeAppliances,
        Category::SmallHomeAppliances,
        Category::KitchenAppliances,
        Category::AirConditionersCooling,
        Category::PersonalCare,
        Category::PowerBatteries,
        Category::Networking,
        Category::Accessories,
        Category::Electronics,
    ];

    /// Display label, also the value persisted in the `category` column.
    pub fn label(&self) -> &'static str {
        match self {
            Category::MobilePhones => "Mobile Phones",
            Category::Tablets => "Tablets",
            Category::ComputersLaptops => "Computers & Laptops",
            Category::TvsMonitors => "TVs & Monitors",
            Category::AudioSound => "Audio & Sound",
            Category::Wearables => "Wearables",
            Category::CamerasPhotography => "Cameras & Photography",
            Category::Gaming => "Gaming",
            Category::LargeHomeAppliances => "Large Home Appliances",
            Category::SmallHomeAppliances => "Small Home Appliances",
            Category::KitchenAppliances => "Kitchen Appliances",
            Category::AirConditionersCooling => "Air Conditioners & Cooling",
            Category::PersonalCare => "Personal Care",
            Category::PowerBatteries => "Power & Batteries",
            Category::Networking => "Networking",
            Category::Accessories => "Accessories",
            Category::Electronics => "Electronics",
        }
    }

    /// snake_case key used in config files and CLI flags.
    pub fn key(&self) -> &'static str {
        match self {
            Category::MobilePhones => "mobile_phones",
            Category::Tablets => "tablets",
            Category::ComputersLaptops => "computers_laptops",
            Category::TvsMonitors => "tvs_monitors",
            Category::AudioSound => "audio_sound",
            Category::Wearables => "wearables",
            Category::CamerasPhotography => "cameras_photography",
            Category::Gaming => "gaming",
            Category::LargeHomeAppliances => "large_home_appliances",
            Category::SmallHomeAppliances => "small_home_appliances",
            Category::KitchenAppliances => "kitchen_appliances",
            Category::AirConditionersCooling => "air_conditioners_cooling",
            Category::PersonalCare => "personal_care",
            Category::PowerBatteries => "power_batteries",
            Category::Networking => "networking",
            Category::Accessories => "accessories",
            Category::Electronics => "electronics",
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Category::FALLBACK
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts the display label or the snake_case key, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(wanted) || c.key().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Currencies the normalizer can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Jod,
    Usd,
    Eur,
    Gbp,
    Sar,
    Aed,
}

impl Currency {
    pub const ALL: [Currency; 6] = [
        Currency::Jod,
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Sar,
        Currency::Aed,
    ];

    /// ISO-4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Jod => "JOD",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Sar => "SAR",
            Currency::Aed => "AED",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown currency {0:?}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCurrency(s.to_string()))
    }
}

/// A product as handed over by a site scraper. Everything except `url` is
/// best-effort; `url` may still be missing when the scraper failed to resolve it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub url: Option<String>,
    pub title: String,
    #[serde(alias = "price")]
    pub price_text: String,
    pub source_hint: Option<String>,
    pub category_hint: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
}

/// The normalized, persisted representation of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub url: String,
    pub title: String,
    pub price_text: String,
    pub price_amount: Option<f64>,
    pub currency: Currency,
    pub source_website: String,
    pub category: Category,
    pub brand: Option<String>,
    pub description: String,
    pub scraped_at: DateTime<Utc>,
    /// Carried on candidates as `scraped_at`; the store keeps the first value.
    pub first_seen_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_labels_and_keys() {
        assert_eq!("TVs & Monitors".parse::<Category>(), Ok(Category::TvsMonitors));
        assert_eq!("tvs_monitors".parse::<Category>(), Ok(Category::TvsMonitors));
        assert_eq!("  mobile phones ".parse::<Category>(), Ok(Category::MobilePhones));
        let err = "Groceries".parse::<Category>().unwrap_err();
        assert_eq!(err.to_string(), "unknown category \"Groceries\"");
        assert_eq!("eur".parse::<Currency>(), Ok(Currency::Eur));
        assert_eq!(
            "XYZ".parse::<Currency>().unwrap_err().to_string(),
            "unknown currency \"XYZ\""
        );
    }

    #[test]
    fn category_serializes_as_label() {
        let json = serde_json::to_string(&Category::AirConditionersCooling).unwrap();
        assert_eq!(json, "\"Air Conditioners & Cooling\"");
        let back: Category = serde_json::from_str("\"personal_care\"").unwrap();
        assert_eq!(back, Category::PersonalCare);
    }

    #[test]
    fn only_electronics_is_fallback() {
        let fallbacks: Vec<_> = Category::ALL.iter().filter(|c| c.is_fallback()).collect();
        assert_eq!(fallbacks, vec![&Category::Electronics]);
    }

    #[test]
    fn raw_record_accepts_legacy_price_field() {
        let raw: RawRecord = serde_json::from_str(
            r#"{"url":"https://leaders.jo/en/product/x/","title":"X","price":"10 JOD"}"#,
        )
        .unwrap();
        assert_eq!(raw.price_text, "10 JOD");
        assert!(raw.brand.is_none());

        let missing: RawRecord = serde_json::from_str(r#"{"title":"no url"}"#).unwrap();
        assert!(missing.url.is_none());
    }
}
