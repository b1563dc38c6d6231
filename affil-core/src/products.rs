use serde::{Deserialize, Serialize};

/// Product category as reported by the catalog. Pharmaceutical products are
/// excluded from the affiliate program regardless of any other flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Cosmetics,
    Health,
    General,
    Pharmaceutical,
}

impl ProductCategory {
    pub fn partner_eligible(&self) -> bool {
        !matches!(self, ProductCategory::Pharmaceutical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Cosmetics => "cosmetics",
            ProductCategory::Health => "health",
            ProductCategory::General => "general",
            ProductCategory::Pharmaceutical => "pharmaceutical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cosmetics" => Some(ProductCategory::Cosmetics),
            "health" => Some(ProductCategory::Health),
            "general" => Some(ProductCategory::General),
            "pharmaceutical" => Some(ProductCategory::Pharmaceutical),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pharmaceutical_is_never_eligible() {
        assert!(!ProductCategory::Pharmaceutical.partner_eligible());
        assert!(ProductCategory::Cosmetics.partner_eligible());
        assert!(ProductCategory::Health.partner_eligible());
        assert!(ProductCategory::General.partner_eligible());
    }

    #[test]
    fn parse_round_trips() {
        for cat in [
            ProductCategory::Cosmetics,
            ProductCategory::Health,
            ProductCategory::General,
            ProductCategory::Pharmaceutical,
        ] {
            assert_eq!(ProductCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(ProductCategory::parse("furniture"), None);
    }
}
