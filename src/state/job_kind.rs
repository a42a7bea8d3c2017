/// Job kind definitions
///
/// The fixed set of recurring crawls. Each kind owns an output directory and
/// a projection of the catalog fields it keeps.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the fixed categories of recurring crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobKind {
    /// Full catalog: every product field
    #[serde(rename = "all")]
    Full,

    /// Price-only: identity plus price and stock fields
    #[serde(rename = "price")]
    Price,

    /// Non-price attributes: identity plus naming, address and image fields
    #[serde(rename = "non-price")]
    NonPrice,
}

const FULL_FIELDS: &[&str] = &[
    "id",
    "category",
    "product_name",
    "product_address",
    "original_price",
    "selling_price",
    "image_url",
    "quantity",
    "out_of_stock",
    "last_updated",
];

const PRICE_FIELDS: &[&str] = &[
    "id",
    "original_price",
    "selling_price",
    "quantity",
    "out_of_stock",
    "last_updated",
];

const NON_PRICE_FIELDS: &[&str] = &[
    "id",
    "category",
    "product_name",
    "product_address",
    "image_url",
    "last_updated",
];

impl JobKind {
    /// All job kinds, in registry order
    pub const ALL: [JobKind; 3] = [JobKind::Full, JobKind::Price, JobKind::NonPrice];

    /// Stable identifier used on the command line, in the database and in payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "all",
            Self::Price => "price",
            Self::NonPrice => "non-price",
        }
    }

    /// Directory (under the output root) holding this kind's JSON artifacts
    pub fn output_dir(&self) -> &'static str {
        match self {
            Self::Full => "result_json",
            Self::Price => "result_price_json",
            Self::NonPrice => "result_non_price_json",
        }
    }

    /// Item fields this kind keeps from a parsed catalog entry
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Full => FULL_FIELDS,
            Self::Price => PRICE_FIELDS,
            Self::NonPrice => NON_PRICE_FIELDS,
        }
    }

    /// Whether runs of this kind may download product images
    pub fn harvests_images(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "full" => Ok(Self::Full),
            "price" => Ok(Self::Price),
            "non-price" | "non_price" | "nonprice" | "other" => Ok(Self::NonPrice),
            other => Err(format!("unknown job kind '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("all".parse::<JobKind>(), Ok(JobKind::Full));
        assert_eq!("FULL".parse::<JobKind>(), Ok(JobKind::Full));
        assert_eq!("price".parse::<JobKind>(), Ok(JobKind::Price));
        assert_eq!("non_price".parse::<JobKind>(), Ok(JobKind::NonPrice));
        assert!("old".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_as_str_roundtrip() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_price_projection_has_no_naming_fields() {
        let fields = JobKind::Price.fields();
        assert!(fields.contains(&"selling_price"));
        assert!(!fields.contains(&"product_name"));
        assert!(!JobKind::NonPrice.fields().contains(&"selling_price"));
    }

    #[test]
    fn test_output_dirs_are_distinct() {
        assert_ne!(JobKind::Full.output_dir(), JobKind::Price.output_dir());
        assert_ne!(JobKind::Price.output_dir(), JobKind::NonPrice.output_dir());
    }
}
