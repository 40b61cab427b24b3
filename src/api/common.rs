//! Common API utilities and shared types

use serde::{Deserialize, Deserializer};

use crate::models::ListParams;

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for public APIs
pub fn default_per_page() -> u32 {
    10
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Distinguishes a missing field (`None`) from an explicit `null`
/// (`Some(None)`) in JSON request bodies. Use with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        category_id: Option<Option<i64>>,
    }

    #[test]
    fn test_double_option() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.category_id, None);

        let null: Patch = serde_json::from_str(r#"{"category_id": null}"#).unwrap();
        assert_eq!(null.category_id, Some(None));

        let set: Patch = serde_json::from_str(r#"{"category_id": 4}"#).unwrap();
        assert_eq!(set.category_id, Some(Some(4)));
    }
}
