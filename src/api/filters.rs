use serde_json::Value;

use crate::error::{CrudError, Result};
use crate::model::{Entity, FilterKey};

/// Query parameters the list endpoints accept as filters, with their defaults.
///
/// Keys use the filter grammar (`tier_id`, `id__gt`). A `null` default means
/// the filter only applies when the caller sends it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConfig {
    filters: Vec<(String, Value)>,
}

impl FilterConfig {
    pub fn new<I, K>(filters: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut config = Self::default();
        for (key, default) in filters {
            let key = key.into();
            if matches!(default, Value::Array(_) | Value::Object(_)) {
                return Err(CrudError::config(format!(
                    "Invalid default value for '{}': only scalars and null are accepted",
                    key
                )));
            }
            match config.filters.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = default,
                None => config.filters.push((key, default)),
            }
        }
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Configured keys with the column name each one filters on
    pub fn keys(&self) -> impl Iterator<Item = (&str, String)> {
        self.filters
            .iter()
            .map(|(key, _)| (key.as_str(), FilterKey::parse(key).field))
    }

    pub fn default_for(&self, key: &str) -> Option<&Value> {
        self.filters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, default)| default)
    }

    /// Fails on keys that name no column of `entity`
    pub fn check(&self, entity: &Entity) -> Result<()> {
        for (_, field) in self.keys() {
            entity.require_column(&field)?;
        }
        Ok(())
    }
}
