use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Frozen string-to-code mapping for one categorical feature.
///
/// Codes follow the sorted order of the distinct values seen at fit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    /// Feature name, used in error reports
    field: String,

    /// Vocabulary mapping (value -> code)
    codes: BTreeMap<String, usize>,
}

impl CategoryEncoder {
    /// Fit an encoder over the observed values
    pub fn fit<'a, I>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code))
            .collect();

        Self {
            field: field.into(),
            codes,
        }
    }

    /// Map a value to its code, failing for values not seen during fit
    pub fn transform(&self, value: &str) -> Result<usize> {
        self.codes
            .get(value)
            .copied()
            .ok_or_else(|| AppError::UnknownCategory {
                field: self.field.clone(),
                value: value.to_string(),
            })
    }

    /// Code reserved for unseen values under the sentinel policy
    pub fn sentinel_code(&self) -> usize {
        self.codes.len()
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Fitted values in code order
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }
}
