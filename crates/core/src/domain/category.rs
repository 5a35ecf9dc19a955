use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::trip::normalize_text;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

impl NewCategory {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None }
    }

    pub fn validate(self) -> Result<NewCategory, DomainError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::MissingField { field: "name" });
        }
        Ok(NewCategory { name, description: normalize_text(self.description) })
    }
}

/// Rename or re-describe a category. An empty description clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl CategoryPatch {
    pub fn validate(self) -> Result<CategoryPatch, DomainError> {
        if self.name.is_none() && self.description.is_none() {
            return Err(DomainError::EmptyPatch);
        }
        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(DomainError::MissingField { field: "name" });
            }
            other => other.map(|name| name.trim().to_string()),
        };
        Ok(CategoryPatch { name, description: self.description.map(|text| text.trim().to_string()) })
    }
}

#[cfg(test)]
mod tests {
    use super::CategoryPatch;
    use crate::errors::DomainError;

    #[test]
    fn patch_needs_a_field_and_a_real_name() {
        assert_eq!(CategoryPatch::default().validate(), Err(DomainError::EmptyPatch));

        let blank = CategoryPatch { name: Some("   ".to_string()), description: None };
        assert_eq!(blank.validate(), Err(DomainError::MissingField { field: "name" }));

        let patch = CategoryPatch { name: Some(" Meals ".to_string()), description: Some(String::new()) }
            .validate()
            .expect("valid patch");
        assert_eq!(patch.name.as_deref(), Some("Meals"));
        assert_eq!(patch.description.as_deref(), Some(""));
    }
}
