use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Spending or earning bucket. A category is either expense or income, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub colour: String,
    pub is_income: bool,
}

impl Category {
    pub fn expense(name: impl Into<String>, colour: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            colour: colour.into(),
            is_income: false,
        }
    }

    pub fn income(name: impl Into<String>, colour: impl Into<String>) -> Self {
        Self {
            is_income: true,
            ..Self::expense(name, colour)
        }
    }
}
