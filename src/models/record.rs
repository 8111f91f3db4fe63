use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub user_id: String,
    pub item_name: String,
    pub category_id: String,
    pub weight_kg: f64,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecord {
    pub item_name: Option<String>,
    pub category_id: Option<String>,
    pub weight_kg: Option<WeightInput>,
    pub location: Option<String>,
}

/// Forms post the weight either as a number or as the raw text field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WeightInput {
    Number(f64),
    Text(String),
}

impl WeightInput {
    pub fn kilograms(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) if s.trim().is_empty() => 0.0,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}
