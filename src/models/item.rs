use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub keywords_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            keywords: parse_keywords_json(&row.keywords_json),
            id: row.id,
            name: row.name,
            category_id: row.category_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuery {
    pub q: Option<String>,
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItem {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub keywords: Option<KeywordsInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItem {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub keywords: Option<KeywordsInput>,
}

/// Keywords arrive either as a JSON array or as the comma separated text of
/// the admin form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeywordsInput {
    List(Vec<String>),
    Text(String),
}

impl KeywordsInput {
    pub fn normalize(self) -> Vec<String> {
        match self {
            Self::List(list) => list,
            Self::Text(text) => text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Stored keywords that fail to parse are treated as empty.
pub fn parse_keywords_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub fn keywords_to_json(keywords: &[String]) -> String {
    serde_json::to_string(keywords).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_keywords_are_split_and_trimmed() {
        let input: CreateItem =
            serde_json::from_str(r#"{"name":"Bottle","categoryId":"c","keywords":"cup, can ,,jar"}"#)
                .unwrap();
        assert_eq!(
            input.keywords.unwrap().normalize(),
            vec!["cup", "can", "jar"]
        );
    }

    #[test]
    fn keyword_arrays_are_kept_as_is() {
        let input: UpdateItem = serde_json::from_str(r#"{"keywords":["a","b"]}"#).unwrap();
        assert_eq!(input.keywords.unwrap().normalize(), vec!["a", "b"]);
    }

    #[test]
    fn stored_keywords_survive_a_round_trip_and_garbage_is_empty() {
        let json = keywords_to_json(&["battery".to_string(), "cell".to_string()]);
        assert_eq!(parse_keywords_json(&json), vec!["battery", "cell"]);
        assert!(parse_keywords_json("not json").is_empty());
        assert!(parse_keywords_json(r#"{"a":1}"#).is_empty());
    }
}
