use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_NOTICE_TYPE: &str = "policy";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub notice_type: String,
    pub is_urgent: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotice {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub notice_type: Option<String>,
    pub is_urgent: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotice {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub notice_type: Option<String>,
    pub is_urgent: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_type_travels_as_type() {
        let input: CreateNotice =
            serde_json::from_str(r#"{"title":"Pickup","type":"event","isUrgent":true}"#).unwrap();
        assert_eq!(input.notice_type.as_deref(), Some("event"));
        assert_eq!(input.is_urgent, Some(true));

        let notice = Notice {
            id: "n1".to_string(),
            title: "Pickup".to_string(),
            content: String::new(),
            notice_type: "event".to_string(),
            is_urgent: true,
            created_by: "admin".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(notice).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["isUrgent"], true);
        assert_eq!(json["createdBy"], "admin");
    }
}
