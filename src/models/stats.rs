use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub category_count: i64,
    pub item_count: i64,
    pub record_count: i64,
    pub user_count: i64,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecordCount {
    pub category_id: String,
    pub category_name: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub totals: Totals,
    pub records_by_category: Vec<CategoryRecordCount>,
}
