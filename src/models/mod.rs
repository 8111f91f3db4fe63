pub mod category;
pub mod comment;
pub mod item;
pub mod notice;
pub mod record;
pub mod stats;
pub mod user;

pub use category::*;
pub use comment::*;
pub use item::*;
pub use notice::*;
pub use record::*;
pub use stats::*;
pub use user::*;

use serde::Serialize;

/// `{ "list": [...] }` envelope used by every collection endpoint.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub list: Vec<T>,
}

/// `{ "item": {...} }` envelope used by resource writes.
#[derive(Debug, Serialize)]
pub struct ItemResponse<T> {
    pub item: T,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
