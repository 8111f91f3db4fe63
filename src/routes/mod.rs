pub mod auth;
pub mod categories;
pub mod comments;
pub mod health;
pub mod items;
pub mod notices;
pub mod records;
pub mod stats;
pub mod users;

pub use auth::auth_routes;
pub use categories::categories_routes;
pub use comments::comments_routes;
pub use health::health_routes;
pub use items::items_routes;
pub use notices::notices_routes;
pub use records::records_routes;
pub use stats::stats_routes;
pub use users::users_routes;
