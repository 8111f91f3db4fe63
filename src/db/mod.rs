pub mod migrations;
pub mod seed;

use sqlx::{MySql, MySqlPool, QueryBuilder, mysql::MySqlPoolOptions};

use crate::{config::AppConfig, models::Role};

pub async fn init_db(config: &AppConfig) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    migrations::run(&pool).await?;

    if config.seed_demo_data {
        seed::seed_demo_data(&pool).await?;
    }

    if let Some(admin_username) = &config.admin_username {
        let result = sqlx::query("UPDATE users SET role = ? WHERE username = ?")
            .bind(Role::Admin.as_str())
            .bind(admin_username)
            .execute(&pool)
            .await?;
        tracing::info!(
            username = %admin_username,
            promoted = result.rows_affected() > 0,
            "admin promotion checked"
        );
    }

    Ok(pool)
}

/// Starts the next filter clause of a dynamically built query.
pub fn push_condition(query_builder: &mut QueryBuilder<'_, MySql>, has_where: &mut bool) {
    if *has_where {
        query_builder.push(" AND ");
    } else {
        query_builder.push(" WHERE ");
        *has_where = true;
    }
}
