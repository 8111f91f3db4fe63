use std::collections::HashSet;

use sqlx::{MySqlConnection, MySqlPool};

const LOCK_NAME: &str = "waste_sort_server.migrations";
const LOCK_TIMEOUT_SECS: i64 = 30;

/// One schema step. Statements run in order; MySQL commits DDL implicitly, so
/// every statement must be safe to re-run if a step is interrupted.
#[derive(Debug)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR(32) PRIMARY KEY,
                username VARCHAR(64) NOT NULL UNIQUE,
                email VARCHAR(128) NULL UNIQUE,
                phone VARCHAR(20) NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(16) NOT NULL DEFAULT 'user',
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#],
    },
    Migration {
        version: 2,
        name: "create_categories_and_items",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id VARCHAR(32) PRIMARY KEY,
                name VARCHAR(64) NOT NULL,
                description TEXT NOT NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id VARCHAR(32) PRIMARY KEY,
                name VARCHAR(128) NOT NULL,
                category_id VARCHAR(32) NOT NULL,
                keywords_json TEXT NOT NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                INDEX idx_items_category_id (category_id),
                CONSTRAINT fk_items_category_id FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
            "#,
        ],
    },
    Migration {
        version: 3,
        name: "create_records",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS records (
                id VARCHAR(32) PRIMARY KEY,
                user_id VARCHAR(32) NOT NULL,
                item_name VARCHAR(128) NOT NULL,
                category_id VARCHAR(32) NOT NULL,
                weight_kg DOUBLE NOT NULL DEFAULT 0,
                location VARCHAR(255) NOT NULL DEFAULT '',
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                INDEX idx_records_user_id_created_at (user_id, created_at),
                CONSTRAINT fk_records_user_id FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                CONSTRAINT fk_records_category_id FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE RESTRICT
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#],
    },
    Migration {
        version: 4,
        name: "create_notices",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS notices (
                id VARCHAR(32) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                type VARCHAR(32) NOT NULL DEFAULT 'policy',
                is_urgent BOOLEAN NOT NULL DEFAULT FALSE,
                created_by VARCHAR(64) NOT NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                INDEX idx_notices_created_at (created_at)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#],
    },
    Migration {
        version: 5,
        name: "create_comments_and_likes",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id VARCHAR(32) PRIMARY KEY,
                user_id VARCHAR(32) NOT NULL,
                content TEXT NOT NULL,
                parent_id VARCHAR(32) NULL,
                post_type VARCHAR(32) NOT NULL,
                post_id VARCHAR(64) NOT NULL,
                like_count BIGINT NOT NULL DEFAULT 0,
                status VARCHAR(16) NOT NULL DEFAULT 'active',
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                INDEX idx_comments_scope_created_at (post_type, post_id, created_at),
                INDEX idx_comments_parent_id (parent_id),
                INDEX idx_comments_user_id (user_id),
                CONSTRAINT fk_comments_user_id FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS comment_likes (
                id VARCHAR(32) PRIMARY KEY,
                comment_id VARCHAR(32) NOT NULL,
                user_id VARCHAR(32) NOT NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                UNIQUE KEY uq_comment_likes_comment_user (comment_id, user_id),
                INDEX idx_comment_likes_user_id (user_id),
                CONSTRAINT fk_comment_likes_comment_id FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE,
                CONSTRAINT fk_comment_likes_user_id FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
            "#,
        ],
    },
];

/// Applies every migration not yet recorded in `schema_migrations`. Concurrent
/// starts serialize on a MySQL named lock held by one pooled connection.
pub async fn run(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;

    let (locked,): (Option<i64>,) = sqlx::query_as("SELECT GET_LOCK(?, ?)")
        .bind(LOCK_NAME)
        .bind(LOCK_TIMEOUT_SECS)
        .fetch_one(&mut *conn)
        .await?;
    if locked != Some(1) {
        return Err(sqlx::Error::Protocol(format!(
            "timed out waiting for migration lock {LOCK_NAME}"
        )));
    }

    let result = apply_pending(&mut conn).await;

    if let Err(e) = sqlx::query("DO RELEASE_LOCK(?)")
        .bind(LOCK_NAME)
        .execute(&mut *conn)
        .await
    {
        tracing::warn!(error = %e, "failed to release migration lock");
    }

    result
}

async fn apply_pending(conn: &mut MySqlConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(128) NOT NULL,
            applied_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(&mut *conn)
    .await?;

    let applied: HashSet<i64> = sqlx::query_as::<_, (i64,)>("SELECT version FROM schema_migrations")
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(version,)| version)
        .collect();

    for migration in pending(MIGRATIONS, &applied) {
        tracing::info!(version = migration.version, name = migration.name, "applying migration");

        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *conn).await?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

fn pending<'a>(
    migrations: &'a [Migration],
    applied: &'a HashSet<i64>,
) -> impl Iterator<Item = &'a Migration> {
    migrations
        .iter()
        .filter(|migration| !applied.contains(&migration.version))
}
