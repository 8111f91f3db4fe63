use bcrypt::{DEFAULT_COST, hash};
use chrono::Utc;
use sqlx::MySqlPool;

use crate::models::{Role, keywords_to_json};

struct SeedUser {
    id: &'static str,
    username: &'static str,
    password: &'static str,
    role: Role,
}

const USERS: &[SeedUser] = &[
    SeedUser {
        id: "seed_admin",
        username: "admin",
        password: "admin123",
        role: Role::Admin,
    },
    SeedUser {
        id: "seed_demo",
        username: "demo",
        password: "demo123",
        role: Role::User,
    },
];

const CATEGORIES: &[(&str, &str, &str)] = &[
    ("cat_recyclable", "可回收物", "纸张、塑料、金属、玻璃等"),
    ("cat_kitchen", "厨余垃圾", "剩饭剩菜、果皮、茶渣等"),
    ("cat_hazardous", "有害垃圾", "电池、灯管、过期药品等"),
    ("cat_other", "其他垃圾", "难以归类的生活垃圾"),
];

const ITEMS: &[(&str, &str, &str, &[&str])] = &[
    ("it_bottle", "塑料瓶", "cat_recyclable", &["瓶子", "矿泉水", "饮料瓶"]),
    ("it_battery", "电池", "cat_hazardous", &["干电池", "充电电池"]),
];

/// Fills empty tables with demo accounts and reference data. Tables that
/// already hold rows are left alone, so restarts are no-ops.
pub async fn seed_demo_data(pool: &MySqlPool) -> anyhow::Result<()> {
    let now = Utc::now();

    if table_is_empty(pool, "users").await? {
        for user in USERS {
            let password_hash = hash(user.password, DEFAULT_COST)?;
            sqlx::query(
                "INSERT INTO users (id, username, password_hash, role, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user.id)
            .bind(user.username)
            .bind(password_hash)
            .bind(user.role.as_str())
            .bind(now)
            .execute(pool)
            .await?;
        }
        tracing::info!(count = USERS.len(), "seeded demo users");
    }

    if table_is_empty(pool, "categories").await? {
        for (id, name, description) in CATEGORIES {
            sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES (?, ?, ?, ?)")
                .bind(*id)
                .bind(*name)
                .bind(*description)
                .bind(now)
                .execute(pool)
                .await?;
        }
        tracing::info!(count = CATEGORIES.len(), "seeded categories");
    }

    if table_is_empty(pool, "items").await? {
        for (id, name, category_id, keywords) in ITEMS {
            let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
            sqlx::query(
                "INSERT IGNORE INTO items (id, name, category_id, keywords_json, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(*id)
            .bind(*name)
            .bind(*category_id)
            .bind(keywords_to_json(&keywords))
            .bind(now)
            .execute(pool)
            .await?;
        }
    }

    if table_is_empty(pool, "notices").await? {
        sqlx::query(
            "INSERT INTO notices (id, title, content, created_by, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind("notice_demo_1")
        .bind("欢迎使用垃圾分类平台")
        .bind("此为示例公告（来自 MySQL 种子数据）。")
        .bind("admin")
        .bind(now)
        .execute(pool)
        .await?;
    }

    if table_is_empty(pool, "records").await? {
        // the referenced user and category may have been removed since first boot
        sqlx::query(
            r#"INSERT INTO records (id, user_id, item_name, category_id, weight_kg, location, created_at)
               SELECT ?, u.id, ?, c.id, ?, ?, ?
               FROM users u JOIN categories c ON c.id = ?
               WHERE u.id = ?"#,
        )
        .bind("record_demo_1")
        .bind("塑料瓶")
        .bind(0.2_f64)
        .bind("示例投放点")
        .bind(now)
        .bind("cat_recyclable")
        .bind("seed_admin")
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn table_is_empty(pool: &MySqlPool, table: &'static str) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count == 0)
}
