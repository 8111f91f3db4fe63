use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
};
use bcrypt::{DEFAULT_COST, hash, verify};

use crate::{
    error::{ApiJson, ApiResult, AppError, is_unique_violation},
    models::{
        ChangeOwnPassword, ItemResponse, ListResponse, OkResponse, PASSWORD_MIN_CHARS, PublicUser,
        ResetPassword, Role, USERNAME_MAX_CHARS, USERNAME_MIN_CHARS, UpdateRole, UpdateUsername,
        User,
    },
    routes::auth::{
        USER_COLUMNS, extract_admin_user, extract_current_user, find_user_by_id, non_blank,
    },
    state::AppState,
};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/{id}/username", put(update_username))
        .route("/{id}/password-self", put(change_own_password))
        .route("/{id}/role", put(update_role))
        .route("/{id}/password", put(reset_password))
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ListResponse<PublicUser>>> {
    extract_admin_user(&state, &headers).await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ListResponse {
        list: users.into_iter().map(PublicUser::from).collect(),
    }))
}

async fn update_username(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdateUsername>,
) -> ApiResult<Json<ItemResponse<PublicUser>>> {
    let actor = extract_current_user(&state, &headers).await?;
    if actor.id != id {
        return Err(AppError::forbidden("You can only change your own username"));
    }

    let username = non_blank(input.username)
        .filter(|name| valid_username_length(name))
        .ok_or_else(|| {
            AppError::bad_request(format!(
                "Username must be {USERNAME_MIN_CHARS}-{USERNAME_MAX_CHARS} characters"
            ))
        })?;

    let taken: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ? AND id <> ? LIMIT 1")
            .bind(&username)
            .bind(&id)
            .fetch_optional(&state.pool)
            .await?;
    if taken.is_some() {
        return Err(AppError::conflict("Username already exists"));
    }

    let updated = sqlx::query("UPDATE users SET username = ? WHERE id = ?")
        .bind(&username)
        .bind(&id)
        .execute(&state.pool)
        .await;
    match updated {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::conflict("Username already exists"));
        }
        Err(e) => return Err(e.into()),
    }

    let user = load_user(&state, &id).await?;
    tracing::info!(user_id = %id, username = %user.username, "username changed");
    Ok(Json(ItemResponse { item: user.into() }))
}

async fn change_own_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ChangeOwnPassword>,
) -> ApiResult<Json<OkResponse>> {
    let actor = extract_current_user(&state, &headers).await?;
    if actor.id != id {
        return Err(AppError::forbidden("You can only change your own password"));
    }

    let (Some(old_password), Some(new_password)) = (
        input.old_password.filter(|p| !p.is_empty()),
        input.new_password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::bad_request("oldPassword and newPassword are required"));
    };
    if new_password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(AppError::bad_request(format!(
            "New password must be at least {PASSWORD_MIN_CHARS} characters"
        )));
    }

    if !verify(&old_password, &actor.password_hash)? {
        return Err(AppError::unauthorized("Old password is incorrect"));
    }

    store_password(&state, &id, &new_password).await?;
    tracing::info!(user_id = %id, "password changed");
    Ok(Json(OkResponse::ok()))
}

async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdateRole>,
) -> ApiResult<Json<ItemResponse<PublicUser>>> {
    let admin = extract_admin_user(&state, &headers).await?;

    let role = input
        .role
        .as_deref()
        .and_then(Role::parse)
        .ok_or_else(|| AppError::bad_request("role must be admin or user"))?;

    if admin.id == id && role != Role::Admin {
        return Err(AppError::bad_request("Cannot remove your own admin role"));
    }

    load_user(&state, &id).await?;

    sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(&id)
        .execute(&state.pool)
        .await?;

    let user = load_user(&state, &id).await?;
    tracing::info!(user_id = %id, role = role.as_str(), admin = %admin.id, "role changed");
    Ok(Json(ItemResponse { item: user.into() }))
}

async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ResetPassword>,
) -> ApiResult<Json<OkResponse>> {
    let admin = extract_admin_user(&state, &headers).await?;

    let password = input
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("password is required"))?;

    load_user(&state, &id).await?;
    store_password(&state, &id, &password).await?;

    tracing::info!(user_id = %id, admin = %admin.id, "password reset");
    Ok(Json(OkResponse::ok()))
}

async fn load_user(state: &AppState, id: &str) -> ApiResult<User> {
    find_user_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

async fn store_password(state: &AppState, id: &str, password: &str) -> ApiResult<()> {
    let password_hash = hash(password, DEFAULT_COST)?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(&state.pool)
        .await?;
    Ok(())
}

fn valid_username_length(username: &str) -> bool {
    (USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&username.chars().count())
}
