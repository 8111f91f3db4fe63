use std::sync::LazyLock;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    routing::{get, post},
};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

use crate::{
    config::AppConfig,
    error::{ApiJson, ApiResult, AppError, ensure_max_chars, is_unique_violation},
    models::{
        AuthResponse, CaptchaResponse, EMAIL_MAX_CHARS, LoginRequest, MeResponse, PHONE_MAX_CHARS,
        RegisterRequest, Role, USERNAME_MAX_CHARS, User, new_id,
    },
    state::AppState,
};

pub const USER_COLUMNS: &str = "id, username, email, phone, password_hash, role, created_at";

const BAD_CREDENTIALS: &str = "Incorrect account or password";

static MOBILE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1[3-9]\d{9}$").expect("mobile number pattern compiles"));

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/captcha", get(captcha))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(get_me))
}

async fn captcha(State(state): State<AppState>) -> Json<CaptchaResponse> {
    let issued = state.captchas.issue();
    Json(CaptchaResponse {
        captcha_id: issued.id,
        captcha_img: issued.image,
    })
}

async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let (Some(username), Some(password)) = (non_blank(input.username), non_empty(input.password))
    else {
        return Err(AppError::bad_request("username and password are required"));
    };
    let email = non_blank(input.email);
    let phone = non_blank(input.phone);
    ensure_max_chars("username", &username, USERNAME_MAX_CHARS)?;
    if let Some(email) = &email {
        ensure_max_chars("email", email, EMAIL_MAX_CHARS)?;
    }
    if let Some(phone) = &phone {
        ensure_max_chars("phone", phone, PHONE_MAX_CHARS)?;
    }

    ensure_unclaimed(&state.pool, "username", &username, "Username already exists").await?;
    if let Some(email) = &email {
        ensure_unclaimed(&state.pool, "email", email, "Email is already registered").await?;
    }
    if let Some(phone) = &phone {
        ensure_unclaimed(&state.pool, "phone", phone, "Phone number is already registered").await?;
    }

    let user = User {
        id: new_id(),
        username,
        email,
        phone,
        password_hash: hash(&password, DEFAULT_COST)?,
        role: Role::User.as_str().to_string(),
        created_at: Utc::now(),
    };

    let inserted = sqlx::query(
        r#"INSERT INTO users (id, username, email, phone, password_hash, role, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.password_hash)
    .bind(&user.role)
    .bind(user.created_at)
    .execute(&state.pool)
    .await;
    match inserted {
        Ok(_) => {}
        // lost a race with a concurrent registration
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::conflict("Account is already registered"));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");

    let token = issue_token(&state.config, &user)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let (Some(account), Some(password), Some(captcha), Some(captcha_id)) = (
        non_blank(input.username),
        non_empty(input.password),
        non_blank(input.captcha),
        non_blank(input.captcha_id),
    ) else {
        return Err(AppError::bad_request(
            "username, password, captcha and captchaId are required",
        ));
    };

    state
        .captchas
        .verify(&captcha_id, &captcha)
        .map_err(|e| AppError::unauthorized(e.to_string()))?;

    let identifier = LoginIdentifier::classify(&account);
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {} = ? LIMIT 1",
        identifier.column()
    ))
    .bind(identifier.value())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized(BAD_CREDENTIALS))?;

    if !verify(&password, &user.password_hash)? {
        return Err(AppError::unauthorized(BAD_CREDENTIALS));
    }

    tracing::debug!(user_id = %user.id, "user logged in");

    let token = issue_token(&state.config, &user)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

async fn get_me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<MeResponse>> {
    let user = extract_current_user(&state, &headers).await?;
    Ok(Json(MeResponse { user: user.into() }))
}

/// How a login account string is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginIdentifier<'a> {
    Email(&'a str),
    Phone(&'a str),
    Username(&'a str),
}

impl<'a> LoginIdentifier<'a> {
    fn classify(account: &'a str) -> Self {
        if account.contains('@') {
            Self::Email(account)
        } else if MOBILE_NUMBER.is_match(account) {
            Self::Phone(account)
        } else {
            Self::Username(account)
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Phone(_) => "phone",
            Self::Username(_) => "username",
        }
    }

    fn value(self) -> &'a str {
        match self {
            Self::Email(v) | Self::Phone(v) | Self::Username(v) => v,
        }
    }
}

async fn ensure_unclaimed(
    pool: &MySqlPool,
    column: &'static str,
    value: &str,
    message: &'static str,
) -> ApiResult<()> {
    let existing: Option<(String,)> =
        sqlx::query_as(&format!("SELECT id FROM users WHERE {column} = ? LIMIT 1"))
            .bind(value)
            .fetch_optional(pool)
            .await?;

    match existing {
        Some(_) => Err(AppError::conflict(message)),
        None => Ok(()),
    }
}

// ============================
// Tokens and request identity
// ============================

pub fn issue_token(config: &AppConfig, user: &User) -> ApiResult<String> {
    let expires_at = Utc::now()
        .checked_add_signed(config.token_ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("token expiry out of range")))?;

    let claims = Claims {
        sub: user.id.clone(),
        role: user.role.clone(),
        exp: expires_at.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("failed to sign token")))
}

fn decode_token(config: &AppConfig, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn find_user_by_id(pool: &MySqlPool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? LIMIT 1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Resolves the bearer token to a user that still exists.
pub async fn extract_current_user(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let token = bearer_token(headers).ok_or_else(|| AppError::unauthorized("Missing token"))?;
    let claims =
        decode_token(&state.config, token).ok_or_else(|| AppError::unauthorized("Invalid token"))?;

    find_user_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid token"))
}

/// Like [`extract_current_user`], but a missing or unusable token means an
/// anonymous caller rather than an error.
pub async fn extract_optional_user(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<User>> {
    let Some(claims) = bearer_token(headers).and_then(|token| decode_token(&state.config, token))
    else {
        return Ok(None);
    };

    Ok(find_user_by_id(&state.pool, &claims.sub).await?)
}

pub async fn extract_admin_user(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let user = extract_current_user(state, headers).await?;
    if !user.is_admin() {
        return Err(AppError::forbidden("Admin access required"));
    }
    Ok(user)
}

pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use rstest::rstest;

    use super::*;

    fn config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("test-secret".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn user() -> User {
        User {
            id: "seed_demo".to_string(),
            username: "demo".to_string(),
            email: None,
            phone: None,
            password_hash: String::new(),
            role: Role::User.as_str().to_string(),
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[case("someone@example.com", "email")]
    #[case("13812345678", "phone")]
    #[case("12812345678", "username")]
    #[case("1381234567", "username")]
    #[case("demo", "username")]
    fn account_kind_picks_the_lookup_column(#[case] account: &str, #[case] column: &str) {
        let identifier = LoginIdentifier::classify(account);
        assert_eq!(identifier.column(), column);
        assert_eq!(identifier.value(), account);
    }

    #[test]
    fn issued_token_names_the_user_and_role() {
        let config = config();
        let token = issue_token(&config, &user()).unwrap();

        let claims = decode_token(&config, &token).unwrap();
        assert_eq!(claims.sub, "seed_demo");
        assert_eq!(claims.role, "user");
        assert!(claims.exp as i64 > Utc::now().timestamp() + 6 * 24 * 3600);
    }

    #[test]
    fn tokens_signed_elsewhere_are_rejected() {
        let mut other = config();
        other.jwt_secret = "another-secret".to_string();
        let token = issue_token(&other, &user()).unwrap();

        assert!(decode_token(&config(), &token).is_none());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut config = config();
        config.token_ttl = TimeDelta::hours(-2);
        let token = issue_token(&config, &user()).unwrap();

        assert!(decode_token(&config, &token).is_none());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Token abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
