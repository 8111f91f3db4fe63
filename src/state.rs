use std::sync::Arc;

use sqlx::MySqlPool;

use crate::{captcha::CaptchaStore, comments::MySqlCommentStore, config::AppConfig};

#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub config: Arc<AppConfig>,
    pub captchas: Arc<CaptchaStore>,
}

impl AppState {
    pub fn new(pool: MySqlPool, config: AppConfig) -> Self {
        let captchas = Arc::new(CaptchaStore::new(config.captcha_ttl));
        Self {
            pool,
            config: Arc::new(config),
            captchas,
        }
    }

    /// Swaps in a captcha store, e.g. one driven by a manual clock.
    pub fn with_captchas(mut self, captchas: Arc<CaptchaStore>) -> Self {
        self.captchas = captchas;
        self
    }

    pub fn comments(&self) -> MySqlCommentStore {
        MySqlCommentStore::new(self.pool.clone())
    }
}
