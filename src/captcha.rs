use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{Arc, Mutex, PoisonError},
};

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

const IMAGE_WIDTH: f64 = 120.0;
const IMAGE_HEIGHT: f64 = 40.0;
const BACKGROUND: &str = "#f8f9fa";
const PALETTE: [&str; 5] = ["#3498db", "#2ecc71", "#e74c3c", "#f39c12", "#9b59b6"];

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptchaError {
    #[error("Captcha expired, please refresh it")]
    Expired,
    #[error("Captcha does not match")]
    Mismatch,
}

#[derive(Debug, Clone)]
pub struct IssuedCaptcha {
    pub id: String,
    /// Base64 encoded SVG.
    pub image: String,
}

#[derive(Debug)]
struct Entry {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Login challenges keyed by a random id. Process-local: a deployment with
/// several instances needs sticky sessions or a shared store.
pub struct CaptchaStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl CaptchaStore {
    pub fn new(ttl: TimeDelta) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn issue(&self) -> IssuedCaptcha {
        let mut rng = rand::rng();
        let code = rng.random_range(1000..10000u32).to_string();
        let svg = render_svg(&code, &mut rng);
        let issued = IssuedCaptcha {
            id: Uuid::new_v4().simple().to_string(),
            image: base64::engine::general_purpose::STANDARD.encode(svg),
        };

        self.insert(issued.id.clone(), code);
        issued
    }

    /// Checks `answer` against the challenge. A correct answer consumes the
    /// challenge; a wrong one leaves it usable until it expires.
    pub fn verify(&self, id: &str, answer: &str) -> Result<(), CaptchaError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = entries.get(id) else {
            return Err(CaptchaError::Expired);
        };

        if entry.expires_at < now {
            entries.remove(id);
            return Err(CaptchaError::Expired);
        }

        if entry.code != answer.trim().to_lowercase() {
            return Err(CaptchaError::Mismatch);
        }

        entries.remove(id);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn insert(&self, id: String, code: String) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        entries.retain(|_, entry| entry.expires_at >= now);
        entries.insert(
            id,
            Entry {
                code: code.to_lowercase(),
                expires_at: now + self.ttl,
            },
        );
    }
}

fn render_svg<R: Rng>(code: &str, rng: &mut R) -> String {
    let mut svg = format!(
        r#"<svg width="{IMAGE_WIDTH}" height="{IMAGE_HEIGHT}" xmlns="http://www.w3.org/2000/svg" style="background-color:{BACKGROUND};">"#
    );

    for _ in 0..3 {
        let _ = write!(
            svg,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="1" opacity="0.5" />"#,
            rng.random_range(0.0..IMAGE_WIDTH),
            rng.random_range(0.0..IMAGE_HEIGHT),
            rng.random_range(0.0..IMAGE_WIDTH),
            rng.random_range(0.0..IMAGE_HEIGHT),
            pick_color(rng),
        );
    }

    let char_width = IMAGE_WIDTH / (code.chars().count() as f64 + 1.0);
    let y = IMAGE_HEIGHT / 2.0 + 5.0;
    for (i, ch) in code.chars().enumerate() {
        let x = char_width * (i as f64 + 1.0);
        let rotation = rng.random_range(-10.0..10.0);
        let _ = write!(
            svg,
            r#"<text x="{x:.1}" y="{y:.1}" font-family="Arial" font-size="20" fill="{}" text-anchor="middle" transform="rotate({rotation:.1} {x:.1} {y:.1})">{ch}</text>"#,
            pick_color(rng),
        );
    }

    for _ in 0..20 {
        let _ = write!(
            svg,
            r#"<circle cx="{:.1}" cy="{:.1}" r="1" fill="{}" opacity="0.5" />"#,
            rng.random_range(0.0..IMAGE_WIDTH),
            rng.random_range(0.0..IMAGE_HEIGHT),
            pick_color(rng),
        );
    }

    svg.push_str("</svg>");
    svg
}

fn pick_color<R: Rng>(rng: &mut R) -> &'static str {
    PALETTE[rng.random_range(0..PALETTE.len())]
}
