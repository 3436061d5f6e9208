use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use uuid::Uuid;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

/// Token lifetimes are capped so expiry timestamps stay far from `i64` overflow.
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

const DEFAULT_ASSISTANT_ID: &str = "00000000-0000-0000-0000-0000000000a1";
const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Production mode marks the refresh cookie `Secure`.
    pub production: bool,
    pub cloudinary: Option<CloudinaryConfig>,
    pub upload_dir: PathBuf,
    pub public_url: String,
    pub groq: Option<GroqConfig>,
    pub default_model: String,
    pub assistant_id: Uuid,
    /// Lowercased.
    pub admin_emails: Vec<String>,
    pub cors_origin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_key: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let access_secret = get("ACCESS_TOKEN_SECRET").unwrap_or_default();
        let refresh_secret = get("REFRESH_TOKEN_SECRET").unwrap_or_default();
        check_secret("ACCESS_TOKEN_SECRET", &access_secret)?;
        check_secret("REFRESH_TOKEN_SECRET", &refresh_secret)?;
        if access_secret == refresh_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let host = get("CHATLINE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("CHATLINE_PORT")
            .unwrap_or_else(|| "5001".into())
            .parse()
            .context("CHATLINE_PORT")?;

        let access_ttl = parse_duration(&get("ACCESS_TOKEN_EXPIRY").unwrap_or_else(|| "15m".into()))
            .context("ACCESS_TOKEN_EXPIRY")?;
        let refresh_ttl = parse_duration(&get("REFRESH_TOKEN_EXPIRY").unwrap_or_else(|| "7d".into()))
            .context("REFRESH_TOKEN_EXPIRY")?;

        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => bail!("Cloudinary needs CLOUD_NAME, API_KEY and API_SECRET together"),
        };

        let groq = get("GROQ_API_KEY").map(|api_key| GroqConfig {
            api_key,
            base_url: get("GROQ_API_BASE_URL").unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.into()),
        });

        let assistant_id = get("AI_ASSISTANT_ID")
            .unwrap_or_else(|| DEFAULT_ASSISTANT_ID.into())
            .parse()
            .context("AI_ASSISTANT_ID")?;

        let admin_emails = get("ADMIN_EMAILS")
            .map(|v| {
                v.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            public_url: get("CHATLINE_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
            host,
            port,
            db_path: get("CHATLINE_DB_PATH").unwrap_or_else(|| "chatline.db".into()).into(),
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
            production: get("CHATLINE_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
            cloudinary,
            upload_dir: get("CHATLINE_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            groq,
            default_model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.into()),
            assistant_id,
            admin_emails,
            cors_origin: get("CHATLINE_CORS_ORIGIN"),
        })
    }

    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.iter().any(|a| *a == email)
    }
}

fn check_secret(name: &str, value: &str) -> Result<()> {
    if value.is_empty() || PLACEHOLDER_SECRETS.contains(&value) {
        bail!("{} is unset or still a placeholder", name);
    }
    Ok(())
}

/// Parse `30s`, `15m`, `12h`, `7d`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| anyhow!("invalid duration '{}'", raw))?;

    let seconds_per_unit = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => bail!("unknown duration unit '{}' in '{}'", other, raw),
    };

    if amount == 0 {
        bail!("duration '{}' must be positive", raw);
    }

    let seconds = amount
        .checked_mul(seconds_per_unit)
        .filter(|s| *s <= MAX_DURATION_SECS)
        .ok_or_else(|| anyhow!("duration '{}' exceeds ten years", raw))?;

    Ok(Duration::from_secs(seconds))
}
