//! Client configuration
//!
//! An explicit object handed to each component; there is no global
//! theme or restaurant state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ClientError, ClientResult};

/// Color tokens used by the presentation layer and the invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub primary: String,
    pub primary_hover: String,
    pub primary_bg: String,
    pub success: String,
    pub danger: String,
    pub warning: String,
    pub info: String,
    pub text_primary: String,
    pub text_secondary: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: "#f97316".into(),
            primary_hover: "#ea580c".into(),
            primary_bg: "#fff7ed".into(),
            success: "#10b981".into(),
            danger: "#ef4444".into(),
            warning: "#f59e0b".into(),
            info: "#3b82f6".into(),
            text_primary: "#111827".into(),
            text_secondary: "#6b7280".into(),
        }
    }
}

/// Restaurant identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestaurantConfig {
    pub name: String,
    pub slogan: String,
    pub logo_url: Option<String>,
    /// Currency symbol printed after amounts
    pub currency: String,
    pub theme: Theme,
}

impl Default for RestaurantConfig {
    fn default() -> Self {
        Self {
            name: "Dabali Xpress".into(),
            slogan: "A l'ivoirienne".into(),
            logo_url: None,
            currency: "FCFA".into(),
            theme: Theme::default(),
        }
    }
}

impl RestaurantConfig {
    /// `4500` -> `"4 500 FCFA"`
    pub fn format_amount(&self, amount: u64) -> String {
        format!("{} {}", group_thousands(amount), self.currency)
    }
}

/// Digits grouped by three with a space separator
pub fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

/// Client configuration for connecting to the FastOrder backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL (e.g., "http://localhost:54321")
    pub base_url: String,

    /// Anonymous API key sent as `apikey` and bearer token
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Change feed TCP address; in-process feed when absent
    pub realtime_addr: Option<String>,

    /// Where the anonymous user id is persisted
    pub identity_path: Option<PathBuf>,

    pub restaurant: RestaurantConfig,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: 30,
            realtime_addr: None,
            identity_path: None,
            restaurant: RestaurantConfig::default(),
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Set the change feed address
    pub fn with_realtime_addr(mut self, addr: impl Into<String>) -> Self {
        self.realtime_addr = Some(addr.into());
        self
    }

    pub fn with_identity_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_path = Some(path.into());
        self
    }

    pub fn with_restaurant(mut self, restaurant: RestaurantConfig) -> Self {
        self.restaurant = restaurant;
        self
    }

    /// Load from a JSON file, defaults when the file does not exist
    pub fn load(path: &Path) -> ClientResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `FASTORDER_*` overrides from the process environment
    pub fn apply_env(&mut self) -> ClientResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ClientResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FASTORDER_BASE_URL") {
            self.base_url = url;
        }
        if let Some(key) = lookup("FASTORDER_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(addr) = lookup("FASTORDER_REALTIME_ADDR") {
            self.realtime_addr = Some(addr);
        }
        if let Some(secs) = lookup("FASTORDER_TIMEOUT_SECS") {
            self.timeout_secs = secs.trim().parse().map_err(|_| {
                ClientError::Config(format!("FASTORDER_TIMEOUT_SECS is not a number: {}", secs))
            })?;
        }
        if let Some(path) = lookup("FASTORDER_IDENTITY_PATH") {
            self.identity_path = Some(PathBuf::from(path));
        }
        if let Some(currency) = lookup("FASTORDER_CURRENCY") {
            self.restaurant.currency = currency;
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:54321")
    }
}
