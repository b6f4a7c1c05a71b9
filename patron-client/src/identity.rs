//! Anonymous identity resolution
//!
//! Resolves the per-device user id and the optional table number from the
//! launch parameters and local storage. Never touches the network and
//! never fails: storage problems are logged and a fresh id is minted.

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Storage key of the persisted user id
pub const USER_ID_KEY: &str = "fastorder_user_id";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Launch parameters (`?table=..&uuid=..`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    pub table: Option<String>,
    pub uuid: Option<String>,
}

impl LaunchParams {
    /// Parse a `table=7&uuid=abc` query string (leading `?` allowed)
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "table" => params.table = Some(value.to_string()),
                "uuid" => params.uuid = Some(value.to_string()),
                _ => {}
            }
        }
        params
    }
}

/// Resolved identity, read-only after startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub table_number: Option<u32>,
}

/// Local key/value persistence for the user id
pub trait IdentityStore: Send + Sync {
    fn load(&self) -> std::io::Result<Option<String>>;
    fn save(&self, user_id: &str) -> std::io::Result<()>;
}

/// JSON file store: `{"fastorder_user_id": "..."}`
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> std::io::Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> std::io::Result<Option<String>> {
        Ok(self
            .read_map()?
            .remove(USER_ID_KEY)
            .filter(|id| !id.is_empty()))
    }

    fn save(&self, user_id: &str) -> std::io::Result<()> {
        // Unreadable content is replaced rather than blocking the save
        let mut map = self.read_map().unwrap_or_default();
        map.insert(USER_ID_KEY.to_string(), user_id.to_string());
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, content)
    }
}

/// In-memory store (tests, ephemeral sessions)
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    value: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(user_id.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> std::io::Result<Option<String>> {
        Ok(self.value.lock().clone())
    }

    fn save(&self, user_id: &str) -> std::io::Result<()> {
        *self.value.lock() = Some(user_id.to_string());
        Ok(())
    }
}

/// Resolve the identity
///
/// `uuid` param wins and is not persisted (a shared link must not overwrite
/// this device's own id). Otherwise the stored id, otherwise a new one which
/// is persisted.
pub fn resolve(params: &LaunchParams, store: &dyn IdentityStore) -> Identity {
    let table_number = params.table.as_deref().and_then(parse_table);

    if let Some(uuid) = params.uuid.as_deref().filter(|u| !u.is_empty()) {
        tracing::debug!(user_id = %uuid, "Adopting user id from launch params");
        return Identity {
            user_id: uuid.to_string(),
            table_number,
        };
    }

    let stored = match store.load() {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read stored user id");
            None
        }
    };

    let user_id = match stored {
        Some(id) => id,
        None => {
            let id = mint_user_id();
            if let Err(e) = store.save(&id) {
                tracing::warn!(error = %e, user_id = %id, "Failed to persist user id");
            }
            tracing::info!(user_id = %id, "Minted new anonymous user id");
            id
        }
    };

    Identity {
        user_id,
        table_number,
    }
}

/// Table number from its leading digits; zero or no digits means no table
pub fn parse_table(raw: &str) -> Option<u32> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}

/// `"user_" + 9 random base36 chars + millisecond timestamp in base36`
pub fn mint_user_id() -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    let millis = u64::try_from(shared::util::now_millis()).unwrap_or_default();
    format!("user_{}{}", random, to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
