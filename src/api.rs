//! The malcore wire contract. Endpoints, fixed headers and the accessors for
//! the loosely-typed JSON shapes the service returns. Kept in one place so the
//! rest of the crate never spells out a path or a magic key twice.

use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.malcore.io";

/// Fixed client identification, sent on every request.
pub const USER_AGENT: &str = "x64dbg";

/// apiKey value the service returns for accounts without an issued key.
pub const NO_KEY_SENTINEL: &str = "...";

#[derive(Clone, Debug)]
pub struct Api {
    base: String,
}

impl Default for Api {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Api {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    /// Reference: https://malcore.readme.io/reference/status-check
    pub fn status_url(&self) -> String {
        format!("{}/api/status", self.base)
    }

    /// Reference: https://malcore.readme.io/reference/upload
    pub fn upload_url(&self) -> String {
        format!("{}/api/upload", self.base)
    }

    pub fn login_url(&self) -> String {
        format!("{}/auth/login", self.base)
    }
}

/// Form body for a status poll. An empty uuid is the credential-check mode.
pub fn status_body(uuid: &str) -> String {
    format!("uuid={uuid}")
}

pub fn parse_root(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

pub fn success(root: &Value) -> bool {
    root["success"].as_bool().unwrap_or(false)
}

/// First entry of the `messages` array, where the service puts user-facing
/// failure text.
pub fn first_message(root: &Value) -> Option<&str> {
    root["messages"].get(0)?["message"].as_str()
}

/// Job id of a fresh upload: `data.data.uuid`.
pub fn upload_uuid(root: &Value) -> Option<&str> {
    root["data"]["data"]["uuid"].as_str()
}

/// Poll status: `data.status`. Anything other than "pending" is terminal.
pub fn poll_status(root: &Value) -> Option<&str> {
    root["data"]["status"].as_str()
}

/// The analysis payload itself, as delivered by a terminal poll response and
/// as stored in the cache (the full response body is cached; `data` is the
/// payload handed to the renderer).
pub fn report_data(root: &Value) -> &Value {
    &root["data"]
}

/// apiKey out of a login response: `data.user.apiKey`.
pub fn login_api_key(root: &Value) -> Option<&str> {
    root["data"]["user"]["apiKey"].as_str()
}
