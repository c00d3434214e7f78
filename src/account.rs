//! Accounts – the server-side record of a registered player.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    /// md5 hex digest of the password; never the plaintext.
    pub password_digest: String,
    /// Ids of the characters this account owns.
    #[serde(default)]
    pub characters: Vec<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, password: &str) -> Self {
        Self {
            id: id.into(),
            password_digest: digest(password),
            characters: Vec::new(),
        }
    }

    pub fn check_password(&self, password: &str) -> bool {
        self.password_digest == digest(password)
    }

    /// The account record shown to its owner. The digest stays server-side.
    pub fn record(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "objtype": "account",
            "characters": self.characters,
        })
    }
}

fn digest(password: &str) -> String {
    format!("{:x}", md5::compute(password.as_bytes()))
}
