use std::time::Duration;

use rocket::figment::Figment;

use crate::directory::{KeybaseDirectory, MatchPolicy};
use crate::errors::*;

pub const DEFAULT_DIRECTORY_URL: &str = "https://keybase.io/_/api/1.0/user/lookup.json";
pub const DEFAULT_LOOKUP_FIELDS: &str = "basics,profile,public_keys";

/// The `signin` table of `Rocket.toml` (or `ROCKET_SIGNIN={...}`).
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SigninConfig {
    pub directory_url: String,
    pub lookup_fields: String,
    pub lookup_timeout_secs: u64,
    pub match_policy: MatchPolicy,
}

impl Default for SigninConfig {
    fn default() -> Self {
        SigninConfig {
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            lookup_fields: DEFAULT_LOOKUP_FIELDS.to_string(),
            lookup_timeout_secs: 10,
            match_policy: MatchPolicy::default(),
        }
    }
}

impl SigninConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        figment
            .focus("signin")
            .extract()
            .chain_err(|| "Failed to read signin configuration")
    }

    pub fn directory(&self) -> Result<KeybaseDirectory> {
        KeybaseDirectory::new(
            &self.directory_url,
            &self.lookup_fields,
            Duration::from_secs(self.lookup_timeout_secs),
        )
    }
}
