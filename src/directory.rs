//! Remote identity directory: what we ask it, and what we accept back.
//!
//! Only the handful of fields needed to find a user's primary public key bundle and a few
//! profile strings are read. Anything else in the response is ignored.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::challenge::Challenge;
use crate::errors::*;

/// `status.name` of a successful directory response.
pub const STATUS_OK: &str = "OK";

/// What to search the directory by.
///
/// At most one field is set. An unkeyed lookup is still handed to the directory, which decides
/// what it can answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LookupKey {
    pub fingerprint: Option<String>,
    pub username: Option<String>,
}

impl LookupKey {
    /// Prefer the key fingerprint, fall back to the username.
    pub fn for_challenge(challenge: &Challenge) -> LookupKey {
        let non_empty = |s: &Option<String>| s.as_ref().filter(|s| !s.is_empty()).cloned();

        match non_empty(&challenge.fingerprint) {
            Some(fingerprint) => LookupKey::fingerprint(fingerprint),
            None => LookupKey {
                fingerprint: None,
                username: non_empty(&challenge.email_or_username),
            },
        }
    }

    pub fn fingerprint<S: Into<String>>(fingerprint: S) -> LookupKey {
        LookupKey {
            fingerprint: Some(fingerprint.into()),
            username: None,
        }
    }

    pub fn username<S: Into<String>>(username: S) -> LookupKey {
        LookupKey {
            fingerprint: None,
            username: Some(username.into()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match (self.fingerprint.as_ref(), self.username.as_ref()) {
            (Some(_), _) => "fingerprint",
            (None, Some(_)) => "username",
            (None, None) => "none",
        }
    }
}

/// Fetches the raw directory record for a lookup key.
///
/// Implementations own their transport, including timeouts.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn lookup(&self, key: &LookupKey) -> Result<Value>;
}

#[async_trait]
impl<T: DirectoryLookup + ?Sized> DirectoryLookup for Box<T> {
    async fn lookup(&self, key: &LookupKey) -> Result<Value> {
        (**self).lookup(key).await
    }
}

/// How to treat a response that matched more than one user.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Take the first matched user, ignore the rest.
    FirstMatch,
    /// Refuse to pick between several users.
    RejectAmbiguous,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy::RejectAmbiguous
    }
}

#[derive(Deserialize, Debug)]
struct DirectoryRecord {
    #[serde(default)]
    status: Option<DirectoryStatus>,
    #[serde(default)]
    them: Option<Vec<Option<User>>>,
}

#[derive(Deserialize, Debug)]
struct DirectoryStatus {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub basics: Basics,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub public_keys: Option<PublicKeys>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Basics {
    #[serde(default)]
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Profile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PublicKeys {
    #[serde(default)]
    pub primary: Option<PrimaryKey>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PrimaryKey {
    #[serde(default)]
    pub bundle: Option<String>,
}

impl User {
    /// Armored primary key bundle, if the directory gave us a non-empty one.
    pub fn bundle(&self) -> Option<&str> {
        self.public_keys
            .as_ref()
            .and_then(|keys| keys.primary.as_ref())
            .and_then(|primary| primary.bundle.as_deref())
            .filter(|bundle| !bundle.is_empty())
    }

    pub fn full_name(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.full_name.as_deref())
            .unwrap_or("")
    }

    pub fn location(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.location.as_deref())
            .unwrap_or("")
    }
}

// Matched users of an OK response, `null` entries included. `None` if the response is not OK
// or is not shaped like a directory record at all.
fn matched_users(response: &Value) -> Option<Vec<Option<User>>> {
    let record: DirectoryRecord = ::serde_json::from_value(response.clone()).ok()?;

    let ok = record
        .status
        .and_then(|s| s.name)
        .map(|name| name == STATUS_OK)
        .unwrap_or(false);
    if !ok {
        return None;
    }

    record.them
}

/// First matched user, provided it carries a usable primary key bundle.
///
/// Later entries are never consulted, even when the first one is `null`.
pub fn extract_user(response: &Value) -> Option<User> {
    matched_users(response)?
        .into_iter()
        .next()
        .flatten()
        .filter(|user| user.bundle().is_some())
}

/// The single matched user. More than one match is an error rather than a guess.
///
/// `null` entries stand for keys the directory did not know and are not counted.
pub fn extract_unique_user(response: &Value) -> Result<User> {
    let mut users = matched_users(response)
        .ok_or(ErrorKind::NoMatchingIdentity)?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    if users.len() > 1 {
        bail!(ErrorKind::AmbiguousIdentity(users.len()));
    }

    users
        .pop()
        .filter(|user| user.bundle().is_some())
        .ok_or_else(|| ErrorKind::NoMatchingIdentity.into())
}

/// Apply `policy` to a raw directory response.
pub fn select_user(response: &Value, policy: MatchPolicy) -> Result<User> {
    match policy {
        MatchPolicy::FirstMatch => {
            extract_user(response).ok_or_else(|| ErrorKind::NoMatchingIdentity.into())
        }
        MatchPolicy::RejectAmbiguous => extract_unique_user(response),
    }
}

/// `DirectoryLookup` over the Keybase user lookup HTTP API.
pub struct KeybaseDirectory {
    client: reqwest::Client,
    url: String,
    fields: String,
}

impl KeybaseDirectory {
    pub fn new(url: &str, fields: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ErrorKind::Lookup(format!("failed to build HTTP client ({})", e)))?;

        Ok(KeybaseDirectory {
            client,
            url: url.to_string(),
            fields: fields.to_string(),
        })
    }

    fn request(&self, key: &LookupKey) -> Result<reqwest::RequestBuilder> {
        let (param, value) = match (key.fingerprint.as_ref(), key.username.as_ref()) {
            (Some(fp), _) => ("key_fingerprint", fp),
            (None, Some(name)) => ("usernames", name),
            (None, None) => bail!(ErrorKind::Lookup(
                "no fingerprint or username to look up".into()
            )),
        };

        Ok(self
            .client
            .get(&self.url)
            .query(&[(param, value.as_str()), ("fields", self.fields.as_str())]))
    }
}

#[async_trait]
impl DirectoryLookup for KeybaseDirectory {
    async fn lookup(&self, key: &LookupKey) -> Result<Value> {
        // The directory reports failures in the body's `status`, so the HTTP status is not
        // checked here.
        let response = self
            .request(key)?
            .send()
            .await
            .map_err(|e| ErrorKind::Lookup(e.to_string()))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| ErrorKind::Lookup(format!("malformed response ({})", e)).into())
    }
}
