use std::ops::Deref;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::{Deserialize, Deserializer};

use crate::errors::*;

/// Shortest token accepted from a caller. 64 random bytes encode to 88 characters.
pub const MIN_TOKEN_LEN: usize = 85;

const TOKEN_BYTES: usize = 64;

// lazy-load a "global" random number generator
lazy_static! {
    pub static ref RANDOM: SystemRandom = SystemRandom::new();
}

/// A sign-in challenge, bound to the site that issued it.
///
/// The same shape is used for the blob the caller hands back at verification time. The
/// optional fields are only ever filled in by the signing client; they take part in matching
/// but are never generated here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Challenge {
    #[serde(rename = "siteId", default)]
    pub site_id: String,

    #[serde(default)]
    pub token: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_string"
    )]
    pub email_or_username: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_string"
    )]
    pub fingerprint: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_string"
    )]
    pub kb_login_ext_nonce: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_string"
    )]
    pub kb_login_ext_annotation: Option<String>,
}

/// A challenge recovered from the literal content of a verified signature.
///
/// Nothing in here is trusted until it has been matched against the issued `Challenge`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct SignedChallenge(Challenge);

// A tracked field is either absent or a string. An explicit `null` is not the same as absent.
fn present_string<'de, D>(deserializer: D) -> ::std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

/// Issue a fresh challenge for `site_id`.
///
/// The token is 512 bits from the system CSPRNG, base64 encoded.
pub fn issue(site_id: &str) -> Result<Challenge> {
    let mut data = [0u8; TOKEN_BYTES];
    RANDOM
        .deref()
        .fill(&mut data[..])
        .chain_err(|| ErrorKind::Random)?;

    Ok(Challenge {
        site_id: site_id.to_string(),
        token: STANDARD.encode(&data[..]),
        ..Challenge::default()
    })
}

/// Structural gate run before any lookup or cryptographic work.
pub fn validate_blob(blob: &Challenge) -> bool {
    !blob.site_id.is_empty() && blob.token.chars().count() >= MIN_TOKEN_LEN
}

impl Challenge {
    pub fn is_valid(&self) -> bool {
        validate_blob(self)
    }
}

impl SignedChallenge {
    /// Parse the UTF-8 JSON literal carried by a signed message.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let text = ::std::str::from_utf8(payload)
            .map_err(|e| ErrorKind::PayloadDecode(format!("not UTF-8 text ({})", e)))?;

        ::serde_json::from_str(text)
            .map_err(|e| ErrorKind::PayloadDecode(format!("not a challenge object ({})", e)).into())
    }

    pub fn as_challenge(&self) -> &Challenge {
        &self.0
    }
}

impl From<Challenge> for SignedChallenge {
    fn from(challenge: Challenge) -> Self {
        SignedChallenge(challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn blob(site_id: &str, token: &str) -> Challenge {
        Challenge {
            site_id: site_id.into(),
            token: token.into(),
            ..Challenge::default()
        }
    }

    #[test]
    fn issued_token_is_long_enough() {
        let challenge = issue("acme").unwrap();

        assert_eq!(challenge.site_id, "acme");
        assert_eq!(challenge.token.len(), 88);
        assert!(challenge.token.len() >= MIN_TOKEN_LEN);
        assert_eq!(STANDARD.decode(&challenge.token).unwrap().len(), TOKEN_BYTES);
        assert!(challenge.is_valid());
    }

    #[test]
    fn issued_challenge_has_no_client_fields() {
        let challenge = issue("acme").unwrap();

        assert_eq!(challenge.email_or_username, None);
        assert_eq!(challenge.fingerprint, None);
        assert_eq!(challenge.kb_login_ext_nonce, None);
        assert_eq!(challenge.kb_login_ext_annotation, None);
    }

    #[test]
    fn tokens_are_not_reused() {
        let tokens = (0..2000)
            .map(|_| issue("acme").unwrap().token)
            .collect::<HashSet<_>>();

        assert_eq!(tokens.len(), 2000);
    }

    #[test]
    fn validate_rejects_missing_site_id() {
        let token = "a".repeat(88);
        assert!(!validate_blob(&blob("", &token)));
    }

    #[test]
    fn validate_rejects_missing_or_short_token() {
        assert!(!validate_blob(&blob("acme", "")));
        assert!(!validate_blob(&blob("acme", &"a".repeat(84))));
    }

    #[test]
    fn validate_accepts_minimum_length() {
        assert!(validate_blob(&blob("acme", &"a".repeat(85))));
        assert!(validate_blob(&blob("acme", &"a".repeat(200))));
    }

    #[test]
    fn serializes_with_wire_names() {
        let json = ::serde_json::to_value(&blob("acme", "tok")).unwrap();

        assert_eq!(json, json!({ "siteId": "acme", "token": "tok" }));
    }

    #[test]
    fn missing_fields_deserialize_as_empty() {
        let challenge: Challenge = ::serde_json::from_str(r#"{"token": "abc"}"#).unwrap();

        assert_eq!(challenge.site_id, "");
        assert!(!challenge.is_valid());
    }

    #[test]
    fn null_tracked_field_is_rejected() {
        let parsed = ::serde_json::from_str::<Challenge>(
            r#"{"siteId": "acme", "token": "abc", "fingerprint": null}"#,
        );

        assert!(parsed.is_err());
    }

    #[test]
    fn payload_decodes_extension_fields() {
        let signed = SignedChallenge::from_payload(
            br#"{"siteId":"acme","token":"t","kb_login_ext_nonce":"n1","extra":42}"#,
        )
        .unwrap();

        assert_eq!(signed.as_challenge().site_id, "acme");
        assert_eq!(
            signed.as_challenge().kb_login_ext_nonce,
            Some("n1".to_string())
        );
    }

    #[test]
    fn payload_rejects_non_json() {
        match SignedChallenge::from_payload(b"not a challenge") {
            Err(Error(ErrorKind::PayloadDecode(_), _)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn payload_rejects_invalid_utf8() {
        match SignedChallenge::from_payload(&[0xff, 0xfe, 0x7b]) {
            Err(Error(ErrorKind::PayloadDecode(_), _)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
