use crate::challenge::{Challenge, SignedChallenge};

/// Fields that must agree between the issued and the signed challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedField {
    SiteId,
    Token,
    EmailOrUsername,
    Fingerprint,
    ExtNonce,
    ExtAnnotation,
}

/// Comparison order. Matching stops at the first field that differs.
pub const TRACKED_FIELDS: [TrackedField; 6] = [
    TrackedField::SiteId,
    TrackedField::Token,
    TrackedField::EmailOrUsername,
    TrackedField::Fingerprint,
    TrackedField::ExtNonce,
    TrackedField::ExtAnnotation,
];

impl TrackedField {
    /// Name of the field on the wire.
    pub fn name(self) -> &'static str {
        match self {
            TrackedField::SiteId => "siteId",
            TrackedField::Token => "token",
            TrackedField::EmailOrUsername => "email_or_username",
            TrackedField::Fingerprint => "fingerprint",
            TrackedField::ExtNonce => "kb_login_ext_nonce",
            TrackedField::ExtAnnotation => "kb_login_ext_annotation",
        }
    }

    fn value(self, challenge: &Challenge) -> Option<&str> {
        match self {
            TrackedField::SiteId => Some(challenge.site_id.as_str()),
            TrackedField::Token => Some(challenge.token.as_str()),
            TrackedField::EmailOrUsername => challenge.email_or_username.as_deref(),
            TrackedField::Fingerprint => challenge.fingerprint.as_deref(),
            TrackedField::ExtNonce => challenge.kb_login_ext_nonce.as_deref(),
            TrackedField::ExtAnnotation => challenge.kb_login_ext_annotation.as_deref(),
        }
    }
}

/// First tracked field on which `original` and `recovered` disagree, if any.
///
/// Absent on both sides counts as equal; absent on one side only does not.
pub fn first_mismatch(original: &Challenge, recovered: &SignedChallenge) -> Option<TrackedField> {
    let recovered = recovered.as_challenge();

    TRACKED_FIELDS
        .iter()
        .cloned()
        .find(|field| field.value(original) != field.value(recovered))
}

pub fn matches(original: &Challenge, recovered: &SignedChallenge) -> bool {
    first_mismatch(original, recovered).is_none()
}
