use std::sync::Arc;

use error_chain::ChainedError;
use serde_json::Value;

use crate::challenge::{self, Challenge, SignedChallenge};
use crate::directory::{self, DirectoryLookup, LookupKey, MatchPolicy, User};
use crate::errors::*;
use crate::matcher;
use crate::verifier::{self, KeyVerifier, RpgpVerifier};
use tracing::{debug, info, warn};

/// Status code carried by every failed outcome.
pub const FAILURE_STATUS: u16 = 400;
pub const SUCCESS_STATUS: u16 = 200;

/// Identity proven by a verified, matched signature.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub kb_username: String,
    pub kb_uid: String,
    pub full_name: String,
    pub location: String,
    pub token: String,
}

impl VerifiedUser {
    fn new(user: &User, token: &str) -> Self {
        VerifiedUser {
            kb_username: user.basics.username.clone(),
            kb_uid: user.id.clone(),
            full_name: user.full_name().to_string(),
            location: user.location().to_string(),
            token: token.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Success(VerifiedUser),
    Failure { reason: String, status: u16 },
}

impl VerificationOutcome {
    pub fn failure(reason: &str) -> Self {
        VerificationOutcome::Failure {
            reason: reason.to_string(),
            status: FAILURE_STATUS,
        }
    }

    pub fn is_success(&self) -> bool {
        match *self {
            VerificationOutcome::Success(_) => true,
            VerificationOutcome::Failure { .. } => false,
        }
    }

    pub fn status_code(&self) -> u16 {
        match *self {
            VerificationOutcome::Success(_) => SUCCESS_STATUS,
            VerificationOutcome::Failure { status, .. } => status,
        }
    }

    /// Body delivered to the caller alongside `status_code`.
    pub fn payload(&self) -> Value {
        match *self {
            VerificationOutcome::Success(ref user) => json!({
                "status": { "code": 0, "name": "OK" },
                "user": user,
            }),
            VerificationOutcome::Failure { ref reason, .. } => json!({
                "status": "failure",
                "message": reason,
            }),
        }
    }
}

impl From<Error> for VerificationOutcome {
    fn from(err: Error) -> Self {
        VerificationOutcome::failure(&err.to_string())
    }
}

/// Receives the result of an issuance or a verification attempt, exactly once per attempt.
pub trait ResultSink {
    fn deliver(&mut self, status: u16, payload: Value);
}

impl<F> ResultSink for F
where
    F: FnMut(u16, Value),
{
    fn deliver(&mut self, status: u16, payload: Value) {
        self(status, payload)
    }
}

/// Issues challenges and verifies signed challenges against a remote directory.
pub struct Signin<L, V = RpgpVerifier> {
    directory: L,
    verifier: Arc<V>,
    match_policy: MatchPolicy,
}

impl<L> Signin<L, RpgpVerifier>
where
    L: DirectoryLookup,
{
    pub fn new(directory: L) -> Self {
        Self::with_verifier(directory, RpgpVerifier::new())
    }
}

impl<L, V> Signin<L, V>
where
    L: DirectoryLookup,
    V: KeyVerifier + 'static,
{
    pub fn with_verifier(directory: L, verifier: V) -> Self {
        Signin {
            directory,
            verifier: Arc::new(verifier),
            match_policy: MatchPolicy::default(),
        }
    }

    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    pub fn generate_blob(&self, site_id: &str) -> Result<Challenge> {
        let blob = challenge::issue(site_id)?;
        info!(site_id = %blob.site_id, "issued challenge");
        Ok(blob)
    }

    /// Issue a challenge and acknowledge it on `sink` with status 200.
    pub fn generate_blob_into<S: ResultSink>(
        &self,
        site_id: &str,
        sink: &mut S,
    ) -> Result<Challenge> {
        match self.generate_blob(site_id) {
            Ok(blob) => {
                sink.deliver(SUCCESS_STATUS, json!(blob));
                Ok(blob)
            }
            Err(e) => {
                sink.deliver(FAILURE_STATUS, json!(e.to_string()));
                Err(e)
            }
        }
    }

    /// Verify that `signature` is `challenge` signed by a key the directory knows.
    ///
    /// Every failure along the way becomes a `Failure` outcome; nothing is returned
    /// half-verified.
    pub async fn verify(&self, challenge: &Challenge, signature: &str) -> VerificationOutcome {
        match self.try_verify(challenge, signature).await {
            Ok(user) => {
                info!(
                    site_id = %challenge.site_id,
                    kb_username = %user.kb_username,
                    kb_uid = %user.kb_uid,
                    "signin verified"
                );
                VerificationOutcome::Success(user)
            }
            Err(e) => {
                warn!(
                    site_id = %challenge.site_id,
                    error = %e.display_chain(),
                    "signin rejected"
                );
                e.into()
            }
        }
    }

    /// `verify`, with the outcome delivered to `sink`.
    pub async fn verify_into<S: ResultSink>(
        &self,
        challenge: &Challenge,
        signature: &str,
        sink: &mut S,
    ) -> VerificationOutcome {
        let outcome = self.verify(challenge, signature).await;
        sink.deliver(outcome.status_code(), outcome.payload());
        outcome
    }

    async fn try_verify(&self, challenge: &Challenge, signature: &str) -> Result<VerifiedUser> {
        if !challenge.is_valid() {
            bail!(ErrorKind::InvalidBlob);
        }

        let key = LookupKey::for_challenge(challenge);
        debug!(lookup = key.kind(), "looking up signer");

        let response = self.directory.lookup(&key).await?;
        let user = directory::select_user(&response, self.match_policy)?;

        // extracted users always carry a bundle
        let bundle = user.bundle().ok_or(ErrorKind::NoMatchingIdentity)?;
        let recovered = self.check_signature(bundle, signature).await?;

        if let Some(field) = matcher::first_mismatch(challenge, &recovered) {
            debug!(field = field.name(), "signed challenge differs");
            bail!(ErrorKind::Mismatch);
        }

        Ok(VerifiedUser::new(&user, &challenge.token))
    }

    // Key import and signature checks are CPU bound; keep them off the async workers.
    async fn check_signature(&self, bundle: &str, signature: &str) -> Result<SignedChallenge> {
        let keys = Arc::clone(&self.verifier);
        let bundle = bundle.to_string();
        let signature = signature.to_string();

        tokio::task::spawn_blocking(move || verifier::verify_signature(&*keys, &bundle, &signature))
            .await
            .map_err(|e| {
                ErrorKind::SignatureVerification(format!("verification task failed ({})", e))
            })?
    }
}
