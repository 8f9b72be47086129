//! Signature verification over PGP signed messages.
//!
//! `KeyVerifier` is the capability we need from an OpenPGP implementation: turn an armored
//! bundle into key material, and check an armored signed message against a ring of such keys,
//! handing back the signed literal. `RpgpVerifier` implements it with rPGP.

use pgp::composed::{Deserializable, Message, SignedPublicKey, SignedPublicSubKey};

use crate::challenge::SignedChallenge;
use crate::errors::*;

pub trait KeyVerifier: Send + Sync {
    type Key;

    /// Parse an armored public key bundle into usable key material.
    fn import_key(&self, bundle: &str) -> Result<Self::Key>;

    /// Verify an armored signed message against `ring` and return the signed literal bytes.
    fn verify(&self, ring: &KeyRing<Self::Key>, signature: &str) -> Result<Vec<u8>>;
}

/// Keys a signature is allowed to verify against.
pub struct KeyRing<K> {
    keys: Vec<K>,
}

impl<K> KeyRing<K> {
    pub fn single(key: K) -> Self {
        KeyRing { keys: vec![key] }
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

/// Import `bundle`, verify `signature` with it alone, and decode the signed challenge.
///
/// The key material lives only for the duration of this call.
pub fn verify_signature<V>(verifier: &V, bundle: &str, signature: &str) -> Result<SignedChallenge>
where
    V: KeyVerifier + ?Sized,
{
    let key = verifier.import_key(bundle)?;
    let ring = KeyRing::single(key);
    let literal = verifier.verify(&ring, signature)?;

    SignedChallenge::from_payload(&literal)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RpgpVerifier;

impl RpgpVerifier {
    pub fn new() -> Self {
        RpgpVerifier
    }
}

// The primary key or one of its signing subkeys may have made the signature.
fn signed_by(message: &Message, key: &SignedPublicKey) -> bool {
    message.verify(key).is_ok()
        || key
            .public_subkeys
            .iter()
            .filter(|subkey| can_sign(subkey))
            .any(|subkey| message.verify(&subkey.key).is_ok())
}

fn can_sign(subkey: &SignedPublicSubKey) -> bool {
    subkey.signatures.iter().any(|sig| sig.key_flags().sign())
}

impl KeyVerifier for RpgpVerifier {
    type Key = SignedPublicKey;

    fn import_key(&self, bundle: &str) -> Result<SignedPublicKey> {
        if bundle.trim().is_empty() {
            bail!(ErrorKind::KeyImport("empty key bundle".into()));
        }

        let (key, _headers) = SignedPublicKey::from_string(bundle)
            .map_err(|e| ErrorKind::KeyImport(e.to_string()))?;

        key.verify()
            .map_err(|e| ErrorKind::KeyImport(format!("no usable key ({})", e)))?;

        Ok(key)
    }

    fn verify(&self, ring: &KeyRing<SignedPublicKey>, signature: &str) -> Result<Vec<u8>> {
        let (message, _headers) = Message::from_string(signature).map_err(|e| {
            ErrorKind::SignatureVerification(format!("malformed signed message ({})", e))
        })?;

        let message = message.decompress().map_err(|e| {
            ErrorKind::SignatureVerification(format!("malformed signed message ({})", e))
        })?;

        if !ring.keys().iter().any(|key| signed_by(&message, key)) {
            bail!(ErrorKind::SignatureVerification(
                "not signed by any key in the ring".into()
            ));
        }

        match message.get_content() {
            Ok(Some(content)) => Ok(content),
            Ok(None) => bail!(ErrorKind::PayloadDecode(
                "signed message carries no literal data".into()
            )),
            Err(e) => bail!(ErrorKind::PayloadDecode(e.to_string())),
        }
    }
}
