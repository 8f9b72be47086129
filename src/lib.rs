//! Sign-in by PGP signed challenge.
//!
//! A site hands out a random [`Challenge`](challenge::Challenge), the user signs it with a key
//! registered to their directory account, and [`Signin::verify`](signin::Signin::verify) checks
//! the signature against the key the directory publishes for them, then checks the signed
//! content field by field against what was issued.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;

pub mod api;
pub mod challenge;
pub mod config;
pub mod directory;
pub mod errors;
pub mod matcher;
pub mod signin;
pub mod verifier;

pub use challenge::{Challenge, SignedChallenge};
pub use directory::{DirectoryLookup, KeybaseDirectory, LookupKey, MatchPolicy};
pub use signin::{ResultSink, Signin, VerificationOutcome, VerifiedUser};
pub use verifier::{KeyRing, KeyVerifier, RpgpVerifier};
