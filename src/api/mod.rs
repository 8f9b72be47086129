use std::io::Cursor;

use rocket::fairing::AdHoc;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::{catchers, routes, Build, Rocket};
use tracing::{error, info};

use crate::config::SigninConfig;
use crate::directory::DirectoryLookup;
use crate::signin::{Signin, VerificationOutcome};

pub mod endpoints;
pub mod types;

/// The sign-in core as managed by Rocket.
pub type SigninService = Signin<Box<dyn DirectoryLookup>>;

/// Mount the API on `rocket`, building the directory client from the `signin` config table.
pub fn setup_rocket(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.attach(AdHoc::try_on_ignite("Signin directory", |rocket| async move {
        let built = SigninConfig::from_figment(rocket.figment()).and_then(|config| {
            let directory = config.directory()?;
            info!(
                directory = %config.directory_url,
                policy = ?config.match_policy,
                "signin configured"
            );
            Ok(Signin::new(Box::new(directory) as Box<dyn DirectoryLookup>)
                .match_policy(config.match_policy))
        });

        match built {
            Ok(signin) => Ok(mount(rocket, signin)),
            Err(e) => {
                error!(error = %e, "failed to configure signin");
                Err(rocket)
            }
        }
    }))
}

/// Mount the API on `rocket` around an already built `signin`.
pub fn mount(rocket: Rocket<Build>, signin: SigninService) -> Rocket<Build> {
    rocket
        .mount("/api/v1/", routes![endpoints::challenge, endpoints::verify])
        .register(
            "/api/v1/",
            catchers![endpoints::bad_request, endpoints::unprocessable],
        )
        .manage(signin)
}

impl<'r> Responder<'r, 'static> for VerificationOutcome {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = Status::from_code(self.status_code()).unwrap_or(Status::BadRequest);
        let body = self.payload().to_string();

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rocket::local::blocking::Client;
    use serde_json::Value;

    use crate::directory::LookupKey;
    use crate::errors::*;

    const ALICE_FINGERPRINT: &str = "F7C0023B5F19FBBCABDB29EE4A1BA9BFA17E83A1";

    /// Knows Alice, nobody else. An unkeyed lookup resolves to her as well.
    struct FixtureDirectory;

    fn knows(key: &LookupKey) -> bool {
        match (key.fingerprint.as_deref(), key.username.as_deref()) {
            (Some(fp), _) => fp == ALICE_FINGERPRINT,
            (None, Some(name)) => name == "alice",
            (None, None) => true,
        }
    }

    #[async_trait]
    impl DirectoryLookup for FixtureDirectory {
        async fn lookup(&self, key: &LookupKey) -> Result<Value> {
            if !knows(key) {
                return Ok(json!({ "status": { "code": 205, "name": "NOT_FOUND" }, "them": [null] }));
            }

            Ok(json!({
                "status": { "code": 0, "name": "OK" },
                "them": [{
                    "id": "9f3c1d5e0b7a4c2e",
                    "basics": { "username": "alice" },
                    "profile": null,
                    "public_keys": {
                        "primary": { "bundle": include_str!("../../testdata/alice.pub.asc") }
                    }
                }]
            }))
        }
    }

    fn client() -> Client {
        let signin = Signin::new(Box::new(FixtureDirectory) as Box<dyn DirectoryLookup>);
        Client::tracked(mount(rocket::build(), signin)).unwrap()
    }

    fn verify_body(blob: &str, signature: &str) -> String {
        json!({
            "blob": ::serde_json::from_str::<Value>(blob).unwrap(),
            "signature": signature,
        })
        .to_string()
    }

    #[test]
    fn issues_challenge() {
        let client = client();
        let response = client
            .post("/api/v1/challenge")
            .header(ContentType::JSON)
            .body(r#"{"siteId": "acme"}"#)
            .dispatch();

        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["siteId"], json!("acme"));
        assert_eq!(body["token"].as_str().unwrap().len(), 88);
    }

    #[test]
    fn rejects_empty_site_id() {
        let client = client();
        let response = client
            .post("/api/v1/challenge")
            .header(ContentType::JSON)
            .body(r#"{"siteId": ""}"#)
            .dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["status"], json!("failure"));
    }

    #[test]
    fn verifies_signed_challenge() {
        let client = client();
        let response = client
            .post("/api/v1/verify")
            .header(ContentType::JSON)
            .body(verify_body(
                include_str!("../../testdata/challenge_ext.json"),
                include_str!("../../testdata/alice_ext.sig.asc"),
            ))
            .dispatch();

        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["status"], json!({ "code": 0, "name": "OK" }));
        assert_eq!(body["user"]["kb_username"], json!("alice"));
        assert_eq!(body["user"]["kb_uid"], json!("9f3c1d5e0b7a4c2e"));
        assert_eq!(body["user"]["full_name"], json!(""));
        assert_eq!(
            body["user"]["token"],
            json!("sBQfDyMdflKoPlGMwPk9Y4MWwOFJjnC2sDnEi5RXCyFguB0i1EoOvbDex+ujUEJsbXQoPmv0O6vgzeSjZxeyvA==")
        );
    }

    #[test]
    fn rejects_foreign_signature() {
        let client = client();
        let response = client
            .post("/api/v1/verify")
            .header(ContentType::JSON)
            .body(verify_body(
                include_str!("../../testdata/challenge_ext.json"),
                include_str!("../../testdata/mallory_acme.sig.asc"),
            ))
            .dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["status"], json!("failure"));
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("unable to verify signature"));
    }

    #[test]
    fn verifies_challenge_without_lookup_fields() {
        let client = client();
        let response = client
            .post("/api/v1/verify")
            .header(ContentType::JSON)
            .body(verify_body(
                include_str!("../../testdata/challenge_acme.json"),
                include_str!("../../testdata/alice_acme.sig.asc"),
            ))
            .dispatch();

        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["user"]["kb_username"], json!("alice"));
    }

    #[test]
    fn rejects_unknown_signer() {
        let mut blob: Value =
            ::serde_json::from_str(include_str!("../../testdata/challenge_acme.json")).unwrap();
        blob["email_or_username"] = json!("mallory");

        let client = client();
        let response = client
            .post("/api/v1/verify")
            .header(ContentType::JSON)
            .body(verify_body(
                &blob.to_string(),
                include_str!("../../testdata/alice_acme.sig.asc"),
            ))
            .dispatch();

        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["message"], json!("no matching public key"));
    }

    #[test]
    fn malformed_verify_bodies_get_json_failures() {
        let mut null_field: Value =
            ::serde_json::from_str(include_str!("../../testdata/challenge_acme.json")).unwrap();
        null_field["fingerprint"] = Value::Null;

        let bodies = vec![
            json!({ "blob": null_field, "signature": "sig" }).to_string(),
            json!({ "blob": { "siteId": "acme", "token": "t" } }).to_string(),
            "{ not json".to_string(),
        ];

        let client = client();
        for body in bodies {
            let response = client
                .post("/api/v1/verify")
                .header(ContentType::JSON)
                .body(body)
                .dispatch();

            assert_eq!(response.status(), Status::BadRequest);
            assert_eq!(response.content_type(), Some(ContentType::JSON));
            let body: Value = response.into_json().unwrap();
            assert_eq!(body["status"], json!("failure"));
            assert!(body["message"].is_string());
        }
    }
}
