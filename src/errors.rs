use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;

error_chain! {
    errors {
        Random {
            description("secure random source failed")
            display("secure random source failed")
        }
        InvalidSiteId {
            description("site id must not be empty")
            display("site id must not be empty")
        }
        InvalidBlob {
            description("invalid challenge blob")
            display("invalid challenge blob")
        }
        Lookup(reason: String) {
            description("directory lookup failed")
            display("directory lookup failed: {}", reason)
        }
        NoMatchingIdentity {
            description("no matching public key")
            display("no matching public key")
        }
        AmbiguousIdentity(count: usize) {
            description("ambiguous directory match")
            display("ambiguous directory match: {} users", count)
        }
        KeyImport(reason: String) {
            description("unable to load public key")
            display("unable to load public key: {}", reason)
        }
        SignatureVerification(reason: String) {
            description("unable to verify signature")
            display("unable to verify signature: {}", reason)
        }
        PayloadDecode(reason: String) {
            description("unable to decode signed challenge")
            display("unable to decode signed challenge: {}", reason)
        }
        Mismatch {
            description("mismatched challenge and signature")
            display("mismatched challenge and signature")
        }
    }
}

// Render errors that escape a handler as a JSON failure body
impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut rslt = String::new();

        #[cfg(debug_assertions)]
        {
            rslt += &format!("Error: {}", self);
            for ce in self.iter().skip(1) {
                rslt += &format!(", caused by: {}", ce);
            }
        }

        #[cfg(not(debug_assertions))]
        {
            rslt += "request failed";
        }

        let resp = json!({
            "status": "failure",
            "message": rslt,
        })
        .to_string();

        Response::build()
            .status(Status::BadRequest)
            .header(ContentType::JSON)
            .sized_body(resp.len(), Cursor::new(resp))
            .ok()
    }
}
