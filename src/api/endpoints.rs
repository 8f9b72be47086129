use rocket::request::Request;
use rocket::serde::json::Json;
use rocket::{catch, post, State};

use crate::api::types::*;
use crate::api::SigninService;
use crate::errors::*;
use crate::signin::VerificationOutcome;

#[post("/challenge", format = "application/json", data = "<request>")]
pub fn challenge(
    request: Json<ChallengeRequest>,
    signin: &State<SigninService>,
) -> Result<Json<ChallengeResponse>> {
    if request.site_id.is_empty() {
        bail!(ErrorKind::InvalidSiteId);
    }

    Ok(Json(signin.generate_blob(&request.site_id)?))
}

#[post("/verify", format = "application/json", data = "<request>")]
pub async fn verify(
    request: Json<VerifyRequest>,
    signin: &State<SigninService>,
) -> VerificationOutcome {
    signin.verify(&request.blob, &request.signature).await
}

// Bodies that fail the JSON guards never reach a handler; answer them in the same shape.
#[catch(400)]
pub fn bad_request(_req: &Request) -> VerificationOutcome {
    VerificationOutcome::failure("malformed request")
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> VerificationOutcome {
    VerificationOutcome::failure("malformed request body")
}
