use crate::challenge::Challenge;

#[derive(Serialize, Deserialize)]
pub struct ChallengeRequest {
    #[serde(rename = "siteId")]
    pub site_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct VerifyRequest {
    pub blob: Challenge,
    pub signature: String, // armored PGP signed message
}

pub type ChallengeResponse = Challenge;
