use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub url: Option<String>,
    pub profile: Option<String>,
}

/// body of a transport level relay failure, upstream http errors are passed through instead
#[derive(Debug, Serialize)]
pub struct RelayFailureDto {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignRelayDto {
    #[validate(url)]
    pub url: String,
    pub profile: Option<String>,
    #[validate(range(min = 1, max = 48))]
    pub ttl_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SignedRelayDto {
    pub path: String,
    pub expires_at: i64,
}
