use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::server::error::Error;

use super::client_id_from_parts;

/// set by the frontend once the user has signed in with the auth provider
pub const OWNER_HEADER: &str = "x-owner-id";

const MAX_OWNER_LEN: usize = 128;

/// namespace that per user records are stored under
///
/// signed in users are keyed by their account id, everyone else by the anonymous client id,
/// the prefixes keep the two from ever colliding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(OWNER_HEADER)
            .map(|h| {
                h.to_str()
                    .map(str::trim)
                    .map_err(|_| Error::BadRequest("Invalid owner header".to_string()))
            })
            .transpose()?
            .filter(|owner| !owner.is_empty());

        match header {
            Some(owner) if owner.len() > MAX_OWNER_LEN => {
                Err(Error::BadRequest("Owner id is too long".to_string()))
            }
            Some(owner) => Ok(Owner(format!("user:{}", owner))),
            None => Ok(Owner(format!("anon:{}", client_id_from_parts(parts)))),
        }
    }
}
