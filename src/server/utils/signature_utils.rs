use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// signs relay links so they can be handed to players that can't send headers
pub struct SignatureUtil {
    secret: Vec<u8>,
}

impl SignatureUtil {
    pub fn new(secret: String) -> Self {
        Self {
            secret: secret.into_bytes(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // hmac takes keys of any length, new_from_slice only errors for fixed size macs
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    /// every field is length prefixed, so no two (client, expiry, url, profile) tuples feed the
    /// mac the same bytes
    fn signed_mac(&self, client_id: &str, expiry: i64, url: &str, profile: &str) -> HmacSha256 {
        let mut mac = self.mac();
        for field in [client_id, &expiry.to_string(), url, profile] {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field.as_bytes());
        }
        mac
    }

    /// hex hmac over client id, expiry, the raw `url` query value and the relay profile
    pub fn generate_signature(
        &self,
        client_id: &str,
        expiry: i64,
        url: &str,
        profile: &str,
    ) -> String {
        hex::encode(
            self.signed_mac(client_id, expiry, url, profile)
                .finalize()
                .into_bytes(),
        )
    }

    pub fn verify_signature(
        &self,
        client_id: &str,
        expiry: i64,
        url: &str,
        profile: &str,
        signature: &str,
    ) -> bool {
        if Utc::now().timestamp() > expiry {
            return false;
        }

        let Ok(signature) = hex::decode(signature) else {
            return false;
        };

        // constant time comparison
        self.signed_mac(client_id, expiry, url, profile)
            .verify_slice(&signature)
            .is_ok()
    }

    /// unix timestamp `hours` from now
    pub fn generate_expiry(hours: i64) -> i64 {
        Utc::now().timestamp() + hours * 3600
    }
}
