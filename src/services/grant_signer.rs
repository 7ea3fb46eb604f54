//! HMAC-SHA256 signing and verification of read grants.

use crate::models::grant::{READ_PERMISSION, ReadGrant};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Why a grant failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantRejection {
    Expired,
    BadSignature,
    NotReadable,
}

impl GrantRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantRejection::Expired => "grant has expired",
            GrantRejection::BadSignature => "signature does not match",
            GrantRejection::NotReadable => "grant does not allow reads",
        }
    }
}

#[derive(Clone)]
pub struct GrantSigner {
    account_key: Vec<u8>,
}

impl GrantSigner {
    pub fn new(account_key: impl AsRef<[u8]>) -> Self {
        Self {
            account_key: account_key.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.account_key)
            .expect("HMAC-SHA-256 accepts keys of any size")
    }

    /// Sign a read grant for `container/key` that expires `ttl` after `now`.
    ///
    /// Expiry is truncated to whole seconds, the precision the signature
    /// covers. A `ttl` past the representable range saturates.
    pub fn sign_read(
        &self,
        container: &str,
        key: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> ReadGrant {
        let expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expires_at = expires_at.with_nanosecond(0).unwrap_or(expires_at);

        let mut mac = self.mac();
        mac.update(
            ReadGrant::string_to_sign(container, key, READ_PERMISSION, &expires_at).as_bytes(),
        );
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        ReadGrant {
            container: container.to_string(),
            key: key.to_string(),
            permissions: READ_PERMISSION.to_string(),
            expires_at,
            signature,
        }
    }

    /// Check signature, permission and expiry of `grant` at time `now`.
    pub fn verify(&self, grant: &ReadGrant, now: DateTime<Utc>) -> Result<(), GrantRejection> {
        let signature = general_purpose::STANDARD
            .decode(&grant.signature)
            .map_err(|_| GrantRejection::BadSignature)?;

        let mut mac = self.mac();
        mac.update(
            ReadGrant::string_to_sign(
                &grant.container,
                &grant.key,
                &grant.permissions,
                &grant.expires_at,
            )
            .as_bytes(),
        );
        mac.verify_slice(&signature)
            .map_err(|_| GrantRejection::BadSignature)?;

        if !grant.permissions.contains(READ_PERMISSION) {
            return Err(GrantRejection::NotReadable);
        }
        if now >= grant.expires_at {
            return Err(GrantRejection::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-16T08:00:00.750Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn signed_grant_verifies_until_expiry() {
        let signer = GrantSigner::new("account-key");
        let grant = signer.sign_read("input", "a.txt", now(), Duration::from_secs(3600));

        assert_eq!(grant.permissions, "r");
        assert_eq!(grant.expires_at.to_rfc3339(), "2026-10-16T09:00:00+00:00");
        assert_eq!(signer.verify(&grant, now()), Ok(()));
        assert_eq!(
            signer.verify(&grant, now() + ChronoDuration::hours(2)),
            Err(GrantRejection::Expired)
        );
    }

    #[test]
    fn tampered_grants_are_rejected() {
        let signer = GrantSigner::new("account-key");
        let grant = signer.sign_read("input", "a.txt", now(), Duration::from_secs(60));

        let mut other_key = grant.clone();
        other_key.key = "b.csv".into();
        assert_eq!(
            signer.verify(&other_key, now()),
            Err(GrantRejection::BadSignature)
        );

        let mut extended = grant.clone();
        extended.expires_at = extended.expires_at + ChronoDuration::days(1);
        assert_eq!(
            signer.verify(&extended, now()),
            Err(GrantRejection::BadSignature)
        );

        let mut garbage = grant;
        garbage.signature = "%%%".into();
        assert_eq!(
            signer.verify(&garbage, now()),
            Err(GrantRejection::BadSignature)
        );
    }

    #[test]
    fn grants_from_another_account_are_rejected() {
        let grant = GrantSigner::new("one").sign_read("input", "a.txt", now(), Duration::from_secs(60));
        assert_eq!(
            GrantSigner::new("two").verify(&grant, now()),
            Err(GrantRejection::BadSignature)
        );
    }

    #[test]
    fn oversized_ttl_saturates() {
        let signer = GrantSigner::new("account-key");
        let grant = signer.sign_read("input", "a.txt", now(), Duration::from_secs(u64::MAX));
        assert!(grant.expires_at > now() + ChronoDuration::days(365 * 1000));
        assert_eq!(signer.verify(&grant, now()), Ok(()));
    }
}
