use gigcore_core::error::CoreError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies `signature_hex` (lowercase hex HMAC-SHA256 digest) against the
/// raw request body and the shared webhook secret. Constant-time compare is
/// delegated to `hmac`'s `verify_slice`.
pub fn verify(secret: &str, raw_payload: &[u8], signature_hex: &str) -> Result<(), CoreError> {
    let expected = hex::decode(signature_hex).map_err(|_| CoreError::SignatureVerificationFailed)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| CoreError::SignatureVerificationFailed)?;
    mac.update(raw_payload);
    mac.verify_slice(&expected)
        .map_err(|_| CoreError::SignatureVerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_verifies() {
        let sig = sign("whsec_test", b"{\"id\":\"evt_1\"}");
        assert!(verify("whsec_test", b"{\"id\":\"evt_1\"}", &sig).is_ok());
    }

    #[test]
    fn tampered_payload_fails() {
        let sig = sign("whsec_test", b"{\"id\":\"evt_1\"}");
        assert!(verify("whsec_test", b"{\"id\":\"evt_2\"}", &sig).is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign("whsec_test", b"{\"id\":\"evt_1\"}");
        assert!(verify("whsec_other", b"{\"id\":\"evt_1\"}", &sig).is_err());
    }
}
