//! HMAC-SHA256 helpers shared by webhook and Web App verification.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison of `expected` against a hex string.
///
/// Non-hex input and length mismatches compare unequal.
pub fn verify_hex(expected: &[u8], provided_hex: &str) -> bool {
    match hex::decode(provided_hex.trim()) {
        Ok(provided) => expected.ct_eq(&provided).into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_hex() {
        let mac = hmac_sha256(b"k", b"m");
        assert!(verify_hex(&mac, &hex::encode(mac)));
        assert!(verify_hex(&mac, &hex::encode(mac).to_uppercase()));
        assert!(!verify_hex(&mac, "zz"));
        assert!(!verify_hex(&mac, &hex::encode(&mac[..16])));
    }
}
