//! Opaque session tokens: `<id>.<signature>`.
//!
//! The id is 32 random bytes (hex).  The signature is an HMAC-SHA256 of the
//! id under the process secret, so forged or tampered tokens are rejected
//! before the session map is consulted.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const ID_BYTES: usize = 32;

pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Generate a random secret suitable for [`TokenSigner::new`].
    pub fn random_secret() -> Vec<u8> {
        let mut secret = vec![0u8; 32];
        OsRng.fill_bytes(&mut secret);
        secret
    }

    /// Mint a fresh token.  Returns `(id, token)`.
    pub fn issue(&self) -> (String, String) {
        let mut raw = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut raw);
        let id = hex::encode(raw);
        let token = format!("{id}.{}", hex::encode(self.sign(&id)));
        (id, token)
    }

    /// Check the signature and return the embedded id.
    ///
    /// The signature comparison runs in constant time.
    pub fn verify<'a>(&self, token: &'a str) -> Option<&'a str> {
        let (id, sig_hex) = token.split_once('.')?;
        if id.len() != ID_BYTES * 2 {
            return None;
        }
        let provided = hex::decode(sig_hex).ok()?;
        let expected = self.sign(id);
        if bool::from(expected.ct_eq(provided.as_slice())) {
            Some(id)
        } else {
            None
        }
    }

    fn sign(&self, id: &str) -> Vec<u8> {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}
