//! PBKDF2-HMAC-SHA256 password hashing.
//!
//! Stored format: `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_BYTES: usize = 16;
pub const DEFAULT_ITERATIONS: u32 = 100_000;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid HMAC key")]
    InvalidKey,
    #[error("iteration count must be positive")]
    ZeroIterations,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt: [u8; SALT_BYTES] = rand::rng().random();
        let derived = pbkdf2_sha256(password.as_bytes(), &salt, self.iterations)?;
        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(derived)
        ))
    }

    /// `false` for a wrong password and for any malformed stored value.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let mut parts = stored.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        let Ok(iterations) = iterations.parse::<u32>() else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
            return false;
        };
        match pbkdf2_sha256(password.as_bytes(), &salt, iterations) {
            Ok(derived) => bool::from(derived.as_slice().ct_eq(expected.as_slice())),
            Err(_) => false,
        }
    }
}

/// First 32-byte block of PBKDF2 (RFC 8018) with HMAC-SHA256.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; 32], PasswordError> {
    if iterations == 0 {
        return Err(PasswordError::ZeroIterations);
    }
    let prf = HmacSha256::new_from_slice(password).map_err(|_| PasswordError::InvalidKey)?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut block = [0u8; 32];
    block.copy_from_slice(&mac.finalize().into_bytes());
    let mut output = block;

    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&block);
        block.copy_from_slice(&mac.finalize().into_bytes());
        for (out, byte) in output.iter_mut().zip(block.iter()) {
            *out ^= byte;
        }
    }
    Ok(output)
}
