//! Password hashing and verification.
//!
//! Hashes are Argon2id in PHC string format:
//!
//! ```text
//! $argon2id$v=19$m=65536,t=3,p=2$<salt>$<hash>
//! ```
//!
//! Verification always uses the parameters embedded in the encoded string,
//! so changing [`HashParams`] never invalidates existing hashes.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, Salt, SaltString},
};
use serde::Deserialize;
use thiserror::Error;

/// Longest raw salt that still fits a PHC salt field.
const MAX_SALT_LEN: usize = Salt::MAX_LENGTH * 3 / 4;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Malformed encoded hash: {0}")]
    Malformed(String),
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Incompatible argon2 version: {0}")]
    IncompatibleVersion(u32),
    #[error("Argon2 error: {0}")]
    Argon2(String),
    #[error("Random source failure: {0}")]
    Random(String),
}

/// Argon2id cost parameters.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default = "default_salt_length")]
    pub salt_length: usize,
    #[serde(default = "default_output_length")]
    pub output_length: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
            salt_length: default_salt_length(),
            output_length: default_output_length(),
        }
    }
}

fn default_memory_kib() -> u32 {
    64 * 1024
}

fn default_iterations() -> u32 {
    3
}

fn default_parallelism() -> u32 {
    2
}

fn default_salt_length() -> usize {
    16
}

fn default_output_length() -> usize {
    32
}

impl HashParams {
    /// Rejects parameter sets argon2 would refuse at hash time.
    pub fn check(&self) -> Result<(), HashError> {
        if !(argon2::MIN_SALT_LEN..=MAX_SALT_LEN).contains(&self.salt_length) {
            return Err(HashError::Argon2(format!(
                "salt_length must be between {} and {MAX_SALT_LEN}",
                argon2::MIN_SALT_LEN
            )));
        }
        self.argon2_params().map(|_| ())
    }

    fn argon2_params(&self) -> Result<Params, HashError> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.output_length),
        )
        .map_err(|e| HashError::Argon2(e.to_string()))
    }
}

fn argon2id(params: Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash `password` with the given parameters and a fresh random salt.
pub fn hash_password(password: &str, params: &HashParams) -> Result<String, HashError> {
    let mut salt = vec![0u8; params.salt_length];
    getrandom::fill(&mut salt).map_err(|e| HashError::Random(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt).map_err(|e| HashError::Argon2(e.to_string()))?;

    let hash = argon2id(params.argon2_params()?)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| HashError::Argon2(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify `password` against an encoded hash.
///
/// Returns `Ok(false)` for a wrong password. A malformed encoded string is an
/// error, never a mismatch.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(encoded).map_err(|e| HashError::Malformed(e.to_string()))?;
    if parsed.algorithm != argon2::ARGON2ID_IDENT {
        return Err(HashError::UnsupportedAlgorithm(parsed.algorithm.to_string()));
    }
    match parsed.version {
        Some(v) if v == Version::V0x13 as u32 => {}
        Some(v) => return Err(HashError::IncompatibleVersion(v)),
        None => return Err(HashError::Malformed("missing version".into())),
    }

    let params = Params::try_from(&parsed).map_err(|e| HashError::Malformed(e.to_string()))?;
    let stored = parsed
        .hash
        .ok_or_else(|| HashError::Malformed("missing hash".into()))?;
    let mut salt_buf = [0u8; Salt::MAX_LENGTH];
    let salt = parsed
        .salt
        .ok_or_else(|| HashError::Malformed("missing salt".into()))?
        .decode_b64(&mut salt_buf)
        .map_err(|e| HashError::Malformed(e.to_string()))?;

    let mut computed = vec![0u8; stored.len()];
    argon2id(params)
        .hash_password_into(password.as_bytes(), salt, &mut computed)
        .map_err(|e| HashError::Argon2(e.to_string()))?;

    let matched = constant_time_eq(&computed, stored.as_bytes());
    if !matched {
        tracing::debug!("password hash mismatch");
    }
    Ok(matched)
}

/// Compares two byte strings without short-circuiting on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> HashParams {
        HashParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
            salt_length: 16,
            output_length: 32,
        }
    }

    #[test]
    fn test_hash_and_verify_password() {
        let password = "my-secure-password-123!";
        let hash = hash_password(password, &cheap()).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2id$v=19$m=64,t=1,p=1$"));
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_hash_produces_different_salts() {
        let hash1 = hash_password("same-password", &cheap()).unwrap();
        let hash2 = hash_password("same-password", &cheap()).unwrap();
        assert_ne!(hash1, hash2);
        assert!(verify_password("same-password", &hash1).unwrap());
        assert!(verify_password("same-password", &hash2).unwrap());
    }

    #[test]
    fn verify_uses_embedded_parameters() {
        let old = HashParams {
            memory_kib: 32,
            iterations: 2,
            parallelism: 1,
            salt_length: 8,
            output_length: 24,
        };
        let hash = hash_password("rotated-defaults", &old).unwrap();
        assert!(hash.contains("$m=32,t=2,p=1$"));
        // Current defaults are irrelevant to verification.
        assert_ne!(HashParams::default(), old);
        assert!(verify_password("rotated-defaults", &hash).unwrap());
    }

    #[test]
    fn malformed_hashes_are_errors_not_mismatches() {
        let valid = hash_password("password", &cheap()).unwrap();

        assert!(matches!(
            verify_password("password", "not-a-valid-hash"),
            Err(HashError::Malformed(_))
        ));
        assert!(matches!(
            verify_password("password", "$argon2id$v=19$m=64,t=1,p=1$abc"),
            Err(HashError::Malformed(_))
        ));
        assert!(matches!(
            verify_password("password", &valid.replacen("m=64", "m=x", 1)),
            Err(HashError::Malformed(_))
        ));
        assert!(matches!(
            verify_password("password", &valid.replacen("$argon2id$", "$argon2i$", 1)),
            Err(HashError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            verify_password("password", &valid.replacen("$v=19$", "$v=16$", 1)),
            Err(HashError::IncompatibleVersion(16))
        ));
    }

    #[test]
    fn duplicated_parameters_are_rejected() {
        let valid = hash_password("password", &cheap()).unwrap();
        let duplicated = valid.replacen("m=64,t=1,p=1", "m=64,t=1,p=1,m=9", 1);
        assert!(matches!(
            verify_password("password", &duplicated),
            Err(HashError::Malformed(_))
        ));
    }

    #[test]
    fn salt_and_hash_are_unpadded_base64() {
        let hash = hash_password("password", &cheap()).unwrap();
        let fields: Vec<&str> = hash.split('$').collect();
        assert_eq!(fields.len(), 6);
        assert!(!fields[4].contains('='));
        assert!(!fields[5].contains('='));
        // 16-byte salt, 32-byte output
        assert_eq!(fields[4].len(), 22);
        assert_eq!(fields[5].len(), 43);
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn default_params_pass_check() {
        assert!(HashParams::default().check().is_ok());
        let short = HashParams {
            salt_length: 4,
            ..cheap()
        };
        assert!(short.check().is_err());
        let long = HashParams {
            salt_length: 64,
            ..cheap()
        };
        assert!(long.check().is_err());
    }
}
