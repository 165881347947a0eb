//! Password generation and validation against a configurable complexity
//! policy.
//!
//! The engine is a pure collaborator: the provisioning core invokes
//! `generate`/`validate`/`estimate_entropy` and never re-implements the
//! rules. Entropy is estimated as `length * log2(pool size)` over the
//! enabled character pools.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use userforge_identity::types::policy::PasswordPolicy;
use userforge_identity::{ProvisionError, ProvisionResult};

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;

const GENERATION_ATTEMPTS: usize = 5;

/// Complexity table a password must satisfy.
///
/// `minimum_entropy` is the validation floor in bits. It is deliberately a
/// policy parameter rather than a constant: deployments disagree on the
/// right floor, so the table owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordComplexity {
    pub min_length: usize,
    pub max_length: usize,
    pub lower: bool,
    pub caps: bool,
    pub digits: bool,
    pub special: bool,
    pub minimum_entropy: f64,
}

impl Default for PasswordComplexity {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 20,
            lower: true,
            caps: true,
            digits: true,
            special: true,
            minimum_entropy: 50.0,
        }
    }
}

/// Password engine over one complexity table.
#[derive(Debug, Clone, Default)]
pub struct PasswordEngine {
    complexity: PasswordComplexity,
}

impl PasswordEngine {
    pub fn new(complexity: PasswordComplexity) -> Self {
        Self { complexity }
    }

    pub fn complexity(&self) -> &PasswordComplexity {
        &self.complexity
    }

    fn enabled_pools(&self) -> Vec<&'static str> {
        let mut pools = Vec::new();
        if self.complexity.lower {
            pools.push(LOWER);
        }
        if self.complexity.caps {
            pools.push(UPPER);
        }
        if self.complexity.digits {
            pools.push(DIGITS);
        }
        if self.complexity.special {
            pools.push(SPECIAL);
        }
        pools
    }

    /// Generate a password at the top of the allowed length range, with at
    /// least one character from every enabled pool.
    pub fn generate(&self) -> ProvisionResult<String> {
        let pools = self.enabled_pools();
        if pools.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "no character pools enabled".to_string(),
            ));
        }

        let combined: Vec<u8> = pools.iter().flat_map(|pool| pool.bytes()).collect();
        let length = self.complexity.max_length.max(pools.len());
        let mut rng = rand::thread_rng();

        for _ in 0..GENERATION_ATTEMPTS {
            let mut chars: Vec<u8> = pools
                .iter()
                .filter_map(|pool| pool.as_bytes().choose(&mut rng).copied())
                .collect();
            while chars.len() < length {
                if let Some(byte) = combined.choose(&mut rng) {
                    chars.push(*byte);
                }
            }
            chars.shuffle(&mut rng);

            let password = String::from_utf8(chars).expect("pools are ascii");
            if self.validate(&password) {
                return Ok(password);
            }
        }

        Err(ProvisionError::InvalidConfig(
            "unable to generate a password satisfying the complexity policy".to_string(),
        ))
    }

    /// Whether a password satisfies every enabled rule. All rules are
    /// checked so the debug log names each violated one.
    pub fn validate(&self, password: &str) -> bool {
        if password.is_empty() {
            debug!("password is empty");
            return false;
        }

        let mut passes = true;
        let length = password.chars().count();

        if length < self.complexity.min_length {
            debug!(length, minimum = self.complexity.min_length, "password below minimum length");
            passes = false;
        }
        if length > self.complexity.max_length {
            debug!(length, maximum = self.complexity.max_length, "password above maximum length");
            passes = false;
        }
        if self.complexity.lower && !password.chars().any(|c| c.is_ascii_lowercase()) {
            debug!("password lacks a lowercase letter");
            passes = false;
        }
        if self.complexity.caps && !password.chars().any(|c| c.is_ascii_uppercase()) {
            debug!("password lacks an uppercase letter");
            passes = false;
        }
        if self.complexity.digits && !password.chars().any(|c| c.is_ascii_digit()) {
            debug!("password lacks a digit");
            passes = false;
        }
        if self.complexity.special && !password.chars().any(|c| SPECIAL.contains(c)) {
            debug!("password lacks a special character");
            passes = false;
        }

        let entropy = self.estimate_entropy(password);
        if entropy < self.complexity.minimum_entropy {
            debug!(entropy, floor = self.complexity.minimum_entropy, "password entropy below floor");
            passes = false;
        }

        passes
    }

    /// Estimated Shannon entropy in bits, from the enabled pool size and
    /// the password length, rounded to two decimals.
    pub fn estimate_entropy(&self, password: &str) -> f64 {
        if password.is_empty() {
            return 0.0;
        }

        let pool_size: usize = self.enabled_pools().iter().map(|pool| pool.len()).sum();
        if pool_size == 0 {
            return 0.0;
        }

        let bits = password.chars().count() as f64 * (pool_size as f64).log2();
        (bits * 100.0).round() / 100.0
    }
}

impl PasswordPolicy for PasswordEngine {
    fn generate(&self) -> ProvisionResult<String> {
        PasswordEngine::generate(self)
    }

    fn validate(&self, password: &str) -> bool {
        PasswordEngine::validate(self, password)
    }

    fn estimate_entropy(&self, password: &str) -> f64 {
        PasswordEngine::estimate_entropy(self, password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_satisfy_the_policy() {
        let engine = PasswordEngine::default();

        for _ in 0..10 {
            let password = engine.generate().unwrap();
            assert_eq!(password.chars().count(), engine.complexity().max_length);
            assert!(engine.validate(&password));
        }
    }

    #[test]
    fn generated_passwords_differ() {
        let engine = PasswordEngine::default();
        let first = engine.generate().unwrap();
        let second = engine.generate().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn validation_rejects_missing_categories() {
        let engine = PasswordEngine::default();

        assert!(!engine.validate(""));
        assert!(!engine.validate("short1!A"));
        assert!(!engine.validate("alllowercasebutlong!"));
        assert!(!engine.validate("NOLOWERCASE123!!456"));
        assert!(!engine.validate("NoSpecialCharacter1x"));
        assert!(engine.validate("Sufficient!Pass123xx"));
    }

    #[test]
    fn entropy_scales_with_length() {
        let engine = PasswordEngine::default();
        let short = engine.estimate_entropy("abcdef");
        let long = engine.estimate_entropy("abcdefabcdef");
        assert!(long > short);
        assert_eq!(engine.estimate_entropy(""), 0.0);
    }

    #[test]
    fn entropy_floor_is_policy_driven() {
        let lax = PasswordEngine::new(PasswordComplexity {
            minimum_entropy: 10.0,
            caps: false,
            digits: false,
            special: false,
            min_length: 4,
            max_length: 8,
            ..PasswordComplexity::default()
        });
        assert!(lax.validate("abcdefgh"));

        let strict = PasswordEngine::new(PasswordComplexity {
            minimum_entropy: 200.0,
            ..PasswordComplexity::default()
        });
        assert!(!strict.validate("Sufficient!Pass123xx"));
    }

    #[test]
    fn generation_requires_at_least_one_pool() {
        let engine = PasswordEngine::new(PasswordComplexity {
            lower: false,
            caps: false,
            digits: false,
            special: false,
            ..PasswordComplexity::default()
        });
        assert!(engine.generate().is_err());
    }
}
