// src/zkp/schnorr.rs
//! # Schnorr Proof of Knowledge
//!
//! Interactive Schnorr identification over the multiplicative group modulo a prime `p`.
//! The employer proves knowledge of `x` with `y = g^x mod p` without sending `x`:
//!
//! 1. prover samples `r` in `[1, p-1)` and commits `R = g^r mod p`
//! 2. ledger answers with a challenge `c` derived after seeing `R`
//! 3. prover responds `s = (r + c·x) mod (p-1)`
//! 4. verifier accepts iff `g^s ≡ R · y^c (mod p)`
//!
//! ## Security Considerations
//! - The secret is `x = SHA-256(material) mod p`. Reducing a hash modulo `p` is not a sound
//!   group binding; a production deployment needs a prime-order subgroup and a
//!   domain-separated derivation, with the security argument redone.
//! - With the default toy parameters (`g = 2`, `p = 23`) proofs are forgeable by exhaustive
//!   search. The group is injected configuration so a cryptographically sized prime can be
//!   substituted without touching the protocol.
//! - A [`ProofCommitment`] is consumed by [`ProofCommitment::respond`], so a nonce can never
//!   answer two challenges.

use num_bigint::{BigUint, RandBigInt};
use rand::Rng;
use thiserror::Error;

use crate::utils::crypto::hash_data;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchnorrError {
    #[error("modulus must be a prime greater than 3, got {0}")]
    InvalidModulus(String),

    #[error("generator must lie in (1, p), got {0}")]
    InvalidGenerator(String),

    #[error("not a decimal integer: {0:?}")]
    Parse(String),
}

/// Group parameters `(g, p)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchnorrGroup {
    generator: BigUint,
    modulus: BigUint,
}

impl SchnorrGroup {
    /// Validates and wraps group parameters.
    ///
    /// # Errors
    /// - `InvalidModulus` if `p <= 3` or `p` is not (probably) prime
    /// - `InvalidGenerator` if `g` is not in `(1, p)`
    pub fn new(generator: BigUint, modulus: BigUint) -> Result<Self, SchnorrError> {
        if modulus <= BigUint::from(3u32) || !is_probable_prime(&modulus) {
            return Err(SchnorrError::InvalidModulus(modulus.to_string()));
        }
        if generator <= BigUint::from(1u32) || generator >= modulus {
            return Err(SchnorrError::InvalidGenerator(generator.to_string()));
        }
        Ok(Self { generator, modulus })
    }

    /// Parses decimal `g` and `p`, as found in configuration.
    pub fn from_decimal(generator: &str, modulus: &str) -> Result<Self, SchnorrError> {
        let parse = |value: &str| {
            value
                .trim()
                .parse::<BigUint>()
                .map_err(|_| SchnorrError::Parse(value.to_string()))
        };
        Self::new(parse(generator)?, parse(modulus)?)
    }

    /// The demonstration parameters `g = 2`, `p = 23`. Not secure.
    pub fn toy() -> Self {
        Self {
            generator: BigUint::from(2u32),
            modulus: BigUint::from(23u32),
        }
    }

    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Modulus of exponent arithmetic, `p - 1`.
    pub fn exponent_modulus(&self) -> BigUint {
        &self.modulus - 1u32
    }

    /// `g^e mod p`
    pub fn exp(&self, exponent: &BigUint) -> BigUint {
        self.generator.modpow(exponent, &self.modulus)
    }

    /// Reduces a secret digest into the group: `x = int(digest) mod p`.
    pub fn reduce_secret(&self, digest: &[u8]) -> BigUint {
        BigUint::from_bytes_be(digest) % &self.modulus
    }

    /// Derives `x` from secret material such as the verifier's email.
    pub fn secret_from_material(&self, material: &str) -> BigUint {
        let normalized = crate::wallet::verifier_keyring::normalize_material(material);
        self.reduce_secret(&hash_data(normalized.as_bytes()))
    }

    /// Derives `x` from the hex digest of the secret material, as stored in the ACL.
    pub fn secret_from_hash_hex(&self, secret_hash: &str) -> Option<BigUint> {
        BigUint::parse_bytes(secret_hash.as_bytes(), 16).map(|value| value % &self.modulus)
    }

    /// Public commitment `y = g^x mod p` to a secret.
    pub fn public_key(&self, secret: &BigUint) -> BigUint {
        self.exp(secret)
    }

    /// Checks `g^s ≡ R · y^c (mod p)`.
    ///
    /// Commitments outside `[1, p)` are rejected outright.
    pub fn verify(&self, proof: &SchnorrProof, public_key: &BigUint) -> bool {
        if proof.commitment == BigUint::from(0u32) || proof.commitment >= self.modulus {
            return false;
        }
        let lhs = self.exp(&proof.response);
        let rhs = (&proof.commitment * public_key.modpow(&proof.challenge, &self.modulus))
            % &self.modulus;
        lhs == rhs
    }
}

/// Miller-Rabin bases. Deterministic below 3.3·10^24, probabilistic above.
const WITNESSES: [u32; 13] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41];

/// Miller-Rabin test over the fixed [`WITNESSES`].
fn is_probable_prime(n: &BigUint) -> bool {
    let one = BigUint::from(1u32);
    let two = BigUint::from(2u32);
    if *n < two {
        return false;
    }
    for &w in WITNESSES.iter() {
        let w = BigUint::from(w);
        if *n == w {
            return true;
        }
        if (n % &w) == BigUint::from(0u32) {
            return false;
        }
    }

    // n - 1 = d · 2^s with d odd
    let n_minus_one = n - &one;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'witness: for &w in WITNESSES.iter() {
        let mut x = BigUint::from(w).modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// A completed proof `(R, c, s)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchnorrProof {
    pub commitment: BigUint,
    pub challenge: BigUint,
    pub response: BigUint,
}

/// First move of the protocol: the ephemeral nonce `r` and its commitment `R`.
///
/// Not `Clone`: the nonce is spent by [`respond`](Self::respond).
#[derive(Debug)]
pub struct ProofCommitment {
    group: SchnorrGroup,
    nonce: BigUint,
    commitment: BigUint,
}

impl ProofCommitment {
    /// `R`, the value to send to the ledger in exchange for a challenge.
    pub fn commitment(&self) -> &BigUint {
        &self.commitment
    }

    /// Completes the proof: `s = (r + c·x) mod (p-1)`.
    pub fn respond(self, secret: &BigUint, challenge: BigUint) -> SchnorrProof {
        let order = self.group.exponent_modulus();
        let response = (&self.nonce + &challenge * secret) % &order;
        SchnorrProof {
            commitment: self.commitment,
            challenge,
            response,
        }
    }
}

/// Produces fresh commitments for a fixed group.
#[derive(Debug, Clone)]
pub struct SchnorrProver {
    group: SchnorrGroup,
}

impl SchnorrProver {
    pub fn new(group: SchnorrGroup) -> Self {
        Self { group }
    }

    pub fn group(&self) -> &SchnorrGroup {
        &self.group
    }

    /// Samples `r` uniformly from `[1, p-1)` and computes `R = g^r mod p`.
    pub fn commit<R: Rng + ?Sized>(&self, rng: &mut R) -> ProofCommitment {
        let nonce = rng.gen_biguint_range(&BigUint::from(1u32), &self.group.exponent_modulus());
        let commitment = self.group.exp(&nonce);
        ProofCommitment {
            group: self.group.clone(),
            nonce,
            commitment,
        }
    }
}
