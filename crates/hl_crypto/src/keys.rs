//! Identity key management
//!
//! Each *user* has one long-term RSA `IdentityKeyPair`. The public half is
//! published through the user directory; the private half never leaves the
//! key vault except to sign or to unwrap per-message keys.
//!
//! Interchange encoding is PEM: SPKI for public keys, PKCS#8 for private keys.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const DEFAULT_MODULUS_BITS: usize = 4096;
/// Anything smaller is refused outright.
pub const MIN_MODULUS_BITS: usize = 2048;

// ── Public key ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentityKey(RsaPublicKey);

impl PublicIdentityKey {
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("public key PEM: {e}")))
    }

    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Modulus size in bytes (`k` in RFC 8017).
    pub fn modulus_bytes(&self) -> usize {
        self.0.size()
    }

    /// Human-readable fingerprint: BLAKE3 of the DER SPKI, truncated to
    /// 20 bytes (160 bits), hex-encoded in groups of 4 for display.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let hash = blake3::hash(der.as_bytes());
        let hex = hex::encode(&hash.as_bytes()[..20]);
        Ok(hex
            .as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" "))
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.0
    }
}

// ── Private key ───────────────────────────────────────────────────────────────

/// Private half of an identity. `RsaPrivateKey` zeroizes its limbs on drop.
#[derive(Clone)]
pub struct PrivateIdentityKey(RsaPrivateKey);

impl PrivateIdentityKey {
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKey("private key PEM".into()))
    }

    pub fn to_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn public_key(&self) -> PublicIdentityKey {
        PublicIdentityKey(self.0.to_public_key())
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl std::fmt::Debug for PrivateIdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateIdentityKey(<redacted>)")
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IdentityKeyPair {
    pub public: PublicIdentityKey,
    private: PrivateIdentityKey,
}

impl IdentityKeyPair {
    /// Generate a fresh keypair. CPU-heavy: run it off the async runtime.
    pub fn generate(modulus_bits: usize) -> Result<Self, CryptoError> {
        if modulus_bits < MIN_MODULUS_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "modulus must be at least {MIN_MODULUS_BITS} bits, got {modulus_bits}"
            )));
        }
        let secret = RsaPrivateKey::new(&mut OsRng, modulus_bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = PublicIdentityKey(secret.to_public_key());
        Ok(Self {
            public,
            private: PrivateIdentityKey(secret),
        })
    }

    pub fn from_private(private: PrivateIdentityKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }

    pub fn private(&self) -> &PrivateIdentityKey {
        &self.private
    }

    /// Export as `(public SPKI PEM, private PKCS#8 PEM)`.
    pub fn to_pem_pair(&self) -> Result<(String, Zeroizing<String>), CryptoError> {
        Ok((self.public.to_pem()?, self.private.to_pem()?))
    }
}

/// Generate an identity keypair and export it in interchange encoding.
pub fn generate_identity_key_pair(
    modulus_bits: usize,
) -> Result<(String, Zeroizing<String>), CryptoError> {
    IdentityKeyPair::generate(modulus_bits)?.to_pem_pair()
}
