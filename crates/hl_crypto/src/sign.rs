//! Signatures: RSASSA-PKCS1-v1_5 over SHA-256 (deterministic).

use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::keys::{PrivateIdentityKey, PublicIdentityKey};

/// Sign arbitrary bytes; returns the raw `k`-byte signature.
pub fn sign(data: &[u8], private: &PrivateIdentityKey) -> Result<Vec<u8>, CryptoError> {
    let key = SigningKey::<Sha256>::new(private.inner().clone());
    key.try_sign(data)
        .map(|sig| sig.to_vec())
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

/// Total: any mismatch, including malformed signature bytes, is `false`.
pub fn verify(data: &[u8], signature: &[u8], public: &PublicIdentityKey) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public.inner().clone())
        .verify(data, &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{alice, bob};

    #[test]
    fn sign_and_verify() {
        let sig = sign(b"This message needs to be signed", alice().private()).unwrap();
        assert!(verify(b"This message needs to be signed", &sig, &alice().public));
        assert!(!verify(b"Different message", &sig, &alice().public));
    }

    #[test]
    fn unrelated_key_rejects() {
        let sig = sign(b"payload", alice().private()).unwrap();
        assert!(!verify(b"payload", &sig, &bob().public));
    }

    #[test]
    fn deterministic() {
        let a = sign(b"same bytes", alice().private()).unwrap();
        let b = sign(b"same bytes", alice().private()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_signature_is_false_not_error() {
        assert!(!verify(b"payload", b"", &alice().public));
        assert!(!verify(b"payload", &[0xFF; 3], &alice().public));
        let mut sig = sign(b"payload", alice().private()).unwrap();
        sig[10] ^= 0x01;
        assert!(!verify(b"payload", &sig, &alice().public));
    }
}
