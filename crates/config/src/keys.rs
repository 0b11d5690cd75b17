//! Key and signature parameters of a certificate entry.
//!
//! The YAML accepts the short x509 spellings
//! (`SHA256-RSA`, `ECDSA-SHA256`, `Ed25519`) as well as descriptive names.
//! [`KeySpec::resolve`] folds the loose combination of type, size, curve and
//! signature algorithm into one consistent key specification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Private key algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Rsa,
    #[serde(alias = "ec", alias = "ECDSA")]
    Ecdsa,
    #[serde(alias = "Ed25519")]
    Ed25519,
}

/// Elliptic curve for ECDSA keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KeyCurve {
    #[default]
    #[serde(alias = "p256", alias = "P-256", alias = "prime256v1", alias = "secp256r1")]
    P256,
    #[serde(alias = "p384", alias = "P-384", alias = "secp384r1")]
    P384,
}

/// CSR signature algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "SHA256-RSA", alias = "SHA256WithRSA")]
    Sha256WithRsa,
    #[serde(rename = "SHA384-RSA", alias = "SHA384WithRSA")]
    Sha384WithRsa,
    #[serde(rename = "SHA512-RSA", alias = "SHA512WithRSA")]
    Sha512WithRsa,
    #[serde(rename = "ECDSA-SHA256", alias = "ECDSAWithSHA256")]
    EcdsaWithSha256,
    #[serde(rename = "ECDSA-SHA384", alias = "ECDSAWithSHA384")]
    EcdsaWithSha384,
    #[serde(rename = "Ed25519", alias = "PureEd25519")]
    PureEd25519,
}

/// Digest used with an RSA signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaDigest {
    Sha256,
    Sha384,
    Sha512,
}

/// Supported RSA modulus sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaBits {
    B2048,
    B3072,
    B4096,
}

/// A consistent key + signature combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Rsa { bits: RsaBits, digest: RsaDigest },
    Ecdsa { curve: KeyCurve },
    Ed25519,
}

/// Default RSA key size when `keyBits` is absent
pub const DEFAULT_RSA_BITS: u32 = 2048;

impl KeySpec {
    /// Combine the loose entry fields into a key specification.
    pub fn resolve(
        key_type: KeyType,
        key_bits: u32,
        key_curve: Option<KeyCurve>,
        sig_alg: Option<SignatureAlgorithm>,
    ) -> Result<Self, String> {
        match key_type {
            KeyType::Rsa => {
                let bits = match key_bits {
                    0 | 2048 => RsaBits::B2048,
                    3072 => RsaBits::B3072,
                    4096 => RsaBits::B4096,
                    other => return Err(format!("unsupported RSA key size {}", other)),
                };
                let digest = match sig_alg {
                    None | Some(SignatureAlgorithm::Sha256WithRsa) => RsaDigest::Sha256,
                    Some(SignatureAlgorithm::Sha384WithRsa) => RsaDigest::Sha384,
                    Some(SignatureAlgorithm::Sha512WithRsa) => RsaDigest::Sha512,
                    Some(other) => {
                        return Err(format!("signature algorithm {} needs a non-RSA key", other))
                    }
                };
                Ok(KeySpec::Rsa { bits, digest })
            }
            KeyType::Ecdsa => {
                let curve = match (key_curve, sig_alg) {
                    (Some(curve), None) => curve,
                    (None, None) | (None, Some(SignatureAlgorithm::EcdsaWithSha256)) => {
                        KeyCurve::P256
                    }
                    (None, Some(SignatureAlgorithm::EcdsaWithSha384)) => KeyCurve::P384,
                    (Some(KeyCurve::P256), Some(SignatureAlgorithm::EcdsaWithSha256)) => {
                        KeyCurve::P256
                    }
                    (Some(KeyCurve::P384), Some(SignatureAlgorithm::EcdsaWithSha384)) => {
                        KeyCurve::P384
                    }
                    (curve, Some(sig)) => {
                        return Err(format!(
                            "signature algorithm {} does not match ECDSA curve {}",
                            sig,
                            curve.unwrap_or_default()
                        ))
                    }
                };
                Ok(KeySpec::Ecdsa { curve })
            }
            KeyType::Ed25519 => match sig_alg {
                None | Some(SignatureAlgorithm::PureEd25519) => Ok(KeySpec::Ed25519),
                Some(other) => Err(format!(
                    "signature algorithm {} cannot be used with an Ed25519 key",
                    other
                )),
            },
        }
    }
}

impl fmt::Display for KeyCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCurve::P256 => write!(f, "P256"),
            KeyCurve::P384 => write!(f, "P384"),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureAlgorithm::Sha256WithRsa => "SHA256-RSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384-RSA",
            SignatureAlgorithm::Sha512WithRsa => "SHA512-RSA",
            SignatureAlgorithm::EcdsaWithSha256 => "ECDSA-SHA256",
            SignatureAlgorithm::EcdsaWithSha384 => "ECDSA-SHA384",
            SignatureAlgorithm::PureEd25519 => "Ed25519",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsa_defaults() {
        let spec = KeySpec::resolve(KeyType::Rsa, 0, None, None).unwrap();
        assert_eq!(
            spec,
            KeySpec::Rsa {
                bits: RsaBits::B2048,
                digest: RsaDigest::Sha256
            }
        );
    }

    #[test]
    fn test_rsa_rejects_odd_size() {
        let err = KeySpec::resolve(KeyType::Rsa, 1024, None, None).unwrap_err();
        assert!(err.contains("1024"));
    }

    #[test]
    fn test_rsa_rejects_ecdsa_signature() {
        assert!(KeySpec::resolve(
            KeyType::Rsa,
            4096,
            None,
            Some(SignatureAlgorithm::EcdsaWithSha256)
        )
        .is_err());
    }

    #[test]
    fn test_ecdsa_curve_from_signature() {
        let spec = KeySpec::resolve(
            KeyType::Ecdsa,
            0,
            None,
            Some(SignatureAlgorithm::EcdsaWithSha384),
        )
        .unwrap();
        assert_eq!(spec, KeySpec::Ecdsa { curve: KeyCurve::P384 });
    }

    #[test]
    fn test_ecdsa_mismatched_curve() {
        let err = KeySpec::resolve(
            KeyType::Ecdsa,
            0,
            Some(KeyCurve::P256),
            Some(SignatureAlgorithm::EcdsaWithSha384),
        )
        .unwrap_err();
        assert!(err.contains("P256"));
    }

    #[test]
    fn test_ed25519() {
        assert_eq!(
            KeySpec::resolve(KeyType::Ed25519, 0, None, None).unwrap(),
            KeySpec::Ed25519
        );
        assert!(KeySpec::resolve(
            KeyType::Ed25519,
            0,
            None,
            Some(SignatureAlgorithm::Sha256WithRsa)
        )
        .is_err());
    }

    #[test]
    fn test_go_style_names_parse() {
        let sig: SignatureAlgorithm = serde_yaml::from_str("SHA384-RSA").unwrap();
        assert_eq!(sig, SignatureAlgorithm::Sha384WithRsa);
        let sig: SignatureAlgorithm = serde_yaml::from_str("ECDSAWithSHA256").unwrap();
        assert_eq!(sig, SignatureAlgorithm::EcdsaWithSha256);
        let curve: KeyCurve = serde_yaml::from_str("prime256v1").unwrap();
        assert_eq!(curve, KeyCurve::P256);
        let key_type: KeyType = serde_yaml::from_str("ec").unwrap();
        assert_eq!(key_type, KeyType::Ecdsa);
    }
}
