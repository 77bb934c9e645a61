//! Amino-JSON signing for oracle transactions
//!
//! The sign bytes are the compact JSON of `StdSignDoc` with every object's
//! keys in sorted order. The feeder key signs them with secp256k1 ECDSA over SHA-256;
//! the signature is the 64-byte `r || s` form.

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use ethers::core::k256::ecdsa::{signature::Signer as _, Signature, SigningKey};
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::core::k256::PublicKey;
use ethers::signers::LocalWallet;

use super::types::{PubKey, StdSignDoc, StdSignature};

const SECP256K1_PUBKEY_TYPE: &str = "tendermint/PubKeySecp256k1";

/// Canonical bytes signed for `doc`
///
/// Every signed type declares its fields alphabetically, so the direct
/// serialisation is already key-sorted.
pub fn sign_bytes(doc: &StdSignDoc) -> Result<Vec<u8>> {
    serde_json::to_vec(doc).context("Failed to serialize sign doc")
}

/// Key of the feeder account
pub struct FeederKey {
    signing_key: SigningKey,
}

impl FeederKey {
    /// Load from a hex secret (with or without `0x`)
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .context("Invalid feeder private key")?;
        Ok(Self {
            signing_key: wallet.signer().clone(),
        })
    }

    /// Compressed public key in amino form
    pub fn public_key(&self) -> PubKey {
        let point = PublicKey::from(self.signing_key.verifying_key()).to_encoded_point(true);
        PubKey {
            key_type: SECP256K1_PUBKEY_TYPE.to_string(),
            value: general_purpose::STANDARD.encode(point.as_bytes()),
        }
    }

    /// Sign `doc`
    pub fn sign(&self, doc: &StdSignDoc) -> Result<StdSignature> {
        let bytes = sign_bytes(doc)?;
        let signature: Signature = self.signing_key.sign(&bytes);
        Ok(StdSignature {
            pub_key: self.public_key(),
            signature: general_purpose::STANDARD.encode(signature.to_bytes()),
        })
    }
}

impl std::fmt::Debug for FeederKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeederKey")
            .field("public_key", &self.public_key().value)
            .finish()
    }
}
