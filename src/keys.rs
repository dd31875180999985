use secp256k1::{global::SECP256K1, Keypair, XOnlyPublicKey};
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretKeyError {
    #[error("secret key should be at most 64-char hex, got {0} chars")]
    InvalidLength(usize),

    #[error("invalid hex encoding")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid secret key")]
    InvalidSecretKey,
}

#[derive(Error, Debug)]
pub enum PubKeyError {
    #[error("invalid hex encoding")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("public key not in curve")]
    NotInCurve,
}

/// A 32-byte secret key, always a valid secp256k1 scalar
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretKey(secp256k1::SecretKey);

impl SecretKey {
    /// generate a new random secret key
    pub fn generate() -> Self {
        Self(secp256k1::SecretKey::new(&mut secp256k1::rand::thread_rng()))
    }

    /// create a new secret key from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SecretKeyError> {
        Self::from_slice(&bytes)
    }

    /// create a new secret key from a slice that must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SecretKeyError> {
        // rejects wrong lengths, zero and scalars outside the curve order
        secp256k1::SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| SecretKeyError::InvalidSecretKey)
    }

    /// get the bytes of the secret key
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.secret_bytes()
    }

    /// create secret key from hex string, left-padding short input with zeroes
    pub fn from_hex(hex_str: &str) -> Result<Self, SecretKeyError> {
        let hex_str = hex_str.trim();
        if hex_str.len() > 64 {
            return Err(SecretKeyError::InvalidLength(hex_str.len()));
        }
        let hex_str = format!("{:0>64}", hex_str);

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&hex_str, &mut bytes)?;
        Self::from_bytes(bytes)
    }

    /// convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub(crate) fn keypair(&self) -> Keypair {
        Keypair::from_secret_key(SECP256K1, &self.0)
    }

    /// get the public key for this secret key
    pub fn pubkey(&self) -> PubKey {
        let (xonly_pk, _) = XOnlyPublicKey::from_keypair(&self.keypair());
        PubKey(xonly_pk.serialize())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<sk:{}>", self.pubkey().to_hex())
    }
}

/// a 32-byte x-only public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubKey(pub [u8; 32]);

impl PubKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, PubKeyError> {
        // ensure the public key is valid
        XOnlyPublicKey::from_slice(&bytes).map_err(|_| PubKeyError::NotInCurve)?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PubKeyError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PubKeyError::InvalidLength(bytes.len()))?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, PubKeyError> {
        if hex_str.len() != 64 {
            return Err(PubKeyError::InvalidLength(hex_str.len() / 2));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Self::from_bytes(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// shortened hex form for logs and display
    pub fn short(&self) -> String {
        self.to_hex()[0..16].to_string()
    }
}

impl FromStr for PubKey {
    type Err = PubKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PubKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PubKey::from_hex(&s).map_err(Error::custom)
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<pk:{}>", self.to_hex())
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
