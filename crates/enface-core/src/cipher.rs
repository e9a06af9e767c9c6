//! Handshake token cipher: AES-256-CBC with a fresh random IV per token.
//!
//! Wire format is `hex(iv) ++ hex(ciphertext)`, lowercase, no delimiter. The
//! IV is always 16 bytes, so its 32 hex characters can be split off on decode.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::ids::{is_uuid, SessionId};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Separator between the token payload fields.
pub const FIELD_SEPARATOR: &str = "|";

/// Encrypt `plaintext` under `key`. Returns `hex(iv) ++ hex(ciphertext)`.
pub fn encrypt(plaintext: &str, key: &[u8; KEY_LEN]) -> String {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext =
        Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut out = String::with_capacity((IV_LEN + ciphertext.len()) * 2);
    out.push_str(&hex::encode(iv));
    out.push_str(&hex::encode(ciphertext));
    out
}

/// Decrypt a token produced by [`encrypt`].
pub fn decrypt(token: &str, key: &[u8; KEY_LEN]) -> Result<String, CipherError> {
    let bytes = hex::decode(token).map_err(|_| CipherError::InvalidEncoding)?;
    if bytes.len() < IV_LEN + BLOCK_LEN || (bytes.len() - IV_LEN) % BLOCK_LEN != 0 {
        return Err(CipherError::InvalidEncoding);
    }

    let (iv, ciphertext) = bytes.split_at(IV_LEN);
    let mut iv_block = [0u8; IV_LEN];
    iv_block.copy_from_slice(iv);

    let plaintext = Aes256CbcDec::new(key.into(), &iv_block.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
}

/// Copy a decoded secret into a fixed-size key.
pub fn key_from_bytes(bytes: &[u8]) -> Result<[u8; KEY_LEN], CipherError> {
    <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| CipherError::InvalidKeyLength(bytes.len()))
}

/// The cleartext carried inside a handshake token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPayload {
    pub session_id: SessionId,
    pub callback_url: String,
    pub command: String,
}

impl TokenPayload {
    pub fn compose(&self) -> String {
        [self.session_id.as_str(), &self.callback_url, &self.command].join(FIELD_SEPARATOR)
    }

    pub fn parse(plaintext: &str) -> Result<Self, CipherError> {
        let mut parts = plaintext.split(FIELD_SEPARATOR);
        let (Some(session_id), Some(callback_url), Some(command), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::InvalidPayload("expected 3 fields".into()));
        };
        if !is_uuid(session_id) {
            return Err(CipherError::InvalidPayload(format!("bad session id {session_id}")));
        }
        Ok(Self {
            session_id: SessionId::from_raw(session_id),
            callback_url: callback_url.to_owned(),
            command: command.to_owned(),
        })
    }
}

/// Symmetric token cipher bound to the project's secret key.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher([REDACTED])")
    }
}

impl TokenCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn seal(&self, payload: &TokenPayload) -> String {
        encrypt(&payload.compose(), &self.key)
    }

    pub fn open(&self, token: &str) -> Result<TokenPayload, CipherError> {
        TokenPayload::parse(&decrypt(token, &self.key)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid encoding")]
    InvalidEncoding,
    #[error("invalid UTF-8")]
    InvalidUtf8,
    #[error("invalid key length: {0} bytes")]
    InvalidKeyLength(usize),
    #[error("invalid token payload: {0}")]
    InvalidPayload(String),
}
