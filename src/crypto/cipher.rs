//! Streaming file encryption.
//!
//! Artifacts are AES-256-CTR transformed with a fresh random IV prepended
//! raw as the first [`IV_LEN`] bytes. CTR is length-preserving, so an
//! encrypted artifact is exactly `plaintext length + IV_LEN` bytes. The
//! mode provides confidentiality only: corrupted or truncated ciphertext
//! decrypts to garbage rather than failing, which is an accepted limitation.

use std::path::Path;

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

/// Symmetric key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Initialization vector length in bytes, one AES block
pub const IV_LEN: usize = 16;

/// Streaming chunk size. Files may be up to 1 GiB, never buffer them whole.
const CHUNK_SIZE: usize = 64 * 1024;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encrypted source does not exist")]
    SourceMissing,
    #[error("ciphertext shorter than the {IV_LEN}-byte IV prefix")]
    Truncated,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CipherError {
    /// Malformed-input failures, as opposed to transient IO.
    pub fn is_format(&self) -> bool {
        matches!(self, CipherError::SourceMissing | CipherError::Truncated)
    }
}

/// Generate fresh random key material of the cipher's required length.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encrypt `plaintext` to a new artifact at `dest`: a random IV followed by
/// the CTR-transformed stream. Returns total bytes written (IV included).
pub async fn encrypt<R>(
    mut plaintext: R,
    dest: &Path,
    key: &[u8; KEY_LEN],
) -> Result<u64, CipherError>
where
    R: AsyncRead + Unpin,
{
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let mut cipher = Aes256Ctr::new(key.into(), (&iv).into());

    let mut output = BufWriter::new(File::create(dest).await?);
    output.write_all(&iv).await?;
    let mut written = IV_LEN as u64;

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = plaintext.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        cipher.apply_keystream(&mut buf[..n]);
        output.write_all(&buf[..n]).await?;
        written += n as u64;
    }

    output.flush().await?;
    Ok(written)
}

/// Decrypt the artifact at `src` to a plaintext file at `dest`. Reads
/// exactly one IV prefix, then streams the remainder through the inverse
/// transform under `key`. The key must be the one the artifact was
/// encrypted under; there is no integrity check to catch a mismatch.
pub async fn decrypt(src: &Path, dest: &Path, key: &[u8; KEY_LEN]) -> Result<(), CipherError> {
    let file = File::open(src).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CipherError::SourceMissing
        } else {
            CipherError::Io(e)
        }
    })?;
    let mut input = BufReader::new(file);

    let mut iv = [0u8; IV_LEN];
    input.read_exact(&mut iv).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CipherError::Truncated
        } else {
            CipherError::Io(e)
        }
    })?;

    let mut cipher = Aes256Ctr::new(key.into(), (&iv).into());
    let mut output = BufWriter::new(File::create(dest).await?);

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        cipher.apply_keystream(&mut buf[..n]);
        output.write_all(&buf[..n]).await?;
    }

    output.flush().await?;
    Ok(())
}
