//! Content digest support: strict parsing, one-shot computation, and a
//! streaming hasher that wraps the blob writer so a body is hashed while
//! it is persisted, in a single pass.

use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use oci_spec::image::Digest;
use sha2::{Digest as Sha2Digest, Sha256, Sha512};
use thiserror::Error;
use tokio::io::AsyncWrite;

pub const SHA256: &str = "sha256";
pub const SHA512: &str = "sha512";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DigestError {
    #[error("malformed digest: {0}")]
    Malformed(String),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Parses `algorithm:hex`, accepting only sha256/sha512 with lowercase hex
/// of the exact length the algorithm produces.
pub fn parse(s: &str) -> Result<Digest, DigestError> {
    let parsed = Digest::from_str(s).map_err(|_| DigestError::Malformed(s.to_string()))?;
    let algorithm = parsed.algorithm().to_string();
    let expected_len = match algorithm.as_str() {
        SHA256 => 64,
        SHA512 => 128,
        _ => return Err(DigestError::UnsupportedAlgorithm(algorithm)),
    };
    let encoded = parsed.digest();
    if encoded.len() != expected_len
        || !encoded.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return Err(DigestError::Malformed(s.to_string()));
    }
    Ok(parsed)
}

pub fn is_valid(s: &str) -> bool {
    parse(s).is_ok()
}

/// One-shot digest of an in-memory buffer, in canonical `algorithm:hex` form.
pub fn compute(algorithm: &str, bytes: &[u8]) -> Result<Digest, DigestError> {
    let mut hasher = Hasher::new(algorithm)?;
    hasher.update(bytes);
    Ok(hasher.finalize())
}

/// True iff `bytes` hash to `expected` under its own algorithm.
pub fn verify(bytes: &[u8], expected: &Digest) -> Result<bool, DigestError> {
    let actual = compute(&expected.algorithm().to_string(), bytes)?;
    Ok(equals_constant_time(&actual, expected))
}

/// Compares two digests without early exit, so equality checks do not leak
/// matching-prefix length through timing.
pub fn equals_constant_time(a: &Digest, b: &Digest) -> bool {
    let a = a.to_string();
    let b = b.to_string();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Incremental hash state for the supported algorithms.
pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algorithm: &str) -> Result<Self, DigestError> {
        match algorithm {
            SHA256 => Ok(Hasher::Sha256(Sha256::new())),
            SHA512 => Ok(Hasher::Sha512(Sha512::new())),
            other => Err(DigestError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Digest {
        let (algorithm, encoded) = match self {
            Hasher::Sha256(h) => (SHA256, hex::encode(h.finalize())),
            Hasher::Sha512(h) => (SHA512, hex::encode(h.finalize())),
        };
        Digest::from_str(&format!("{algorithm}:{encoded}"))
            .expect("hex output of a supported algorithm is a well-formed digest")
    }
}

/// An `AsyncWrite` that forwards every byte to the inner writer and folds
/// the same bytes into a hash, so a stream is persisted and digested in
/// one consumption.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Hasher,
}

impl<W> DigestWriter<W> {
    pub fn new(inner: W, algorithm: &str) -> Result<Self, DigestError> {
        Ok(DigestWriter {
            inner,
            hasher: Hasher::new(algorithm)?,
        })
    }

    /// Consumes the writer, returning the inner sink and the final digest.
    pub fn finalize(self) -> (W, Digest) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for DigestWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.hasher.update(&buf[..written]);
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::io::AsyncWriteExt;

    const HELLO_SHA256: &str =
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[rstest]
    #[case::sha256(HELLO_SHA256, true)]
    #[case::sha512(
        "sha512:9b71d224bd62f3785d96d46ad3ea3d73319bfbc2890caadae2dff72519673ca72323c3d99ba5c11d7c7acc6e14b8c5da0c4663475c2e5c3adef46f73bcdec043",
        true
    )]
    #[case::uppercase_hex(
        "sha256:2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824",
        false
    )]
    #[case::short_hex("sha256:2cf24dba", false)]
    #[case::sha384(
        "sha384:59e1748777448c69de6b800d7a33bbfb9ff1b463e44354c3553bcdb9c666fa90125a3c79f90397bdf5f6a13de828684f",
        false
    )]
    #[case::no_separator("sha2562cf24dba", false)]
    #[case::empty_hex("sha256:", false)]
    fn parse_strictness(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(parse(input).is_ok(), ok, "{input}");
    }

    #[test]
    fn compute_known_vector() {
        let digest = compute(SHA256, b"hello").unwrap();
        assert_eq!(digest.to_string(), HELLO_SHA256);
    }

    #[test]
    fn verify_detects_mismatch() {
        let expected = parse(HELLO_SHA256).unwrap();
        assert!(verify(b"hello", &expected).unwrap());
        assert!(!verify(b"hell0", &expected).unwrap());
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        let a = compute(SHA256, b"hello").unwrap();
        let b = compute(SHA512, b"hello").unwrap();
        assert!(!equals_constant_time(&a, &b));
        assert!(equals_constant_time(&a, &a));
    }

    #[tokio::test]
    async fn digest_writer_tees_into_inner_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sink");
        let file = tokio::fs::File::create(&path).await.unwrap();
        let mut writer = DigestWriter::new(file, SHA256).unwrap();

        writer.write_all(b"hel").await.unwrap();
        writer.write_all(b"lo").await.unwrap();
        writer.flush().await.unwrap();

        let (_, digest) = writer.finalize();
        assert_eq!(digest.to_string(), HELLO_SHA256);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");
    }
}
