//! HMAC-SHA256 request signing.
//!
//! The signer's concrete form is opaque to every other actor: only the Gate
//! ever holds one, and only the Gate ever holds the secret it wraps.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Produces an HMAC-SHA256 signature of an arbitrary message.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> String;
}

/// Signs with a secret loaded once at startup and never logged or exposed.
pub struct HmacSigner {
    secret: Vec<u8>,
}

impl HmacSigner {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

impl Signer for HmacSigner {
    fn sign(&self, message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(message);
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, mac.finalize().into_bytes())
    }
}

/// Public key and secret, each loaded from a file whose first line holds the value.
pub struct Credentials {
    pub api_key: String,
    pub signer: HmacSigner,
}

impl Credentials {
    pub fn load_from_files(key_path: &str, secret_path: &str) -> std::io::Result<Self> {
        let api_key = first_line(key_path)?;
        let secret = first_line(secret_path)?;
        Ok(Self {
            api_key,
            signer: HmacSigner::new(secret.into_bytes()),
        })
    }
}

fn first_line(path: &str) -> std::io::Result<String> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.lines().next().unwrap_or("").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic() {
        let signer = HmacSigner::new(b"secret".to_vec());
        let a = signer.sign(b"message");
        let b = signer.sign(b"message");
        assert_eq!(a, b);
    }

    #[test]
    fn sign_differs_by_message() {
        let signer = HmacSigner::new(b"secret".to_vec());
        assert_ne!(signer.sign(b"one"), signer.sign(b"two"));
    }

    #[test]
    fn load_from_files_reads_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key");
        let secret_path = dir.path().join("secret");
        std::fs::write(&key_path, "mykey\nignored second line\n").unwrap();
        std::fs::write(&secret_path, "mysecret\n").unwrap();

        let creds = Credentials::load_from_files(
            key_path.to_str().unwrap(),
            secret_path.to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(creds.api_key, "mykey");
    }
}
