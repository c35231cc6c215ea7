use hmac::{Hmac, Mac, digest::KeyInit};
use sha1::Sha1;
use sha2::Sha256;

/// Digest algorithms the platform may declare in a signature header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    /// Legacy `X-Hub-Signature`.
    Sha1,
    /// `X-Hub-Signature-256`.
    Sha256,
}

impl SignatureAlgorithm {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

/// Verify a `<algorithm>=<hex-digest>` header against the keyed digest of `body`.
///
/// A missing header is checked as an empty digest and therefore always fails.
pub fn verify_signature(body: &[u8], signature_header: Option<&str>, secret: &str) -> bool {
    let header = signature_header.unwrap_or("");
    let Some((prefix, digest)) = header.split_once('=') else {
        return false;
    };
    let Some(algorithm) = SignatureAlgorithm::from_prefix(prefix) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    match algorithm {
        SignatureAlgorithm::Sha1 => verify_mac::<Hmac<Sha1>>(body, secret, &expected),
        SignatureAlgorithm::Sha256 => verify_mac::<Hmac<Sha256>>(body, secret, &expected),
    }
}

/// Compute the header value the platform would send for `body`.
pub fn signature_header(algorithm: SignatureAlgorithm, body: &[u8], secret: &str) -> String {
    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => compute_mac::<Hmac<Sha1>>(body, secret),
        SignatureAlgorithm::Sha256 => compute_mac::<Hmac<Sha256>>(body, secret),
    };
    format!("{}={}", algorithm.prefix(), hex::encode(digest))
}

fn verify_mac<M: Mac + KeyInit>(body: &[u8], secret: &str, expected: &[u8]) -> bool {
    let mut mac =
        <M as KeyInit>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    // Constant-time comparison; also rejects a digest of the wrong length.
    mac.verify_slice(expected).is_ok()
}

fn compute_mac<M: Mac + KeyInit>(body: &[u8], secret: &str) -> Vec<u8> {
    let mut mac =
        <M as KeyInit>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn test_known_digest() {
        // Published example for the platform's webhook signatures.
        assert_eq!(
            signature_header(SignatureAlgorithm::Sha256, BODY, SECRET),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_round_trip() {
        let bodies: &[&[u8]] = &[b"", b"{}", BODY, br#"{"action":"requested"}"#];
        let secrets = ["", "s", SECRET];
        for body in bodies {
            for secret in secrets {
                for algorithm in [SignatureAlgorithm::Sha1, SignatureAlgorithm::Sha256] {
                    let header = signature_header(algorithm, body, secret);
                    assert!(verify_signature(body, Some(&header), secret), "{header}");
                }
            }
        }
    }

    #[test]
    fn test_body_mutations_fail() {
        let header = signature_header(SignatureAlgorithm::Sha256, BODY, SECRET);
        for i in 0..BODY.len() {
            let mut body = BODY.to_vec();
            body[i] ^= 0x01;
            assert!(!verify_signature(&body, Some(&header), SECRET), "byte {i}");
        }
    }

    #[test]
    fn test_signature_mutations_fail() {
        for algorithm in [SignatureAlgorithm::Sha1, SignatureAlgorithm::Sha256] {
            let header = signature_header(algorithm, BODY, SECRET);
            let (prefix, digest) = header.split_once('=').unwrap();
            let mut raw = hex::decode(digest).unwrap();
            for i in 0..raw.len() {
                raw[i] ^= 0x80;
                let mutated = format!("{prefix}={}", hex::encode(&raw));
                assert!(!verify_signature(BODY, Some(&mutated), SECRET), "byte {i}");
                raw[i] ^= 0x80;
            }
        }
    }

    #[test]
    fn test_malformed_headers() {
        let valid = signature_header(SignatureAlgorithm::Sha256, BODY, SECRET);
        let digest = valid.strip_prefix("sha256=").unwrap();
        let cases = [
            None,
            Some(""),
            Some("sha256="),
            Some(digest),
            Some("md5=d41d8cd98f00b204e9800998ecf8427e"),
            Some("sha256=zz"),
            Some("sha1=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"),
        ];
        for header in cases {
            assert!(!verify_signature(BODY, header, SECRET), "{header:?}");
        }
        assert!(!verify_signature(BODY, Some(&valid), "wrong secret"));
    }
}
