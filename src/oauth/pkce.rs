use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const CODE_CHALLENGE_METHOD: &str = "S256";

pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
}

pub fn generate_pkce() -> PkceChallenge {
    let code_verifier = random_urlsafe(32);
    let code_challenge = challenge_for(&code_verifier);

    PkceChallenge {
        code_verifier,
        code_challenge,
    }
}

/// S256 challenge: `BASE64URL(SHA256(verifier))`.
pub fn challenge_for(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Random nonce for the `state` parameter.
pub fn generate_state_nonce() -> String {
    random_urlsafe(32)
}

fn random_urlsafe(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
