//! SCRAM-SHA-256 client side exchange.
//!
//! The exchange is three messages: client first (bare, `n,,` header since
//! the core performs no TLS channel binding), client final answering the
//! server challenge, and a verification of the server signature.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::StateError;

const NONCE_LEN: usize = 24;

/// The SASL mechanism name this client implements.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

type HmacSha256 = Hmac<Sha256>;

enum Phase {
    Initial { nonce: String },
    AwaitingFinal { server_signature: Vec<u8> },
    Done,
}

/// Client state of one SCRAM-SHA-256 authentication.
pub struct ScramSha256 {
    password: Vec<u8>,
    client_first_bare: String,
    phase: Phase,
}

impl ScramSha256 {
    pub fn new(password: &[u8]) -> Self {
        let raw: [u8; NONCE_LEN] = rand::thread_rng().gen();
        Self::with_nonce(password, BASE64.encode(raw))
    }

    fn with_nonce(password: &[u8], nonce: String) -> Self {
        let client_first_bare = format!("n=,r={nonce}");
        Self {
            password: password.to_vec(),
            client_first_bare,
            phase: Phase::Initial { nonce },
        }
    }

    /// The client first message, sent with the mechanism selection.
    pub fn message(&self) -> Vec<u8> {
        format!("n,,{}", self.client_first_bare).into_bytes()
    }

    /// Answer the server first message with the client final message.
    pub fn update(&mut self, server_first: &[u8]) -> Result<Vec<u8>, StateError> {
        let Phase::Initial { nonce } = &self.phase else {
            return Err(StateError::new("unexpected SASL continue message"));
        };

        let server_first = std::str::from_utf8(server_first)
            .map_err(|_| StateError::new("server first message is not utf8"))?;

        let mut server_nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in server_first.split(',') {
            match attr.split_once('=') {
                Some(("r", v)) => server_nonce = Some(v.to_owned()),
                Some(("s", v)) => {
                    salt = Some(
                        BASE64
                            .decode(v)
                            .map_err(|_| StateError::new("invalid SCRAM salt"))?,
                    );
                }
                Some(("i", v)) => {
                    iterations = Some(
                        v.parse::<u32>()
                            .map_err(|_| StateError::new("invalid SCRAM iteration count"))?,
                    );
                }
                _ => {}
            }
        }
        let (Some(server_nonce), Some(salt), Some(iterations)) = (server_nonce, salt, iterations)
        else {
            return Err(StateError::new("incomplete server first message"));
        };
        if iterations == 0 {
            return Err(StateError::new("invalid SCRAM iteration count"));
        }
        if !server_nonce.starts_with(nonce.as_str()) {
            return Err(StateError::new("server nonce does not extend the client nonce"));
        }

        let salted_password = hi(&self.password, &salt, iterations);

        let client_key = mac(&salted_password, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(&client_key).into();

        let client_final_bare = format!("c=biws,r={server_nonce}");
        let auth_message =
            format!("{},{server_first},{client_final_bare}", self.client_first_bare);

        let client_signature = mac(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(&client_signature)
            .map(|(a, b)| a ^ b)
            .collect();

        let server_key = mac(&salted_password, b"Server Key");
        let server_signature = mac(&server_key, auth_message.as_bytes());
        self.phase = Phase::AwaitingFinal { server_signature };

        Ok(format!("{client_final_bare},p={}", BASE64.encode(proof)).into_bytes())
    }

    /// Verify the server final message.
    pub fn finish(&mut self, server_final: &[u8]) -> Result<(), StateError> {
        let Phase::AwaitingFinal { server_signature } = &self.phase else {
            return Err(StateError::new("unexpected SASL final message"));
        };

        let server_final = std::str::from_utf8(server_final)
            .map_err(|_| StateError::new("server final message is not utf8"))?;

        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(StateError::new(format!("SCRAM exchange failed: {err}")));
        }
        let Some(verifier) = server_final.strip_prefix("v=") else {
            return Err(StateError::new("invalid server final message"));
        };
        let verifier = BASE64
            .decode(verifier)
            .map_err(|_| StateError::new("invalid server signature"))?;

        if &verifier != server_signature {
            return Err(StateError::new("server signature does not verify"));
        }
        self.phase = Phase::Done;
        Ok(())
    }
}

fn mac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// The `Hi` function of RFC 5802: PBKDF2 with HMAC-SHA-256.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut block = salt.to_vec();
    block.extend_from_slice(&1u32.to_be_bytes());

    let mut prev = mac(password, &block);
    let mut result = prev.clone();
    for _ in 1..iterations {
        prev = mac(password, &prev);
        for (r, p) in result.iter_mut().zip(&prev) {
            *r ^= p;
        }
    }
    result
}
