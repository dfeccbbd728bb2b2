//! Authentication request handling.
//!
//! Consumes `AuthenticationRequest` variants and produces the password
//! messages to send back: md5 double hashing, cleartext, and the
//! SCRAM-SHA-256 exchange.
use bytes::BytesMut;
use md5::{Digest, Md5};

use crate::error::{ConfigError, Error, StateError};
use crate::postgres::backend::Authentication;
use crate::postgres::frontend::{self, PasswordMessage, SaslInitialResponse, SaslResponse};
use crate::scram::{ScramSha256, SCRAM_SHA_256};

/// What an authentication message amounted to.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AuthOutcome {
    /// Authentication finished, startup continues.
    Ok,
    /// A response message was appended to the buffer and must be sent.
    Respond,
}

#[derive(Default)]
pub(crate) struct Authenticator {
    user: Option<Vec<u8>>,
    password: Option<Vec<u8>>,
    scram: Option<ScramSha256>,
}

impl Authenticator {
    pub fn set_credentials(&mut self, user: &str, password: Option<&[u8]>) {
        self.user = Some(user.as_bytes().to_vec());
        self.password = password.map(<[u8]>::to_vec);
    }

    fn password(&self) -> Result<&[u8], ConfigError> {
        self.password
            .as_deref()
            .ok_or_else(|| ConfigError::new("server requests a password, none was configured"))
    }

    pub fn handle(
        &mut self,
        auth: Authentication,
        out: &mut BytesMut,
    ) -> Result<AuthOutcome, Error> {
        match auth {
            Authentication::Ok => {
                self.scram = None;
                Ok(AuthOutcome::Ok)
            }
            Authentication::CleartextPassword => {
                frontend::write(PasswordMessage { password: self.password()? }, out);
                Ok(AuthOutcome::Respond)
            }
            Authentication::MD5Password { salt } => {
                let user = self
                    .user
                    .as_deref()
                    .ok_or_else(|| ConfigError::new("user missing for md5 authentication"))?;
                let hashed = md5_password(user, self.password()?, salt);
                frontend::write(PasswordMessage { password: hashed.as_bytes() }, out);
                Ok(AuthOutcome::Respond)
            }
            Authentication::Sasl { mechanisms } => {
                let offered: Vec<&str> = mechanisms
                    .split(|b| *b == 0)
                    .filter(|m| !m.is_empty())
                    .filter_map(|m| std::str::from_utf8(m).ok())
                    .collect();
                if !offered.contains(&SCRAM_SHA_256) {
                    return Err(StateError::new(format!(
                        "no supported SASL mechanism offered: {offered:?}",
                    ))
                    .into());
                }

                let scram = ScramSha256::new(self.password()?);
                let first = scram.message();
                frontend::write(
                    SaslInitialResponse { mechanism: SCRAM_SHA_256, data: &first },
                    out,
                );
                self.scram = Some(scram);
                Ok(AuthOutcome::Respond)
            }
            Authentication::SaslContinue { data } => {
                let scram = self
                    .scram
                    .as_mut()
                    .ok_or_else(|| StateError::new("unexpected SASL continue message"))?;
                let response = scram.update(&data)?;
                frontend::write(SaslResponse { data: &response }, out);
                Ok(AuthOutcome::Respond)
            }
            Authentication::SaslFinal { data } => {
                let mut scram = self
                    .scram
                    .take()
                    .ok_or_else(|| StateError::new("unexpected SASL final message"))?;
                scram.finish(&data)?;
                Ok(AuthOutcome::Respond)
            }
            other => Err(StateError::new(format!(
                "unsupported authentication request: {other:?}",
            ))
            .into()),
        }
    }
}

/// `md5` + hex(md5(hex(md5(password + user)) + salt)), the historical
/// postgres md5 scheme.
fn md5_password(user: &[u8], password: &[u8], salt: [u8; 4]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password);
    hasher.update(user);
    let inner = hex(&hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt);
    format!("md5{}", hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
