//! SDES key exchange (RFC 4568), keys are exchanged in `a=crypto` SDP attributes

use super::{KeyExchange, ProtectError, Received};
use base64::{Engine, prelude::BASE64_STANDARD};
use rand::Rng;
use srtp::{CryptoSuite, SrtpError, SrtpPolicy, SrtpSession, SrtpStreamState};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum SdesError {
    #[error("malformed crypto attribute {0:?}")]
    InvalidAttribute(String),
    #[error("unsupported crypto suite {0:?}")]
    UnsupportedSuite(String),
    #[error("failed to decode base64 key in crypto attribute")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("key material too short, expected {expected} bytes, got {got}")]
    TruncatedKey { expected: usize, got: usize },
    #[error("local crypto context is not initialized")]
    NotInitialized,
    #[error("failed to create SRTP session")]
    CreateSrtpSession(#[from] SrtpError),
}

/// Parsed `a=crypto` attribute received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesNegotiation {
    pub tag: u32,
    pub suite: String,
    /// Base64 encoded master key & salt, without lifetime or MKI
    pub key_and_salt: String,
}

impl SdesNegotiation {
    /// Parse the value of a crypto attribute, e.g.
    /// `1 AES_CM_128_HMAC_SHA1_80 inline:WVNfX19zZW1jdGwgKCkgewkyMjA7fQp9CnVubGVz|2^20|1:32`
    pub fn parse(attribute: &str) -> Result<Self, SdesError> {
        let invalid = || SdesError::InvalidAttribute(attribute.into());

        let value = attribute.trim();
        let value = value.strip_prefix("a=").unwrap_or(value);
        let value = value.strip_prefix("crypto:").unwrap_or(value);

        let mut parts = value.split_ascii_whitespace();

        let tag = parts
            .next()
            .and_then(|tag| tag.parse().ok())
            .ok_or_else(invalid)?;
        let suite = parts.next().ok_or_else(invalid)?;
        let key_params = parts.next().ok_or_else(invalid)?;

        let key_and_salt = key_params
            .strip_prefix("inline:")
            .and_then(|params| params.split('|').next())
            .filter(|key| !key.is_empty())
            .ok_or_else(invalid)?;

        Ok(Self {
            tag,
            suite: suite.into(),
            key_and_salt: key_and_salt.into(),
        })
    }
}

impl fmt::Display for SdesNegotiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} inline:{}", self.tag, self.suite, self.key_and_salt)
    }
}

/// Snapshot of the local keying material, taken when a call is put on hold
#[derive(Clone)]
pub struct SavedCryptoState {
    tag: u32,
    suite: &'static CryptoSuite,
    master_key: Vec<u8>,
    master_salt: Vec<u8>,
    streams: Vec<SrtpStreamState>,
}

impl fmt::Debug for SavedCryptoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedCryptoState")
            .field("tag", &self.tag)
            .field("suite", &self.suite.name)
            .finish_non_exhaustive()
    }
}

struct CryptoContext {
    tag: u32,
    suite: &'static CryptoSuite,
    master_key: Vec<u8>,
    master_salt: Vec<u8>,
    session: SrtpSession,
}

impl CryptoContext {
    fn new(
        tag: u32,
        suite: &'static CryptoSuite,
        master_key: Vec<u8>,
        master_salt: Vec<u8>,
    ) -> Result<Self, SdesError> {
        let session = SrtpSession::new(SrtpPolicy::new(suite, &master_key, &master_salt)?)?;

        Ok(Self {
            tag,
            suite,
            master_key,
            master_salt,
            session,
        })
    }

    fn generate(tag: u32, suite: &'static CryptoSuite) -> Result<Self, SdesError> {
        let mut master_key = vec![0u8; suite.cipher_key_len];
        let mut master_salt = vec![0u8; suite.salt_len];
        rand::rng().fill_bytes(&mut master_key);
        rand::rng().fill_bytes(&mut master_salt);

        Self::new(tag, suite, master_key, master_salt)
    }

    fn same_key(&self, state: &SavedCryptoState) -> bool {
        self.suite.name == state.suite.name
            && self.master_key == state.master_key
            && self.master_salt == state.master_salt
    }

    fn key_and_salt(&self) -> String {
        let mut material = Vec::with_capacity(self.suite.master_len());
        material.extend_from_slice(&self.master_key);
        material.extend_from_slice(&self.master_salt);

        BASE64_STANDARD.encode(material)
    }
}

/// SRTP keyed by `a=crypto` attributes
///
/// The local context protects outgoing packets, the remote context verifies incoming ones.
#[derive(Default)]
pub struct SdesKeyExchange {
    local: Option<CryptoContext>,
    remote: Option<CryptoContext>,
}

impl fmt::Debug for SdesKeyExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdesKeyExchange")
            .field("local", &self.local.as_ref().map(|ctx| ctx.suite.name))
            .field("remote", &self.remote.as_ref().map(|ctx| ctx.suite.name))
            .finish()
    }
}

impl SdesKeyExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate fresh local keying material using the default suite
    pub fn init_local(&mut self) -> Result<(), SdesError> {
        self.local = Some(CryptoContext::generate(1, CryptoSuite::DEFAULT)?);
        Ok(())
    }

    /// The local crypto attribute values to put into the SDP
    pub fn local_crypto(&self) -> Vec<String> {
        self.local
            .iter()
            .map(|ctx| {
                SdesNegotiation {
                    tag: ctx.tag,
                    suite: ctx.suite.name.into(),
                    key_and_salt: ctx.key_and_salt(),
                }
                .to_string()
            })
            .collect()
    }

    pub fn local_suite(&self) -> Option<&'static CryptoSuite> {
        self.local.as_ref().map(|ctx| ctx.suite)
    }

    pub fn remote_suite(&self) -> Option<&'static CryptoSuite> {
        self.remote.as_ref().map(|ctx| ctx.suite)
    }

    pub fn local_master_key(&self) -> Option<&[u8]> {
        self.local.as_ref().map(|ctx| ctx.master_key.as_slice())
    }

    pub fn local_master_salt(&self) -> Option<&[u8]> {
        self.local.as_ref().map(|ctx| ctx.master_salt.as_slice())
    }

    pub fn remote_master_key(&self) -> Option<&[u8]> {
        self.remote.as_ref().map(|ctx| ctx.master_key.as_slice())
    }

    pub fn remote_master_salt(&self) -> Option<&[u8]> {
        self.remote.as_ref().map(|ctx| ctx.master_salt.as_slice())
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Install the peer's keying material
    ///
    /// Only the first successful call has an effect. When the peer chose a suite with a different
    /// authentication tag length the local material is regenerated for that suite.
    pub fn set_remote(&mut self, negotiation: &SdesNegotiation) -> Result<(), SdesError> {
        if self.remote.is_some() {
            log::debug!("remote crypto context already set, ignoring {}", negotiation.suite);
            return Ok(());
        }

        let Some(local) = &self.local else {
            return Err(SdesError::NotInitialized);
        };

        let suite = CryptoSuite::by_name(&negotiation.suite)
            .ok_or_else(|| SdesError::UnsupportedSuite(negotiation.suite.clone()))?;

        let mut material = BASE64_STANDARD.decode(&negotiation.key_and_salt)?;

        if material.len() < suite.master_len() {
            return Err(SdesError::TruncatedKey {
                expected: suite.master_len(),
                got: material.len(),
            });
        }

        material.truncate(suite.master_len());
        let master_salt = material.split_off(suite.cipher_key_len);

        let renegotiate_local = local.suite.auth_tag_len != suite.auth_tag_len
            || local.suite.cipher_key_len != suite.cipher_key_len;

        let remote = CryptoContext::new(negotiation.tag, suite, material, master_salt)?;

        if renegotiate_local {
            log::debug!(
                "peer selected {}, regenerating local crypto context (was {})",
                suite.name,
                local.suite.name
            );

            self.local = Some(CryptoContext::generate(negotiation.tag, suite)?);
        } else if let Some(local) = &mut self.local {
            local.tag = negotiation.tag;
        }

        self.remote = Some(remote);

        Ok(())
    }

    /// Snapshot the local keying material and the position of the protected streams
    pub fn save_state(&self) -> Option<SavedCryptoState> {
        self.local.as_ref().map(|ctx| SavedCryptoState {
            tag: ctx.tag,
            suite: ctx.suite,
            master_key: ctx.master_key.clone(),
            master_salt: ctx.master_salt.clone(),
            streams: ctx.session.stream_states(),
        })
    }

    /// Reinstall previously saved local keying material
    ///
    /// Streams protected with the same master key continue with their packet index, so no
    /// keystream is ever used twice. The remote context is dropped, the peer's keys must be
    /// negotiated again.
    pub fn restore_state(&mut self, state: SavedCryptoState) -> Result<(), SdesError> {
        match &mut self.local {
            Some(local) if local.same_key(&state) => {
                local.tag = state.tag;
            }
            local => {
                let mut ctx =
                    CryptoContext::new(state.tag, state.suite, state.master_key, state.master_salt)?;
                ctx.session.resume_streams(&state.streams);

                *local = Some(ctx);
            }
        }

        self.remote = None;

        Ok(())
    }
}

impl KeyExchange for SdesKeyExchange {
    fn protect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError> {
        let local = self.local.as_mut().ok_or(ProtectError::NoContext)?;
        local.session.protect_rtp(packet)?;
        Ok(())
    }

    fn unprotect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError> {
        let remote = self.remote.as_mut().ok_or(ProtectError::NoContext)?;
        remote.session.unprotect_rtp(packet)?;
        Ok(Received::Media)
    }

    fn protect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError> {
        let local = self.local.as_mut().ok_or(ProtectError::NoContext)?;
        local.session.protect_rtcp(packet)?;
        Ok(())
    }

    fn unprotect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError> {
        let remote = self.remote.as_mut().ok_or(ProtectError::NoContext)?;
        remote.session.unprotect_rtcp(packet)?;
        Ok(Received::Media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attribute() {
        let negotiation = SdesNegotiation::parse(
            "a=crypto:2 AES_CM_128_HMAC_SHA1_32 inline:NzB4d1BINUAvLEw6UzF3WSJ+PSdFcGdUJShpX1Zj|2^20|1:32",
        )
        .unwrap();

        assert_eq!(negotiation.tag, 2);
        assert_eq!(negotiation.suite, "AES_CM_128_HMAC_SHA1_32");
        assert_eq!(
            negotiation.key_and_salt,
            "NzB4d1BINUAvLEw6UzF3WSJ+PSdFcGdUJShpX1Zj"
        );

        assert!(SdesNegotiation::parse("1 AES_CM_128_HMAC_SHA1_80").is_err());
        assert!(SdesNegotiation::parse("x AES_CM_128_HMAC_SHA1_80 inline:abcd").is_err());
        assert!(SdesNegotiation::parse("1 AES_CM_128_HMAC_SHA1_80 key:abcd").is_err());
    }

    #[test]
    fn set_remote_requires_local() {
        let mut sdes = SdesKeyExchange::new();
        let negotiation = SdesNegotiation::parse(
            "1 AES_CM_128_HMAC_SHA1_80 inline:NzB4d1BINUAvLEw6UzF3WSJ+PSdFcGdUJShpX1Zj",
        )
        .unwrap();

        assert!(matches!(
            sdes.set_remote(&negotiation),
            Err(SdesError::NotInitialized)
        ));
    }

    #[test]
    fn debug_hides_keys() {
        let mut sdes = SdesKeyExchange::new();
        sdes.init_local().unwrap();

        let state = sdes.save_state().unwrap();
        let printed = format!("{state:?}");
        assert!(printed.contains("AES_CM_128_HMAC_SHA1_80"));
        assert!(!printed.contains("master_key"));
    }
}
