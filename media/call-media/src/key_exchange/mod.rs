//! Keying of the SRTP sessions protecting a call's media

use crate::config::SecurityMode;
use srtp::SrtpError;

pub mod sdes;
#[cfg(feature = "zrtp")]
pub mod zrtp;

/// What happened to a received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// The packet contains media and was decrypted in place (if necessary)
    Media,
    /// The packet belonged to the key exchange itself and has been consumed
    Consumed,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtectError {
    #[error("no crypto context for this direction yet")]
    NoContext,
    #[error(transparent)]
    Srtp(#[from] SrtpError),
}

/// Protects outgoing & verifies incoming media packets of a session
pub trait KeyExchange: Send {
    fn protect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError>;

    fn unprotect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError>;

    fn protect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError>;

    fn unprotect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError>;
}

/// The key exchange a session was created with, fixed for the lifetime of the session
pub(crate) enum SessionSecurity {
    Unencrypted,
    Sdes(sdes::SdesKeyExchange),
    #[cfg(feature = "zrtp")]
    Zrtp(zrtp::ZrtpKeyExchange),
}

impl SessionSecurity {
    pub(crate) fn mode(&self) -> SecurityMode {
        match self {
            SessionSecurity::Unencrypted => SecurityMode::None,
            SessionSecurity::Sdes(..) => SecurityMode::Sdes,
            #[cfg(feature = "zrtp")]
            SessionSecurity::Zrtp(..) => SecurityMode::Zrtp,
        }
    }

    fn as_key_exchange(&mut self) -> Option<&mut dyn KeyExchange> {
        match self {
            SessionSecurity::Unencrypted => None,
            SessionSecurity::Sdes(sdes) => Some(sdes),
            #[cfg(feature = "zrtp")]
            SessionSecurity::Zrtp(zrtp) => Some(zrtp),
        }
    }
}

impl KeyExchange for SessionSecurity {
    fn protect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError> {
        match self.as_key_exchange() {
            Some(kx) => kx.protect_rtp(packet),
            None => Ok(()),
        }
    }

    fn unprotect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError> {
        match self.as_key_exchange() {
            Some(kx) => kx.unprotect_rtp(packet),
            None => Ok(Received::Media),
        }
    }

    fn protect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError> {
        match self.as_key_exchange() {
            Some(kx) => kx.protect_rtcp(packet),
            None => Ok(()),
        }
    }

    fn unprotect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError> {
        match self.as_key_exchange() {
            Some(kx) => kx.unprotect_rtcp(packet),
            None => Ok(Received::Media),
        }
    }
}
