use crate::{config::SecurityMode, key_exchange::sdes::SdesError, transport::TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no media session has been created")]
    NoSession,
    #[error("operation requires {expected:?} security but the session uses {actual:?}")]
    SecurityModeMismatch {
        expected: SecurityMode,
        actual: SecurityMode,
    },
    #[error("security mode {0:?} is not available")]
    UnsupportedSecurityMode(SecurityMode),
    #[error("the media session has been stopped")]
    SessionStopped,
    #[error("the codec list is empty")]
    NoCodecs,
    #[error("invalid DTMF digit {0:?}")]
    InvalidDigit(char),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Sdes(#[from] SdesError),
    #[cfg(feature = "zrtp")]
    #[error(transparent)]
    Zrtp(#[from] crate::key_exchange::zrtp::ZrtpError),
}
