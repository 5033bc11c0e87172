//! SRTP & SRTCP packet protection (RFC 3711)
//!
//! Implements the AES counter mode ciphers with HMAC-SHA1 authentication, which are the suites
//! negotiated through SDES `a=crypto` attributes or derived by ZRTP.

mod error;
mod kdf;
mod replay;
mod session;
mod suite;

pub use error::SrtpError;
pub use kdf::SessionKeys;
pub use session::{SrtpPolicy, SrtpSession, SrtpStreamState};
pub use suite::{CryptoSuite, SUITES};
