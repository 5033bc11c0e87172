//! Media transport & key exchange of a single call
//!
//! An [`RtpSessionFactory`] owns at most one [`RtpSession`] per call. The session moves audio
//! between the shared [`AudioBridge`] and the network, encrypting it with SRTP when the call
//! uses SDES or ZRTP for keying.

mod audio;
pub mod codec;
mod config;
mod error;
mod events;
mod factory;
pub mod key_exchange;
mod pipeline;
mod rate_limit;
mod session;
mod transport;

pub use audio::{AudioBridge, AudioFormat, RingBufferBridge};
pub use config::{
    DspConfig, KeyExchangeKind, SecurityMode, SecurityPrefs, SessionConfig, TransportTimeouts,
    UnknownKeyExchange, ZrtpConfig,
};
pub use error::Error;
pub use events::{CallEvent, CallEventKind, EventSink, NegotiationCategory};
#[cfg(feature = "zrtp")]
pub use factory::ZrtpEngineProvider;
pub use factory::RtpSessionFactory;
pub use pipeline::MediaCodecPipeline;
pub use session::{RtpSession, SessionState};
pub use transport::{Component, TransportDescriptor, TransportError};
