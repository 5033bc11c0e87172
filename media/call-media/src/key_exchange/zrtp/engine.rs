use srtp::CryptoSuite;
use std::{fmt, io, path::Path, time::Instant};

/// Severity of a message reported by the ZRTP engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Severe,
    /// ZRTP protocol error, sent or received in an `Error` packet
    ZrtpError,
}

/// SRTP keying material derived by the handshake
#[derive(Clone)]
pub struct ZrtpSecrets {
    pub suite: &'static CryptoSuite,
    /// Protects packets sent by this side
    pub local_key: Vec<u8>,
    pub local_salt: Vec<u8>,
    /// Verifies packets sent by the peer
    pub remote_key: Vec<u8>,
    pub remote_salt: Vec<u8>,
}

impl fmt::Debug for ZrtpSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZrtpSecrets")
            .field("suite", &self.suite.name)
            .finish_non_exhaustive()
    }
}

/// Events reported by the engine to the key exchange
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Keys are available, SRTP must be used from now on
    SecretsReady(ZrtpSecrets),
    /// Keys must no longer be used
    SecretsOff,
    SecureOn { cipher: String },
    SecureOff,
    ShowSas { sas: String, verified: bool },
    /// The peer never answered the Hello packets
    NotSupportedByPeer,
    /// The peer sent a GoClear and waits for the user to confirm
    ConfirmGoClear,
    Message { severity: Severity, code: i32 },
    NegotiationFailed { severity: Severity, code: i32 },
}

/// Output of the engine, drained by the key exchange after every input
#[derive(Debug, Clone)]
pub enum EngineOutput {
    /// ZRTP packet to send to the peer over the RTP socket
    Packet(Vec<u8>),
    Event(EngineEvent),
}

/// Sans-IO ZRTP protocol engine
///
/// Implements the handshake (Hello, Commit, DHPart, Confirm) and the retained secret cache. It is
/// driven by the media session: received ZRTP packets and timer expirations go in, packets to
/// send and events come out via [`pop_output`](Self::pop_output).
pub trait ZrtpEngine: Send {
    /// Load the identity stored at `path`, creating it if it does not exist
    fn init_identity(&mut self, path: &Path) -> io::Result<()>;

    /// Start the handshake for the stream with the given SSRC
    fn start(&mut self, ssrc: u32);

    fn stop(&mut self);

    fn handle_packet(&mut self, packet: &[u8]);

    /// Point in time at which [`handle_timeout`](Self::handle_timeout) must be called next
    fn timeout(&self) -> Option<Instant>;

    fn handle_timeout(&mut self, now: Instant);

    fn pop_output(&mut self) -> Option<EngineOutput>;

    /// Hash of the local Hello packet for the `a=zrtp-hash` attribute, if already computed
    fn hello_hash(&self) -> Option<String>;

    /// Hash of the peer's Hello packet as received in the SDP
    fn set_peer_hello_hash(&mut self, hash: &str);

    fn set_sas_verified(&mut self, verified: bool);

    fn request_go_clear(&mut self);

    fn accept_go_clear(&mut self);

    fn accept_enrollment(&mut self, accept: bool);
}
