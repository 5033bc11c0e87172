use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

/// Security mode of a media session, chosen once per call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// Plain RTP
    #[default]
    None,
    /// SRTP using keys exchanged in the SDP (`a=crypto`)
    Sdes,
    /// SRTP using keys derived by the ZRTP media path key agreement
    Zrtp,
}

/// Key exchange preferred by the account when encryption is enabled
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeKind {
    #[default]
    Sdes,
    Zrtp,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown key exchange {0:?}")]
pub struct UnknownKeyExchange(pub String);

impl FromStr for KeyExchangeKind {
    type Err = UnknownKeyExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sdes") {
            Ok(Self::Sdes)
        } else if s.eq_ignore_ascii_case("zrtp") {
            Ok(Self::Zrtp)
        } else {
            Err(UnknownKeyExchange(s.into()))
        }
    }
}

/// Media security preferences of the account placing or receiving the call
#[derive(Debug, Default, Clone)]
pub struct SecurityPrefs {
    /// Encrypt the media stream using SRTP
    pub srtp_enabled: bool,
    /// Key exchange to use when `srtp_enabled` is set
    pub key_exchange: KeyExchangeKind,
    /// Continue the call with plain RTP when the SDES negotiation fails
    pub srtp_fallback: bool,
    /// Settings used when the ZRTP key exchange is active
    pub zrtp: ZrtpConfig,
}

#[derive(Debug, Clone)]
pub struct ZrtpConfig {
    /// Directory containing the identity file
    pub cache_dir: PathBuf,
    /// Name of the identity file inside `cache_dir`
    pub zid_file: String,
    /// Advertise the hello hash in the SDP offer
    pub hello_hash: bool,
    /// Forward short authentication strings to the call management layer
    pub display_sas: bool,
    /// Forward only the first short authentication string of a call
    pub display_sas_once: bool,
    /// Notify when the peer does not support ZRTP
    pub not_supported_warning: bool,
}

impl Default for ZrtpConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            zid_file: "sfl.zid".into(),
            hello_hash: true,
            display_sas: true,
            display_sas_once: false,
            not_supported_warning: true,
        }
    }
}

impl ZrtpConfig {
    /// Full path of the identity file
    pub fn zid_path(&self) -> PathBuf {
        self.cache_dir.join(&self.zid_file)
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("ezk")
}

/// Bounds applied to every transport operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    /// Maximum time a single send may be delayed
    pub scheduling: Duration,
    /// Packets which couldn't be sent within this time are dropped
    pub expire: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            scheduling: Duration::from_millis(100),
            expire: Duration::from_secs(1),
        }
    }
}

/// Optional signal processing applied to captured and decoded audio
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DspConfig {
    /// Attenuate audio below the noise floor
    pub noise_suppression: bool,
    /// Normalize the audio level
    pub agc: bool,
}

/// Configuration of a single call's media session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier of the call, attached to every emitted event
    pub call_id: String,
    /// Local address of the RTP socket, RTCP is bound to the next port.
    ///
    /// When the port is 0 an even port is picked automatically.
    pub local_addr: SocketAddr,
    pub timeouts: TransportTimeouts,
    /// Payload type of RFC 4733 telephone events
    pub dtmf_payload_type: u8,
    /// Duration of a single DTMF digit
    pub dtmf_duration: Duration,
    /// Interval between RTCP reports
    pub rtcp_interval: Duration,
    pub dsp: DspConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_id: String::new(),
            local_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            timeouts: TransportTimeouts::default(),
            dtmf_payload_type: rtp::TelephoneEvent::DEFAULT_PAYLOAD_TYPE,
            dtmf_duration: Duration::from_millis(125),
            rtcp_interval: Duration::from_secs(5),
            dsp: DspConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ..Self::default()
        }
    }
}
