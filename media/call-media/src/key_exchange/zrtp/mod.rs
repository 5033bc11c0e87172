//! ZRTP key exchange (RFC 6189), keys are agreed on the media path
//!
//! The protocol itself is implemented by a [`ZrtpEngine`]. This module binds the engine to the
//! media session: it owns the identity file, routes ZRTP packets, turns the derived secrets into
//! SRTP sessions and translates the engine's events into [`CallEvent`](crate::CallEvent)s.

use super::{KeyExchange, ProtectError, Received};
use crate::{
    config::ZrtpConfig,
    events::{CallEventKind, EventSink, NegotiationCategory},
    rate_limit::OccurrenceLimiter,
};
use srtp::{SrtpError, SrtpPolicy, SrtpSession};
use std::{
    collections::VecDeque,
    fs, io,
    path::{Path, PathBuf},
    time::Instant,
};

mod engine;
mod identity;
mod messages;

pub use engine::{EngineEvent, EngineOutput, Severity, ZrtpEngine, ZrtpSecrets};
pub use identity::ZidFile;

const ZRTP_MAGIC_COOKIE: [u8; 4] = *b"ZRTP";

/// SRTP failures reported in a single warning
const DROPPED_PACKET_WARN_INTERVAL: u32 = 250;

#[derive(Debug, thiserror::Error)]
pub enum ZrtpError {
    #[error("failed to initialize ZRTP identity at {path}")]
    Identity {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create SRTP session from ZRTP secrets")]
    Srtp(#[from] SrtpError),
}

/// Returns if the packet received on the RTP socket is a ZRTP packet
pub fn is_zrtp_packet(packet: &[u8]) -> bool {
    packet.len() >= 12 && packet[0] & 0xF0 == 0x10 && packet[4..8] == ZRTP_MAGIC_COOKIE
}

struct SrtpContexts {
    outbound: SrtpSession,
    inbound: SrtpSession,
}

/// SRTP keyed by a ZRTP handshake
///
/// Media flows unencrypted until the engine reports its secrets.
pub struct ZrtpKeyExchange {
    engine: Box<dyn ZrtpEngine>,
    config: ZrtpConfig,
    events: EventSink,
    srtp: Option<SrtpContexts>,
    outgoing: VecDeque<Vec<u8>>,
    secure: bool,
    sas_shown: bool,
    dropped_packets: OccurrenceLimiter,
}

impl ZrtpKeyExchange {
    pub(crate) fn new(
        mut engine: Box<dyn ZrtpEngine>,
        config: ZrtpConfig,
        events: EventSink,
    ) -> Result<Self, ZrtpError> {
        init_identity(&mut *engine, &config.zid_path())?;

        Ok(Self {
            engine,
            config,
            events,
            srtp: None,
            outgoing: VecDeque::new(),
            secure: false,
            sas_shown: false,
            dropped_packets: OccurrenceLimiter::new(DROPPED_PACKET_WARN_INTERVAL),
        })
    }

    pub(crate) fn start(&mut self, ssrc: u32) {
        log::debug!("call {}: starting ZRTP for ssrc {ssrc:#010x}", self.events.call_id());

        self.engine.start(ssrc);
        self.drain_engine();
    }

    pub(crate) fn stop(&mut self) {
        self.engine.stop();
        self.drain_engine();
        self.srtp = None;
        self.outgoing.clear();
    }

    /// Hash of the local Hello packet to advertise in the SDP
    ///
    /// `None` if disabled or if the engine hasn't computed it yet.
    pub fn hello_hash(&self) -> Option<String> {
        if !self.config.hello_hash {
            return None;
        }

        self.engine.hello_hash()
    }

    /// Set the Hello hash the peer advertised in its SDP
    pub fn peer_hello_hash(&mut self, hash: &str) {
        self.engine.set_peer_hello_hash(hash);
        self.drain_engine();
    }

    /// Media is currently protected with keys from the handshake
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// The user confirmed the short authentication string
    pub fn set_sas_verified(&mut self) {
        self.engine.set_sas_verified(true);
        self.drain_engine();
    }

    pub fn reset_sas_verified(&mut self) {
        self.engine.set_sas_verified(false);
        self.drain_engine();
    }

    /// Ask the peer to switch back to unencrypted media
    pub fn request_go_clear(&mut self) {
        self.engine.request_go_clear();
        self.drain_engine();
    }

    /// Accept the peer's request to switch back to unencrypted media
    pub fn accept_go_clear(&mut self) {
        self.engine.accept_go_clear();
        self.drain_engine();
    }

    pub fn accept_enrollment(&mut self, accept: bool) {
        self.engine.accept_enrollment(accept);
        self.drain_engine();
    }

    /// Point in time at which the engine's next retransmission is due
    pub(crate) fn timeout(&self) -> Option<Instant> {
        self.engine.timeout()
    }

    pub(crate) fn handle_timeout(&mut self, now: Instant) {
        if self.timeout().is_some_and(|timeout| timeout <= now) {
            self.engine.handle_timeout(now);
            self.drain_engine();
        }
    }

    /// Next ZRTP packet to send on the RTP socket
    pub(crate) fn pop_packet(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    fn drain_engine(&mut self) {
        while let Some(output) = self.engine.pop_output() {
            match output {
                EngineOutput::Packet(packet) => self.outgoing.push_back(packet),
                EngineOutput::Event(event) => self.handle_event(event),
            }
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        let call_id = self.events.call_id().to_owned();

        match event {
            EngineEvent::SecretsReady(secrets) => match create_srtp(&secrets) {
                Ok(srtp) => {
                    log::debug!("call {call_id}: ZRTP secrets ready, using {}", secrets.suite.name);
                    self.srtp = Some(srtp);
                }
                Err(e) => {
                    log::error!("call {call_id}: failed to create SRTP session, {e}");

                    self.events.emit(CallEventKind::NegotiationFailed {
                        reason: e.to_string(),
                        category: NegotiationCategory::Severe,
                    });
                }
            },
            EngineEvent::SecretsOff => {
                log::debug!("call {call_id}: ZRTP secrets off");
                self.srtp = None;
            }
            EngineEvent::SecureOn { cipher } => {
                self.secure = true;
                self.events.emit(CallEventKind::SecureOn { cipher });
            }
            EngineEvent::SecureOff => {
                self.secure = false;
                self.events.emit(CallEventKind::SecureOff);
            }
            EngineEvent::ShowSas { sas, verified } => {
                if !self.config.display_sas || (self.config.display_sas_once && self.sas_shown) {
                    return;
                }

                self.sas_shown = true;
                self.events.emit(CallEventKind::ShowSas { sas, verified });
            }
            EngineEvent::NotSupportedByPeer => {
                if self.config.not_supported_warning {
                    self.events.emit(CallEventKind::NotSupportedByPeer);
                }
            }
            EngineEvent::ConfirmGoClear => self.events.emit(CallEventKind::ConfirmGoClear),
            EngineEvent::Message { severity, code } => self.show_message(severity, code),
            EngineEvent::NegotiationFailed { severity, code } => {
                let reason = messages::describe(severity, code);

                log::error!("call {call_id}: ZRTP negotiation failed, {reason}");

                self.events.emit(CallEventKind::NegotiationFailed {
                    reason,
                    category: failure_category(severity),
                });
            }
        }
    }

    fn show_message(&self, severity: Severity, code: i32) {
        let call_id = self.events.call_id();
        let reason = messages::describe(severity, code);

        match severity {
            Severity::Info => {
                log::info!("call {call_id}: ZRTP {reason}");
            }
            Severity::Warning => {
                log::warn!("call {call_id}: ZRTP {reason}");

                self.events.emit(CallEventKind::NegotiationWarning {
                    reason,
                    category: NegotiationCategory::Zrtp,
                });
            }
            Severity::Severe | Severity::ZrtpError => {
                log::error!("call {call_id}: ZRTP {reason}");

                self.events.emit(CallEventKind::NegotiationFailed {
                    reason,
                    category: failure_category(severity),
                });
            }
        }
    }

    /// Report a packet dropped by SRTP, once per streak of failures
    fn dropped(&mut self, error: SrtpError) -> ProtectError {
        let code = match error {
            SrtpError::ReplayFail | SrtpError::ReplayOld => messages::WARNING_SRTP_REPLAY_ERROR,
            _ => messages::WARNING_SRTP_AUTH_ERROR,
        };

        if self.dropped_packets.hit() {
            self.show_message(Severity::Warning, code);
        }

        ProtectError::Srtp(error)
    }
}

fn failure_category(severity: Severity) -> NegotiationCategory {
    match severity {
        Severity::Severe => NegotiationCategory::Severe,
        _ => NegotiationCategory::Zrtp,
    }
}

fn create_srtp(secrets: &ZrtpSecrets) -> Result<SrtpContexts, SrtpError> {
    Ok(SrtpContexts {
        outbound: SrtpSession::new(SrtpPolicy::new(
            secrets.suite,
            &secrets.local_key,
            &secrets.local_salt,
        )?)?,
        inbound: SrtpSession::new(SrtpPolicy::new(
            secrets.suite,
            &secrets.remote_key,
            &secrets.remote_salt,
        )?)?,
    })
}

/// Initialize the engine's identity, recreating the file once if it cannot be used
fn init_identity(engine: &mut dyn ZrtpEngine, path: &Path) -> Result<(), ZrtpError> {
    let identity_error = |source| ZrtpError::Identity {
        path: path.to_owned(),
        source,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(identity_error)?;
    }

    let Err(e) = engine.init_identity(path) else {
        return Ok(());
    };

    log::warn!(
        "failed to initialize ZRTP identity at {}, recreating it: {e}",
        path.display()
    );

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to remove {}: {e}", path.display()),
    }

    engine.init_identity(path).map_err(identity_error)
}

impl KeyExchange for ZrtpKeyExchange {
    fn protect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError> {
        if let Some(srtp) = &mut self.srtp {
            srtp.outbound.protect_rtp(packet)?;
        }

        Ok(())
    }

    fn unprotect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError> {
        if is_zrtp_packet(packet) {
            self.engine.handle_packet(packet);
            self.drain_engine();
            return Ok(Received::Consumed);
        }

        let Some(srtp) = &mut self.srtp else {
            return Ok(Received::Media);
        };

        match srtp.inbound.unprotect_rtp(packet) {
            Ok(()) => {
                self.dropped_packets.reset();
                Ok(Received::Media)
            }
            Err(e) => Err(self.dropped(e)),
        }
    }

    fn protect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), ProtectError> {
        if let Some(srtp) = &mut self.srtp {
            srtp.outbound.protect_rtcp(packet)?;
        }

        Ok(())
    }

    fn unprotect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<Received, ProtectError> {
        let Some(srtp) = &mut self.srtp else {
            return Ok(Received::Media);
        };

        match srtp.inbound.unprotect_rtcp(packet) {
            Ok(()) => Ok(Received::Media),
            Err(e) => Err(self.dropped(e)),
        }
    }
}
