use crate::{
    audio::AudioBridge,
    codec::AudioCodec,
    config::{KeyExchangeKind, SecurityMode, SecurityPrefs, SessionConfig},
    error::Error,
    events::{CallEventKind, EventSink, NegotiationCategory},
    key_exchange::{
        SessionSecurity,
        sdes::{SdesKeyExchange, SdesNegotiation},
    },
    session::RtpSession,
    transport::TransportDescriptor,
};
use rtp::StatisticsSnapshot;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;

#[cfg(feature = "zrtp")]
use crate::key_exchange::zrtp::{ZrtpEngine, ZrtpKeyExchange};

/// Creates a new ZRTP protocol engine for every ZRTP session
#[cfg(feature = "zrtp")]
pub type ZrtpEngineProvider = Arc<dyn Fn() -> Box<dyn ZrtpEngine> + Send + Sync>;

/// Entry point of a call's media, owns at most one [`RtpSession`]
///
/// All operations are serialized, replacing the session never races with operations on it.
pub struct RtpSessionFactory {
    config: SessionConfig,
    bridge: Arc<dyn AudioBridge>,
    events: EventSink,
    prefs: SecurityPrefs,
    mode: SecurityMode,
    #[cfg(feature = "zrtp")]
    zrtp_engine: Option<ZrtpEngineProvider>,
    session: Mutex<Option<RtpSession>>,
}

impl RtpSessionFactory {
    pub fn new(config: SessionConfig, bridge: Arc<dyn AudioBridge>, events: EventSink) -> Self {
        Self {
            config,
            bridge,
            events,
            prefs: SecurityPrefs::default(),
            mode: SecurityMode::None,
            #[cfg(feature = "zrtp")]
            zrtp_engine: None,
            session: Mutex::new(None),
        }
    }

    /// Install the provider of ZRTP protocol engines
    #[cfg(feature = "zrtp")]
    pub fn with_zrtp_engine(mut self, provider: ZrtpEngineProvider) -> Self {
        self.zrtp_engine = Some(provider);
        self
    }

    /// Select the security mode from the account's preferences
    ///
    /// ZRTP falls back to SDES when ZRTP support isn't compiled in and is rejected if no engine
    /// provider was installed.
    pub fn configure(&mut self, prefs: SecurityPrefs) -> Result<SecurityMode, Error> {
        let mode = if !prefs.srtp_enabled {
            SecurityMode::None
        } else {
            match prefs.key_exchange {
                KeyExchangeKind::Sdes => SecurityMode::Sdes,
                #[cfg(feature = "zrtp")]
                KeyExchangeKind::Zrtp if self.zrtp_engine.is_none() => {
                    return Err(Error::UnsupportedSecurityMode(SecurityMode::Zrtp));
                }
                #[cfg(feature = "zrtp")]
                KeyExchangeKind::Zrtp => SecurityMode::Zrtp,
                #[cfg(not(feature = "zrtp"))]
                KeyExchangeKind::Zrtp => {
                    log::warn!(
                        "call {}: ZRTP support is not compiled in, using SDES",
                        self.config.call_id
                    );
                    SecurityMode::Sdes
                }
            }
        };

        log::debug!("call {}: using security mode {mode:?}", self.config.call_id);

        self.prefs = prefs;
        self.mode = mode;

        Ok(mode)
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.mode
    }

    fn create_security(&self, mode: SecurityMode) -> Result<SessionSecurity, Error> {
        match mode {
            SecurityMode::None => Ok(SessionSecurity::Unencrypted),
            SecurityMode::Sdes => {
                let mut sdes = SdesKeyExchange::new();
                sdes.init_local()?;
                Ok(SessionSecurity::Sdes(sdes))
            }
            #[cfg(feature = "zrtp")]
            SecurityMode::Zrtp => {
                let provider = self
                    .zrtp_engine
                    .as_ref()
                    .ok_or(Error::UnsupportedSecurityMode(SecurityMode::Zrtp))?;

                let zrtp =
                    ZrtpKeyExchange::new(provider(), self.prefs.zrtp.clone(), self.events.clone())?;

                Ok(SessionSecurity::Zrtp(zrtp))
            }
            #[cfg(not(feature = "zrtp"))]
            SecurityMode::Zrtp => Err(Error::UnsupportedSecurityMode(SecurityMode::Zrtp)),
        }
    }

    async fn replace_session(
        &self,
        slot: &mut Option<RtpSession>,
        mode: SecurityMode,
    ) -> Result<(), Error> {
        if let Some(mut previous) = slot.take() {
            previous.stop().await;
        }

        let security = self.create_security(mode)?;

        let session = RtpSession::new(
            self.config.clone(),
            security,
            self.bridge.clone(),
            self.events.clone(),
        )
        .await?;

        *slot = Some(session);

        Ok(())
    }

    /// Create the media session of the configured security mode, replacing any previous one
    ///
    /// For ZRTP sessions the hello hash is returned if the engine already computed it.
    pub async fn create_session(&self) -> Result<Option<String>, Error> {
        let mut slot = self.session.lock().await;

        self.replace_session(&mut *slot, self.mode).await?;

        let hello_hash = slot.as_ref().and_then(RtpSession::hello_hash);

        if self.mode == SecurityMode::Zrtp && hello_hash.is_none() {
            log::debug!("call {}: ZRTP hello hash not available yet", self.config.call_id);
        }

        Ok(hello_hash)
    }

    async fn with_session<R>(&self, f: impl FnOnce(&mut RtpSession) -> R) -> Result<R, Error> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(Error::NoSession)?;
        Ok(f(session))
    }

    pub async fn start(&self, codecs: Vec<Box<dyn AudioCodec>>) -> Result<(), Error> {
        self.with_session(|session| session.start(codecs)).await?
    }

    pub async fn stop(&self) -> Result<(), Error> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(Error::NoSession)?;
        session.stop().await;
        Ok(())
    }

    /// Returns `false` if the codec set didn't change
    pub async fn update_media(&self, codecs: Vec<Box<dyn AudioCodec>>) -> Result<bool, Error> {
        self.with_session(|session| session.update_media(codecs))
            .await
    }

    pub async fn update_destination(&self, addr: SocketAddr) -> Result<(), Error> {
        self.with_session(|session| session.update_destination(addr))
            .await
    }

    pub async fn transport_descriptors(&self) -> Result<Vec<TransportDescriptor>, Error> {
        self.with_session(|session| session.transport_descriptors())
            .await
    }

    pub async fn set_dtmf_payload_type(&self, payload_type: u8) -> Result<(), Error> {
        self.with_session(|session| session.set_dtmf_payload_type(payload_type))
            .await
    }

    pub async fn send_digit(&self, digit: char) -> Result<(), Error> {
        self.with_session(|session| session.send_digit(digit))
            .await?
    }

    pub async fn pending_digits(&self) -> Result<usize, Error> {
        self.with_session(|session| session.pending_digits()).await
    }

    pub async fn statistics(&self) -> Result<StatisticsSnapshot, Error> {
        self.with_session(|session| session.statistics()).await
    }

    /// Number of times the audio processing chain of the session was rebuilt
    pub async fn pipeline_generation(&self) -> Result<u64, Error> {
        self.with_session(|session| session.pipeline_generation())
            .await
    }

    /// Local `a=crypto` attribute values of an SDES session
    pub async fn local_crypto(&self) -> Result<Vec<String>, Error> {
        self.with_session(|session| session.with_sdes(|sdes| sdes.local_crypto()))
            .await?
    }

    /// Install the crypto attribute selected by the peer
    ///
    /// If the negotiation fails and the account allows it, the session is recreated without
    /// encryption and must be started again. Returns the security mode in effect afterwards.
    pub async fn set_remote_crypto(
        &self,
        negotiation: &SdesNegotiation,
    ) -> Result<SecurityMode, Error> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(Error::NoSession)?;

        let Err(e) = session.with_sdes(|sdes| sdes.set_remote(negotiation))? else {
            return Ok(SecurityMode::Sdes);
        };

        log::warn!("call {}: SDES negotiation failed, {e}", self.config.call_id);

        self.events.emit(CallEventKind::NegotiationFailed {
            reason: e.to_string(),
            category: NegotiationCategory::Sdes,
        });

        if !self.prefs.srtp_fallback {
            return Err(e.into());
        }

        log::info!(
            "call {}: falling back to unencrypted media",
            self.config.call_id
        );

        self.replace_session(&mut *slot, SecurityMode::None).await?;

        Ok(SecurityMode::None)
    }

    /// Snapshot the SDES keys when putting the call on hold, no-op for other modes
    pub async fn save_state(&self) -> Result<(), Error> {
        self.with_session(|session| session.save_state()).await
    }

    /// Reinstall the SDES keys when resuming the call, no-op for other modes
    pub async fn restore_state(&self) -> Result<(), Error> {
        self.with_session(|session| session.restore_state())
            .await?
    }

    /// Hash of the local ZRTP Hello packet, `None` if not available (yet)
    pub async fn hello_hash(&self) -> Result<Option<String>, Error> {
        self.with_session(|session| session.hello_hash()).await
    }

    /// Access the ZRTP controls of the session
    #[cfg(feature = "zrtp")]
    pub async fn zrtp<R>(&self, f: impl FnOnce(&mut ZrtpKeyExchange) -> R) -> Result<R, Error> {
        self.with_session(|session| session.with_zrtp(f)).await?
    }
}
