use crate::{
    audio::AudioBridge,
    codec::{self, AudioCodec},
    config::{SecurityMode, SessionConfig},
    error::Error,
    events::{CallEventKind, EventSink},
    key_exchange::{
        KeyExchange, Received, SessionSecurity,
        sdes::{SavedCryptoState, SdesKeyExchange},
    },
    pipeline::MediaCodecPipeline,
    transport::{OutboundPacket, RECV_BUFFER_SIZE, RtpTransport, TransportDescriptor},
};
use outbound::Outbound;
use parking_lot::Mutex;
use rtp::{RtpPacket, RtpStatistics, StatisticsSnapshot, rtcp_types::Compound};
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

#[cfg(feature = "zrtp")]
use crate::key_exchange::zrtp::ZrtpKeyExchange;

mod dtmf;
mod outbound;

/// Received payloads of this size or smaller can't be audio
const MIN_AUDIO_PAYLOAD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, sockets are bound but no media is flowing
    Configured,
    Running,
    /// Terminal state
    Stopped,
}

/// State shared between the session handle and its tasks
struct Inner {
    state: SessionState,
    pipeline: MediaCodecPipeline,
    security: SessionSecurity,
    outbound: Outbound,
    stats: RtpStatistics,
    remote: Option<SocketAddr>,
    saved_crypto: Option<SavedCryptoState>,
}

impl Inner {
    /// Duration of a single send tick, derived from the encoder's frame size
    fn tick_ms(&self) -> u64 {
        self.pipeline
            .encoder()
            .map(codec::frame_duration_ms)
            .unwrap_or(20)
    }

    fn send_tick(&mut self, now: Instant) -> Vec<OutboundPacket> {
        let mut packets = vec![];

        #[cfg(feature = "zrtp")]
        if let SessionSecurity::Zrtp(zrtp) = &mut self.security {
            zrtp.handle_timeout(now);
            packets.extend(std::iter::from_fn(|| zrtp.pop_packet()).map(OutboundPacket::new));
        }

        let tick_ms = self.tick_ms();

        for packet in self.outbound.tick(&mut self.pipeline, tick_ms, now) {
            self.stats.send_rtp(&packet);

            let mut data = match packet.to_vec() {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("failed to serialize RTP packet, {e:?}");
                    continue;
                }
            };

            if let Err(e) = self.security.protect_rtp(&mut data) {
                log::debug!("failed to protect RTP packet, {e}");
                continue;
            }

            packets.push(OutboundPacket::new(data));
        }

        packets
    }

    /// Handle a packet received on the RTP socket, returns key exchange packets to send
    fn receive_rtp(&mut self, mut data: Vec<u8>) -> Vec<OutboundPacket> {
        match self.security.unprotect_rtp(&mut data) {
            Ok(Received::Media) => {}
            Ok(Received::Consumed) => return self.key_exchange_packets(),
            Err(e) => {
                log::debug!("dropping received RTP packet, {e}");
                return vec![];
            }
        }

        let packet = match RtpPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("failed to parse RTP packet, {e:?}");
                return vec![];
            }
        };

        self.stats.recv_rtp(&packet);

        if packet.payload.len() > MIN_AUDIO_PAYLOAD_LEN {
            self.pipeline.decode(&packet.payload, packet.pt);
        }

        vec![]
    }

    fn key_exchange_packets(&mut self) -> Vec<OutboundPacket> {
        match &mut self.security {
            #[cfg(feature = "zrtp")]
            SessionSecurity::Zrtp(zrtp) => std::iter::from_fn(|| zrtp.pop_packet())
                .map(OutboundPacket::new)
                .collect(),
            _ => vec![],
        }
    }

    /// Handle a packet received on the RTCP socket, returns the updated statistics if it
    /// contained a report
    fn receive_rtcp(&mut self, mut data: Vec<u8>) -> Option<StatisticsSnapshot> {
        match self.security.unprotect_rtcp(&mut data) {
            Ok(Received::Media) => {}
            Ok(Received::Consumed) => return None,
            Err(e) => {
                log::debug!("dropping received RTCP packet, {e}");
                return None;
            }
        }

        let compound = Compound::parse(&data)
            .inspect_err(|e| log::debug!("failed to parse RTCP packet, {e:?}"))
            .ok()?;

        self.stats.recv_rtcp(compound)?;

        Some(self.stats.snapshot())
    }

    fn rtcp_report(&mut self) -> Option<OutboundPacket> {
        let mut report = self
            .stats
            .rtcp_report()
            .inspect_err(|e| log::warn!("failed to create RTCP report, {e:?}"))
            .ok()?;

        if let Err(e) = self.security.protect_rtcp(&mut report) {
            log::debug!("failed to protect RTCP packet, {e}");
            return None;
        }

        Some(OutboundPacket::new(report))
    }
}

/// RTP media session of a single call
///
/// Owns the socket pair, the codec pipeline and the key exchange selected for the call. Once
/// started, one task sends a packet every frame duration while two others receive RTP & RTCP.
pub struct RtpSession {
    config: SessionConfig,
    events: EventSink,
    transport: Arc<RtpTransport>,
    inner: Arc<Mutex<Inner>>,
    shutdown: Option<watch::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RtpSession {
    pub(crate) async fn new(
        config: SessionConfig,
        security: SessionSecurity,
        bridge: Arc<dyn AudioBridge>,
        events: EventSink,
    ) -> Result<Self, Error> {
        let transport = RtpTransport::bind(config.local_addr, config.timeouts).await?;

        let outbound = Outbound::new(config.dtmf_payload_type, config.dtmf_duration);
        let stats = RtpStatistics::new(outbound.ssrc(), 8000).with_cname(config.call_id.clone());
        let pipeline = MediaCodecPipeline::new(config.call_id.clone(), bridge, config.dsp);

        log::debug!(
            "call {}: created {:?} media session",
            config.call_id,
            security.mode()
        );

        Ok(Self {
            config,
            events,
            transport: Arc::new(transport),
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Configured,
                pipeline,
                security,
                outbound,
                stats,
                remote: None,
                saved_crypto: None,
            })),
            shutdown: None,
            tasks: vec![],
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.inner.lock().security.mode()
    }

    /// Start sending & receiving media using the negotiated codecs
    ///
    /// Must be called from within a tokio runtime. Calling it on a running session does nothing.
    pub fn start(&mut self, codecs: Vec<Box<dyn AudioCodec>>) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        match inner.state {
            SessionState::Configured => {}
            SessionState::Running => {
                log::debug!("call {}: media session already running", self.config.call_id);
                return Ok(());
            }
            SessionState::Stopped => return Err(Error::SessionStopped),
        }

        if codecs.is_empty() {
            return Err(Error::NoCodecs);
        }

        self.transport.set_timeouts(self.config.timeouts);

        inner.pipeline.set_codecs(codecs);
        if let Some(clock_rate) = inner.pipeline.encoder().map(|codec| codec.clock_rate()) {
            inner.stats.set_clock_rate(clock_rate);
        }

        #[cfg(feature = "zrtp")]
        {
            let ssrc = inner.outbound.ssrc().0;
            if let SessionSecurity::Zrtp(zrtp) = &mut inner.security {
                zrtp.start(ssrc);
            }
        }

        inner.state = SessionState::Running;
        drop(inner);

        let (shutdown, _) = watch::channel(());

        self.tasks = vec![
            tokio::spawn(send_task(
                self.inner.clone(),
                self.transport.clone(),
                shutdown.subscribe(),
            )),
            tokio::spawn(rtp_receive_task(
                self.inner.clone(),
                self.transport.clone(),
                shutdown.subscribe(),
            )),
            tokio::spawn(rtcp_task(
                self.inner.clone(),
                self.transport.clone(),
                self.events.clone(),
                self.config.rtcp_interval,
                shutdown.subscribe(),
            )),
        ];
        self.shutdown = Some(shutdown);

        log::info!("call {}: media session started", self.config.call_id);

        Ok(())
    }

    /// Stop all media tasks and release the pipeline
    ///
    /// Returns after every task has exited, no packet is processed afterwards.
    pub async fn stop(&mut self) {
        self.inner.lock().state = SessionState::Stopped;

        // Dropping the sender ends all tasks
        self.shutdown = None;

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::error!("call {}: media task failed, {e}", self.config.call_id);
            }
        }

        let mut inner = self.inner.lock();

        #[cfg(feature = "zrtp")]
        if let SessionSecurity::Zrtp(zrtp) = &mut inner.security {
            zrtp.stop();
        }

        inner.pipeline.kill();

        log::info!("call {}: media session stopped", self.config.call_id);
    }

    /// Replace the negotiated codecs, returns `false` if the set of payload types is unchanged
    pub fn update_media(&self, codecs: Vec<Box<dyn AudioCodec>>) -> bool {
        let mut inner = self.inner.lock();

        let mut current = inner.pipeline.payload_types();
        let mut new = codec::payload_types(&codecs);
        current.sort_unstable();
        new.sort_unstable();

        if current == new {
            return false;
        }

        inner.pipeline.set_codecs(codecs);
        if let Some(clock_rate) = inner.pipeline.encoder().map(|codec| codec.clock_rate()) {
            inner.stats.set_clock_rate(clock_rate);
        }

        true
    }

    /// Send media to `addr` (RTCP to the next port) instead of the previous destination
    pub fn update_destination(&self, addr: SocketAddr) {
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.remote.take()
            && let Err(e) = self.transport.remove_destination(previous)
        {
            log::warn!("call {}: {e}", self.config.call_id);
        }

        self.transport.add_destination(addr);
        inner.remote = Some(addr);
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().remote
    }

    pub fn transport_descriptors(&self) -> Vec<TransportDescriptor> {
        self.transport.descriptors()
    }

    pub fn set_dtmf_payload_type(&self, payload_type: u8) {
        self.inner
            .lock()
            .outbound
            .set_dtmf_payload_type(payload_type);
    }

    /// Queue a DTMF digit (`0-9`, `*`, `#`, `A-D`)
    pub fn send_digit(&self, digit: char) -> Result<(), Error> {
        self.inner
            .lock()
            .outbound
            .queue_digit(digit)
            .map_err(|_| Error::InvalidDigit(digit))
    }

    /// Number of queued DTMF digits which haven't been sent completely
    pub fn pending_digits(&self) -> usize {
        self.inner.lock().outbound.pending_digits()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.lock().stats.snapshot()
    }

    /// Number of times the audio processing chain was rebuilt
    pub fn pipeline_generation(&self) -> u64 {
        self.inner.lock().pipeline.generation()
    }

    /// Run `f` with the SDES key exchange of the session
    pub fn with_sdes<R>(&self, f: impl FnOnce(&mut SdesKeyExchange) -> R) -> Result<R, Error> {
        let mut inner = self.inner.lock();

        match &mut inner.security {
            SessionSecurity::Sdes(sdes) => Ok(f(sdes)),
            other => Err(Error::SecurityModeMismatch {
                expected: SecurityMode::Sdes,
                actual: other.mode(),
            }),
        }
    }

    /// Run `f` with the ZRTP key exchange of the session
    #[cfg(feature = "zrtp")]
    pub fn with_zrtp<R>(&self, f: impl FnOnce(&mut ZrtpKeyExchange) -> R) -> Result<R, Error> {
        let mut inner = self.inner.lock();

        match &mut inner.security {
            SessionSecurity::Zrtp(zrtp) => Ok(f(zrtp)),
            other => Err(Error::SecurityModeMismatch {
                expected: SecurityMode::Zrtp,
                actual: other.mode(),
            }),
        }
    }

    /// Hash of the local ZRTP Hello packet, `None` if not (yet) available
    pub fn hello_hash(&self) -> Option<String> {
        match &self.inner.lock().security {
            #[cfg(feature = "zrtp")]
            SessionSecurity::Zrtp(zrtp) => zrtp.hello_hash(),
            _ => None,
        }
    }

    /// Snapshot the local SDES keys before putting the call on hold
    pub fn save_state(&self) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        if let SessionSecurity::Sdes(sdes) = &inner.security {
            inner.saved_crypto = sdes.save_state();
        }
    }

    /// Reinstall the local SDES keys saved by [`save_state`](Self::save_state)
    pub fn restore_state(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        if let SessionSecurity::Sdes(sdes) = &mut inner.security
            && let Some(state) = inner.saved_crypto.take()
        {
            sdes.restore_state(state)?;
        }

        Ok(())
    }
}

async fn send_task(
    inner: Arc<Mutex<Inner>>,
    transport: Arc<RtpTransport>,
    mut shutdown: watch::Receiver<()>,
) {
    let mut next = time::Instant::now();

    loop {
        let (packets, tick) = {
            let mut inner = inner.lock();
            let packets = inner.send_tick(Instant::now());
            (packets, Duration::from_millis(inner.tick_ms()))
        };

        for packet in &packets {
            transport.send_rtp(packet).await;
        }

        next += tick;

        // Don't try to catch up after a long stall
        let now = time::Instant::now();
        if next + tick < now {
            next = now;
        }

        tokio::select! {
            _ = time::sleep_until(next) => {}
            _ = shutdown.changed() => break,
        }
    }
}

async fn rtp_receive_task(
    inner: Arc<Mutex<Inner>>,
    transport: Arc<RtpTransport>,
    mut shutdown: watch::Receiver<()>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let len = tokio::select! {
            result = transport.recv_rtp(&mut buf) => match result {
                Ok((len, _)) => len,
                Err(e) => {
                    log::debug!("failed to receive RTP packet, {e}");
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };

        let replies = inner.lock().receive_rtp(buf[..len].to_vec());

        for reply in &replies {
            transport.send_rtp(reply).await;
        }
    }
}

async fn rtcp_task(
    inner: Arc<Mutex<Inner>>,
    transport: Arc<RtpTransport>,
    events: EventSink,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    let mut interval = time::interval_at(time::Instant::now() + interval, interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = inner.lock().rtcp_report();

                if let Some(report) = report {
                    transport.send_rtcp(&report).await;
                }
            }
            result = transport.recv_rtcp(&mut buf) => {
                let len = match result {
                    Ok((len, _)) => len,
                    Err(e) => {
                        log::debug!("failed to receive RTCP packet, {e}");
                        continue;
                    }
                };

                let snapshot = inner.lock().receive_rtcp(buf[..len].to_vec());

                if let Some(snapshot) = snapshot {
                    events.emit(CallEventKind::Statistics(snapshot));
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
