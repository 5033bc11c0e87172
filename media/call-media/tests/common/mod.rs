#![allow(dead_code)]

use ezk_call_media::{
    AudioFormat, CallEvent, CallEventKind, Component, EventSink, RingBufferBridge,
    RtpSessionFactory, SessionConfig,
    codec::{AudioCodec, Pcmu},
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, time::timeout};

#[cfg(feature = "zrtp")]
pub(crate) mod zrtp;

pub(crate) const FORMAT: AudioFormat = AudioFormat::new(8000, 1);

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn make_bridge() -> Arc<RingBufferBridge> {
    Arc::new(RingBufferBridge::new(FORMAT, 8000 * 4))
}

/// One side of a call running on localhost
pub(crate) struct Peer {
    pub(crate) factory: RtpSessionFactory,
    pub(crate) bridge: Arc<RingBufferBridge>,
    pub(crate) events: mpsc::UnboundedReceiver<CallEvent>,
}

pub(crate) fn session_config(call_id: &str) -> SessionConfig {
    SessionConfig {
        local_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        rtcp_interval: Duration::from_millis(100),
        ..SessionConfig::new(call_id)
    }
}

pub(crate) fn make_peer(call_id: &str) -> Peer {
    let bridge = make_bridge();
    let (tx, events) = mpsc::unbounded_channel();

    let factory = RtpSessionFactory::new(
        session_config(call_id),
        bridge.clone(),
        EventSink::new(call_id, tx),
    );

    Peer {
        factory,
        bridge,
        events,
    }
}

pub(crate) fn pcmu() -> Vec<Box<dyn AudioCodec>> {
    vec![Box::new(Pcmu::default())]
}

/// Linear 16kHz codec, one byte per sample
pub(crate) struct Wideband;

impl AudioCodec for Wideband {
    fn payload_type(&self) -> u8 {
        96
    }

    fn name(&self) -> &str {
        "L8/16000"
    }

    fn clock_rate(&self) -> u32 {
        16000
    }

    fn frame_size(&self) -> usize {
        320
    }

    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) {
        out.extend(pcm.iter().map(|sample| (sample >> 8) as u8));
    }

    fn decode(&mut self, payload: &[u8], out: &mut Vec<i16>) {
        out.extend(payload.iter().map(|byte| i16::from(*byte as i8) << 8));
    }
}

/// 400Hz sine wave at 8kHz
pub(crate) fn tone(samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / FORMAT.sample_rate as f32;
            ((t * 400.0 * std::f32::consts::TAU).sin() * 8000.0) as i16
        })
        .collect()
}

pub(crate) async fn rtp_addr(factory: &RtpSessionFactory) -> SocketAddr {
    factory
        .transport_descriptors()
        .await
        .unwrap()
        .into_iter()
        .find(|descriptor| descriptor.component == Component::Rtp)
        .unwrap()
        .local_addr
}

/// Point both peers' media at each other
pub(crate) async fn connect(a: &Peer, b: &Peer) {
    a.factory
        .update_destination(rtp_addr(&b.factory).await)
        .await
        .unwrap();
    b.factory
        .update_destination(rtp_addr(&a.factory).await)
        .await
        .unwrap();
}

/// Wait until the peer played back at least `samples` non silent samples
pub(crate) async fn wait_for_audio(peer: &Peer, samples: usize) -> bool {
    let mut received = 0;

    for _ in 0..300 {
        received += peer
            .bridge
            .take_playback()
            .iter()
            .filter(|sample| **sample != 0)
            .count();

        if received >= samples {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Wait for the first event matching `f`, skipping all others
pub(crate) async fn wait_for_event(
    events: &mut mpsc::UnboundedReceiver<CallEvent>,
    mut f: impl FnMut(&CallEventKind) -> bool,
) -> Option<CallEventKind> {
    timeout(Duration::from_secs(3), async {
        while let Some(event) = events.recv().await {
            if f(&event.kind) {
                return Some(event.kind);
            }
        }

        None
    })
    .await
    .ok()
    .flatten()
}

/// Drain all events emitted so far
pub(crate) fn drain_events(events: &mut mpsc::UnboundedReceiver<CallEvent>) -> Vec<CallEventKind> {
    std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| event.kind)
        .collect()
}
