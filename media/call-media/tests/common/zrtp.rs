//! Minimal stand-in for a ZRTP protocol engine
//!
//! Peers exchange their SRTP master keys in plain text inside Hello-like packets. Only useful to
//! drive the key exchange plumbing in tests.

use ezk_call_media::{
    ZrtpEngineProvider,
    key_exchange::zrtp::{EngineEvent, EngineOutput, ZidFile, ZrtpEngine, ZrtpSecrets},
};
use rand::Rng;
use srtp::CryptoSuite;
use std::{
    collections::VecDeque,
    io,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(20);

pub(crate) const SAS: &str = "k9wb";

pub(crate) struct FakeZrtpEngine {
    zid: Option<ZidFile>,
    key: Vec<u8>,
    salt: Vec<u8>,
    ssrc: u32,
    running: bool,
    peer_seen: bool,
    secure: bool,
    hellos_sent: usize,
    max_hellos: usize,
    next_hello: Option<Instant>,
    output: VecDeque<EngineOutput>,
}

impl FakeZrtpEngine {
    pub(crate) fn new(max_hellos: usize) -> Self {
        let suite = CryptoSuite::DEFAULT;

        let mut key = vec![0u8; suite.cipher_key_len];
        let mut salt = vec![0u8; suite.salt_len];
        rand::rng().fill_bytes(&mut key);
        rand::rng().fill_bytes(&mut salt);

        Self {
            zid: None,
            key,
            salt,
            ssrc: 0,
            running: false,
            peer_seen: false,
            secure: false,
            hellos_sent: 0,
            max_hellos,
            next_hello: None,
            output: VecDeque::new(),
        }
    }

    pub(crate) fn provider(max_hellos: usize) -> ZrtpEngineProvider {
        Arc::new(move || Box::new(Self::new(max_hellos)) as Box<dyn ZrtpEngine>)
    }

    fn send_hello(&mut self, now: Instant) {
        let mut packet = vec![0x10, 0x00, 0x00, self.hellos_sent as u8];
        packet.extend_from_slice(b"ZRTP");
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        packet.push(u8::from(self.peer_seen));
        packet.extend_from_slice(&self.key);
        packet.extend_from_slice(&self.salt);

        self.hellos_sent += 1;
        self.next_hello = Some(now + RETRANSMIT_INTERVAL);
        self.output.push_back(EngineOutput::Packet(packet));
    }

    fn event(&mut self, event: EngineEvent) {
        self.output.push_back(EngineOutput::Event(event));
    }
}

impl ZrtpEngine for FakeZrtpEngine {
    fn init_identity(&mut self, path: &Path) -> io::Result<()> {
        self.zid = Some(ZidFile::open(path)?);
        Ok(())
    }

    fn start(&mut self, ssrc: u32) {
        self.ssrc = ssrc;
        self.running = true;
        self.send_hello(Instant::now());
    }

    fn stop(&mut self) {
        self.running = false;
        self.next_hello = None;

        if self.secure {
            self.secure = false;
            self.event(EngineEvent::SecretsOff);
        }
    }

    fn handle_packet(&mut self, packet: &[u8]) {
        let suite = CryptoSuite::DEFAULT;

        let Some((&acknowledged, material)) = packet.get(12..).and_then(<[u8]>::split_first)
        else {
            return;
        };

        if material.len() < suite.master_len() {
            return;
        }

        if acknowledged == 0 {
            // The peer hasn't seen our keys yet
            self.peer_seen = true;
            self.send_hello(Instant::now());
        }

        if self.secure {
            return;
        }

        self.peer_seen = true;
        self.secure = true;
        self.next_hello = None;

        let (remote_key, remote_salt) = material[..suite.master_len()].split_at(suite.cipher_key_len);

        self.event(EngineEvent::SecretsReady(ZrtpSecrets {
            suite,
            local_key: self.key.clone(),
            local_salt: self.salt.clone(),
            remote_key: remote_key.to_vec(),
            remote_salt: remote_salt.to_vec(),
        }));
        self.event(EngineEvent::SecureOn {
            cipher: "AES-CM-128".into(),
        });
        self.event(EngineEvent::ShowSas {
            sas: SAS.into(),
            verified: false,
        });
    }

    fn timeout(&self) -> Option<Instant> {
        self.next_hello
    }

    fn handle_timeout(&mut self, now: Instant) {
        if !self.running || self.secure {
            return;
        }

        if self.hellos_sent >= self.max_hellos {
            self.next_hello = None;
            self.event(EngineEvent::NotSupportedByPeer);
            return;
        }

        self.send_hello(now);
    }

    fn pop_output(&mut self) -> Option<EngineOutput> {
        self.output.pop_front()
    }

    fn hello_hash(&self) -> Option<String> {
        let zid = self.zid.as_ref()?.zid();
        let hex: String = zid.iter().map(|b| format!("{b:02x}")).collect();
        Some(format!("1.10 {hex}"))
    }

    fn set_peer_hello_hash(&mut self, _: &str) {}

    fn set_sas_verified(&mut self, verified: bool) {
        if self.secure {
            self.event(EngineEvent::ShowSas {
                sas: SAS.into(),
                verified,
            });
        }
    }

    fn request_go_clear(&mut self) {
        if self.secure {
            self.secure = false;
            self.event(EngineEvent::SecretsOff);
            self.event(EngineEvent::SecureOff);
        }
    }

    fn accept_go_clear(&mut self) {
        self.request_go_clear();
    }

    fn accept_enrollment(&mut self, _: bool) {}
}
