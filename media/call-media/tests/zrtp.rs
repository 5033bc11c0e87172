#![cfg(feature = "zrtp")]

use common::{
    Peer, connect, drain_events, make_peer, pcmu, tone, wait_for_audio, wait_for_event,
    zrtp::{FakeZrtpEngine, SAS},
};
use ezk_call_media::{
    CallEventKind, Error, KeyExchangeKind, SecurityMode, SecurityPrefs, ZrtpConfig,
    key_exchange::zrtp::{ZidFile, ZrtpError},
};
use std::{fs, net::Ipv4Addr, path::Path};
use tokio::net::UdpSocket;

mod common;

fn zrtp_prefs(cache_dir: &Path, config: ZrtpConfig) -> SecurityPrefs {
    SecurityPrefs {
        srtp_enabled: true,
        key_exchange: KeyExchangeKind::Zrtp,
        zrtp: ZrtpConfig {
            cache_dir: cache_dir.to_owned(),
            ..config
        },
        ..SecurityPrefs::default()
    }
}

fn make_zrtp_peer(call_id: &str, cache_dir: &Path, config: ZrtpConfig, max_hellos: usize) -> Peer {
    let Peer {
        factory,
        bridge,
        events,
    } = make_peer(call_id);

    let mut factory = factory.with_zrtp_engine(FakeZrtpEngine::provider(max_hellos));
    assert_eq!(
        factory.configure(zrtp_prefs(cache_dir, config)).unwrap(),
        SecurityMode::Zrtp
    );

    Peer {
        factory,
        bridge,
        events,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_secures_media() {
    common::init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut alice = make_zrtp_peer("zrtp-alice", &dir.path().join("alice"), ZrtpConfig::default(), 100);
    let mut bob = make_zrtp_peer("zrtp-bob", &dir.path().join("bob"), ZrtpConfig::default(), 100);

    let hello_hash = alice.factory.create_session().await.unwrap();
    assert!(hello_hash.is_some_and(|hash| hash.starts_with("1.10 ")));
    bob.factory.create_session().await.unwrap();

    connect(&alice, &bob).await;
    alice.factory.start(pcmu()).await.unwrap();
    bob.factory.start(pcmu()).await.unwrap();

    for peer in [&mut alice, &mut bob] {
        let secure_on = wait_for_event(&mut peer.events, |event| {
            matches!(event, CallEventKind::SecureOn { .. })
        })
        .await;
        assert_eq!(
            secure_on,
            Some(CallEventKind::SecureOn {
                cipher: "AES-CM-128".into()
            })
        );

        let sas = wait_for_event(&mut peer.events, |event| {
            matches!(event, CallEventKind::ShowSas { .. })
        })
        .await;
        assert_eq!(
            sas,
            Some(CallEventKind::ShowSas {
                sas: SAS.into(),
                verified: false
            })
        );

        assert!(peer.factory.zrtp(|zrtp| zrtp.is_secure()).await.unwrap());
    }

    alice.bridge.push_captured(&tone(16000));
    assert!(wait_for_audio(&bob, 4000).await);

    // Going clear keeps the call alive without encryption
    alice.factory.zrtp(|zrtp| zrtp.request_go_clear()).await.unwrap();
    assert!(!alice.factory.zrtp(|zrtp| zrtp.is_secure()).await.unwrap());
    assert!(
        drain_events(&mut alice.events)
            .iter()
            .any(|event| *event == CallEventKind::SecureOff)
    );

    alice.factory.stop().await.unwrap();
    bob.factory.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sas_displayed_once() {
    common::init_logger();

    let dir = tempfile::tempdir().unwrap();
    let once = ZrtpConfig {
        display_sas_once: true,
        ..ZrtpConfig::default()
    };

    let mut alice = make_zrtp_peer("sas-once-alice", &dir.path().join("alice"), once, 100);
    let mut bob = make_zrtp_peer("sas-once-bob", &dir.path().join("bob"), ZrtpConfig::default(), 100);

    alice.factory.create_session().await.unwrap();
    bob.factory.create_session().await.unwrap();
    connect(&alice, &bob).await;
    alice.factory.start(pcmu()).await.unwrap();
    bob.factory.start(pcmu()).await.unwrap();

    for peer in [&mut alice, &mut bob] {
        let sas = wait_for_event(&mut peer.events, |event| {
            matches!(event, CallEventKind::ShowSas { .. })
        })
        .await;
        assert!(sas.is_some());
    }

    alice.factory.zrtp(|zrtp| zrtp.set_sas_verified()).await.unwrap();
    bob.factory.zrtp(|zrtp| zrtp.set_sas_verified()).await.unwrap();

    let is_sas = |event: &CallEventKind| matches!(event, CallEventKind::ShowSas { .. });

    assert!(!drain_events(&mut alice.events).iter().any(is_sas));
    assert!(
        drain_events(&mut bob.events)
            .iter()
            .any(|event| *event == CallEventKind::ShowSas {
                sas: SAS.into(),
                verified: true
            })
    );

    alice.factory.stop().await.unwrap();
    bob.factory.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_without_zrtp() {
    common::init_logger();

    let dir = tempfile::tempdir().unwrap();
    let mut alice = make_zrtp_peer("zrtp-lonely", dir.path(), ZrtpConfig::default(), 3);

    alice.factory.create_session().await.unwrap();

    let remote = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    alice
        .factory
        .update_destination(remote.local_addr().unwrap())
        .await
        .unwrap();

    alice.factory.start(pcmu()).await.unwrap();

    let event = wait_for_event(&mut alice.events, |event| {
        matches!(event, CallEventKind::NotSupportedByPeer)
    })
    .await;
    assert_eq!(event, Some(CallEventKind::NotSupportedByPeer));
    assert!(!alice.factory.zrtp(|zrtp| zrtp.is_secure()).await.unwrap());

    alice.factory.stop().await.unwrap();
}

#[tokio::test]
async fn hello_hash_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = ZrtpConfig {
        hello_hash: false,
        ..ZrtpConfig::default()
    };

    let peer = make_zrtp_peer("no-hello-hash", dir.path(), config, 3);

    assert_eq!(peer.factory.create_session().await.unwrap(), None);
    assert_eq!(peer.factory.hello_hash().await.unwrap(), None);
}

#[tokio::test]
async fn corrupt_identity_is_recreated() {
    common::init_logger();

    let dir = tempfile::tempdir().unwrap();
    let config = ZrtpConfig::default();
    let path = dir.path().join(&config.zid_file);
    fs::write(&path, b"not a zid file").unwrap();

    let peer = make_zrtp_peer("corrupt-zid", dir.path(), config, 3);
    peer.factory.create_session().await.unwrap();

    let recreated = ZidFile::open(&path).unwrap();
    assert_eq!(
        peer.factory.hello_hash().await.unwrap(),
        Some(format!(
            "1.10 {}",
            recreated
                .zid()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>()
        ))
    );
}

#[tokio::test]
async fn unusable_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("file");
    fs::write(&not_a_dir, b"").unwrap();

    let peer = make_zrtp_peer("bad-cache-dir", &not_a_dir.join("cache"), ZrtpConfig::default(), 3);

    assert!(matches!(
        peer.factory.create_session().await,
        Err(Error::Zrtp(ZrtpError::Identity { .. }))
    ));
}
