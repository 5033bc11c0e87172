use crate::{
    CryptoSuite, SessionKeys, SrtpError,
    kdf::{apply_keystream, packet_iv},
    replay::ReplayWindow,
};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;

type HmacSha1 = Hmac<Sha1>;

const RTP_HEADER_LEN: usize = 12;
const RTCP_HEADER_LEN: usize = 8;
const SRTCP_INDEX_LEN: usize = 4;
const SRTCP_E_FLAG: u32 = 0x8000_0000;

/// Don't track an unbounded number of streams per session
const MAX_STREAMS: usize = 64;

/// Policy which defines how packets are protected
#[derive(Clone)]
pub struct SrtpPolicy<'a> {
    suite: &'static CryptoSuite,
    master_key: &'a [u8],
    master_salt: &'a [u8],
}

impl<'a> SrtpPolicy<'a> {
    /// Create a new SRTP policy
    ///
    /// `suite` - Crypto suite used to protect RTP & RTCP
    /// `master_key` - Master key, must be `suite.cipher_key_len` bytes long
    /// `master_salt` - Master salt, must be `suite.salt_len` bytes long
    pub fn new(
        suite: &'static CryptoSuite,
        master_key: &'a [u8],
        master_salt: &'a [u8],
    ) -> Result<Self, SrtpError> {
        if master_key.len() != suite.cipher_key_len {
            log::error!(
                "key has invalid length, expected: {}, got: {}",
                suite.cipher_key_len,
                master_key.len()
            );

            return Err(SrtpError::KeyLength {
                expected: suite.cipher_key_len,
                got: master_key.len(),
            });
        }

        if master_salt.len() != suite.salt_len {
            log::error!(
                "salt has invalid length, expected: {}, got: {}",
                suite.salt_len,
                master_salt.len()
            );

            return Err(SrtpError::SaltLength {
                expected: suite.salt_len,
                got: master_salt.len(),
            });
        }

        Ok(Self {
            suite,
            master_key,
            master_salt,
        })
    }
}

#[derive(Default)]
struct StreamState {
    roc: u32,
    highest_seq: Option<u16>,
    replay: ReplayWindow,

    srtcp_index: u32,
    srtcp_replay: ReplayWindow,
}

impl StreamState {
    /// Estimate the rollover counter of a sequence number (RFC 3711 appendix A)
    fn estimate_roc(&self, seq: u16) -> u32 {
        let Some(s_l) = self.highest_seq else {
            return self.roc;
        };

        if s_l < 0x8000 {
            if seq > s_l && seq - s_l > 0x8000 {
                self.roc.saturating_sub(1)
            } else {
                self.roc
            }
        } else if s_l - 0x8000 > seq {
            self.roc.wrapping_add(1)
        } else {
            self.roc
        }
    }

    fn update(&mut self, roc: u32, seq: u16) {
        match self.highest_seq {
            Some(highest) if roc == self.roc && seq <= highest => {}
            Some(_) if roc < self.roc => {}
            _ => {
                self.roc = roc;
                self.highest_seq = Some(seq);
            }
        }
    }
}

/// Sender side position of a stream, enough to continue protecting it with the same master key
/// without ever reusing a packet index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrtpStreamState {
    pub ssrc: u32,
    pub roc: u32,
    pub highest_seq: Option<u16>,
    pub srtcp_index: u32,
}

fn packet_index(roc: u32, seq: u16) -> u64 {
    (u64::from(roc) << 16) | u64::from(seq)
}

/// SRTP session
///
/// Protects or unprotects packets of any SSRC using keys derived from a single master key.
/// Rollover counters and replay windows are tracked per SSRC.
pub struct SrtpSession {
    suite: &'static CryptoSuite,
    rtp_keys: SessionKeys,
    rtcp_keys: SessionKeys,
    streams: HashMap<u32, StreamState>,
}

impl SrtpSession {
    /// Create a new SRTP context, deriving all session keys from the policy's master key
    pub fn new(policy: SrtpPolicy<'_>) -> Result<Self, SrtpError> {
        Ok(Self {
            suite: policy.suite,
            rtp_keys: SessionKeys::derive_rtp(policy.suite, policy.master_key, policy.master_salt)?,
            rtcp_keys: SessionKeys::derive_rtcp(
                policy.suite,
                policy.master_key,
                policy.master_salt,
            )?,
            streams: HashMap::new(),
        })
    }

    pub fn suite(&self) -> &'static CryptoSuite {
        self.suite
    }

    fn stream(&mut self, ssrc: u32) -> &mut StreamState {
        if self.streams.len() >= MAX_STREAMS && !self.streams.contains_key(&ssrc) {
            log::warn!("too many SRTP streams, resetting stream state");
            self.streams.clear();
        }

        self.streams.entry(ssrc).or_default()
    }

    /// Protect a RTP packet into a SRTP packet
    pub fn protect_rtp(&mut self, buf: &mut Vec<u8>) -> Result<(), SrtpError> {
        let header_len = rtp_header_len(buf)?;
        let seq = u16::from_be_bytes([buf[2], buf[3]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let stream = self.stream(ssrc);
        let roc = stream.estimate_roc(seq);
        stream.update(roc, seq);

        let iv = packet_iv(&self.rtp_keys.salt, ssrc, packet_index(roc, seq));
        apply_keystream(&self.rtp_keys.cipher_key, &iv, &mut buf[header_len..])?;

        let tag = auth_tag(&self.rtp_keys.auth_key, buf, &roc.to_be_bytes())?;
        buf.extend_from_slice(&tag[..self.suite.auth_tag_len]);

        Ok(())
    }

    /// Unprotect a received SRTP packet into a RTP packet
    pub fn unprotect_rtp(&mut self, buf: &mut Vec<u8>) -> Result<(), SrtpError> {
        let tag_len = self.suite.auth_tag_len;

        if buf.len() < RTP_HEADER_LEN + tag_len {
            return Err(SrtpError::PacketTooShort);
        }

        let tag_offset = buf.len() - tag_len;
        let header_len = rtp_header_len(&buf[..tag_offset])?;
        let seq = u16::from_be_bytes([buf[2], buf[3]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let stream = self.stream(ssrc);
        let roc = stream.estimate_roc(seq);
        let index = packet_index(roc, seq);
        stream.replay.check(index)?;

        let (authenticated, tag) = buf.split_at(tag_offset);
        verify_auth_tag(&self.rtp_keys.auth_key, authenticated, &roc.to_be_bytes(), tag)?;

        buf.truncate(tag_offset);

        let iv = packet_iv(&self.rtp_keys.salt, ssrc, index);
        apply_keystream(&self.rtp_keys.cipher_key, &iv, &mut buf[header_len..])?;

        let stream = self.stream(ssrc);
        stream.replay.update(index);
        stream.update(roc, seq);

        Ok(())
    }

    /// Protect a RTCP packet into a SRTCP packet
    pub fn protect_rtcp(&mut self, buf: &mut Vec<u8>) -> Result<(), SrtpError> {
        if buf.len() < RTCP_HEADER_LEN {
            return Err(SrtpError::PacketTooShort);
        }

        let ssrc = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let stream = self.stream(ssrc);
        let index = stream.srtcp_index;
        stream.srtcp_index = (index + 1) & !SRTCP_E_FLAG;

        let iv = packet_iv(&self.rtcp_keys.salt, ssrc, u64::from(index));
        apply_keystream(&self.rtcp_keys.cipher_key, &iv, &mut buf[RTCP_HEADER_LEN..])?;

        buf.extend_from_slice(&(SRTCP_E_FLAG | index).to_be_bytes());

        let tag = auth_tag(&self.rtcp_keys.auth_key, buf, &[])?;
        buf.extend_from_slice(&tag[..self.suite.srtcp_auth_tag_len]);

        Ok(())
    }

    /// Unprotect a received SRTCP packet into a RTCP packet
    pub fn unprotect_rtcp(&mut self, buf: &mut Vec<u8>) -> Result<(), SrtpError> {
        let tag_len = self.suite.srtcp_auth_tag_len;

        if buf.len() < RTCP_HEADER_LEN + SRTCP_INDEX_LEN + tag_len {
            return Err(SrtpError::PacketTooShort);
        }

        let tag_offset = buf.len() - tag_len;
        let index_offset = tag_offset - SRTCP_INDEX_LEN;
        let ssrc = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let e_index = u32::from_be_bytes([
            buf[index_offset],
            buf[index_offset + 1],
            buf[index_offset + 2],
            buf[index_offset + 3],
        ]);
        let index = e_index & !SRTCP_E_FLAG;

        self.stream(ssrc).srtcp_replay.check(u64::from(index))?;

        let (authenticated, tag) = buf.split_at(tag_offset);
        verify_auth_tag(&self.rtcp_keys.auth_key, authenticated, &[], tag)?;

        buf.truncate(index_offset);

        if e_index & SRTCP_E_FLAG != 0 {
            let iv = packet_iv(&self.rtcp_keys.salt, ssrc, u64::from(index));
            apply_keystream(&self.rtcp_keys.cipher_key, &iv, &mut buf[RTCP_HEADER_LEN..])?;
        }

        self.stream(ssrc).srtcp_replay.update(u64::from(index));

        Ok(())
    }

    /// Get the roll-over-counter of the stream with the given SSRC
    pub fn stream_roc(&self, ssrc: u32) -> Option<u32> {
        self.streams.get(&ssrc).map(|stream| stream.roc)
    }

    /// Snapshot the position of every known stream
    pub fn stream_states(&self) -> Vec<SrtpStreamState> {
        self.streams
            .iter()
            .map(|(&ssrc, stream)| SrtpStreamState {
                ssrc,
                roc: stream.roc,
                highest_seq: stream.highest_seq,
                srtcp_index: stream.srtcp_index,
            })
            .collect()
    }

    /// Continue streams from previously taken snapshots
    ///
    /// Replay windows start empty, only the packet indices are carried over.
    pub fn resume_streams(&mut self, states: &[SrtpStreamState]) {
        for state in states {
            let stream = self.stream(state.ssrc);
            stream.roc = state.roc;
            stream.highest_seq = state.highest_seq;
            stream.srtcp_index = state.srtcp_index;
        }
    }
}

/// Length of the RTP header including CSRCs and header extension
fn rtp_header_len(packet: &[u8]) -> Result<usize, SrtpError> {
    if packet.len() < RTP_HEADER_LEN {
        return Err(SrtpError::PacketTooShort);
    }

    let csrc_count = usize::from(packet[0] & 0x0F);
    let has_extension = packet[0] & 0x10 != 0;

    let mut len = RTP_HEADER_LEN + csrc_count * 4;

    if has_extension {
        let Some(&[_, _, hi, lo]) = packet.get(len..len + 4) else {
            return Err(SrtpError::PacketTooShort);
        };

        len += 4 + usize::from(u16::from_be_bytes([hi, lo])) * 4;
    }

    if packet.len() < len {
        return Err(SrtpError::PacketTooShort);
    }

    Ok(len)
}

fn auth_mac(auth_key: &[u8], authenticated: &[u8], trailer: &[u8]) -> Result<HmacSha1, SrtpError> {
    let mut mac = HmacSha1::new_from_slice(auth_key).map_err(|_| SrtpError::AuthFail)?;
    mac.update(authenticated);
    mac.update(trailer);
    Ok(mac)
}

fn auth_tag(auth_key: &[u8], authenticated: &[u8], trailer: &[u8]) -> Result<[u8; 20], SrtpError> {
    let digest = auth_mac(auth_key, authenticated, trailer)?
        .finalize()
        .into_bytes();

    let mut tag = [0u8; 20];
    tag.copy_from_slice(&digest);
    Ok(tag)
}

fn verify_auth_tag(
    auth_key: &[u8],
    authenticated: &[u8],
    trailer: &[u8],
    tag: &[u8],
) -> Result<(), SrtpError> {
    auth_mac(auth_key, authenticated, trailer)?
        .verify_truncated_left(tag)
        .map_err(|_| SrtpError::AuthFail)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0xE1, 0xF9, 0x7A, 0x0D, 0x3E, 0x01, 0x8B, 0xE0, 0xD6, 0x4F, 0xA3, 0x2C, 0x06, 0xDE, 0x41,
        0x39,
    ];
    const SALT: [u8; 14] = [
        0x0E, 0xC6, 0x75, 0xAD, 0x49, 0x8A, 0xFE, 0xEB, 0xB6, 0x96, 0x0B, 0x3A, 0xAB, 0xE6,
    ];

    fn session(suite: &'static CryptoSuite) -> SrtpSession {
        SrtpSession::new(SrtpPolicy::new(suite, &KEY, &SALT).unwrap()).unwrap()
    }

    fn rtp_packet(seq: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x80, 0x00];
        packet.extend_from_slice(&seq.to_be_bytes());
        packet.extend_from_slice(&1234u32.to_be_bytes());
        packet.extend_from_slice(&0xDEADBEEFu32.to_be_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    fn rtcp_receiver_report() -> Vec<u8> {
        let mut packet = vec![0x81, 201, 0x00, 0x07];
        packet.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        packet.extend_from_slice(&[0xAA; 24]);
        packet
    }

    #[test]
    fn rtp_roundtrip() {
        let mut tx = session(CryptoSuite::DEFAULT);
        let mut rx = session(CryptoSuite::DEFAULT);

        let plain = rtp_packet(1, &[0xFF; 160]);
        let mut packet = plain.clone();

        tx.protect_rtp(&mut packet).unwrap();
        assert_eq!(packet.len(), plain.len() + 10);
        assert_eq!(packet[..12], plain[..12]);
        assert_ne!(packet[12..172], plain[12..]);

        rx.unprotect_rtp(&mut packet).unwrap();
        assert_eq!(packet, plain);
    }

    #[test]
    fn short_auth_tag() {
        let suite = CryptoSuite::by_name("AES_CM_128_HMAC_SHA1_32").unwrap();
        let mut tx = session(suite);
        let mut rx = session(suite);

        let plain = rtp_packet(5, &[1, 2, 3, 4, 5]);
        let mut packet = plain.clone();
        tx.protect_rtp(&mut packet).unwrap();
        assert_eq!(packet.len(), plain.len() + 4);

        rx.unprotect_rtp(&mut packet).unwrap();
        assert_eq!(packet, plain);
    }

    #[test]
    fn aes_256_roundtrip() {
        let suite = CryptoSuite::by_name("AES_256_CM_HMAC_SHA1_80").unwrap();
        let key = [3u8; 32];

        let mut tx = SrtpSession::new(SrtpPolicy::new(suite, &key, &SALT).unwrap()).unwrap();
        let mut rx = SrtpSession::new(SrtpPolicy::new(suite, &key, &SALT).unwrap()).unwrap();

        let plain = rtp_packet(77, &[9; 40]);
        let mut packet = plain.clone();
        tx.protect_rtp(&mut packet).unwrap();
        rx.unprotect_rtp(&mut packet).unwrap();
        assert_eq!(packet, plain);
    }

    #[test]
    fn tampered_packet_is_rejected() {
        let mut tx = session(CryptoSuite::DEFAULT);
        let mut rx = session(CryptoSuite::DEFAULT);

        let mut packet = rtp_packet(1, &[0xFF; 20]);
        tx.protect_rtp(&mut packet).unwrap();
        packet[14] ^= 0x01;

        assert_eq!(rx.unprotect_rtp(&mut packet), Err(SrtpError::AuthFail));
    }

    #[test]
    fn replayed_packet_is_rejected() {
        let mut tx = session(CryptoSuite::DEFAULT);
        let mut rx = session(CryptoSuite::DEFAULT);

        let mut packet = rtp_packet(10, &[0xFF; 20]);
        tx.protect_rtp(&mut packet).unwrap();

        let mut replay = packet.clone();
        rx.unprotect_rtp(&mut packet).unwrap();
        assert_eq!(rx.unprotect_rtp(&mut replay), Err(SrtpError::ReplayFail));
    }

    #[test]
    fn rollover_counter_follows_sequence_wrap() {
        let mut tx = session(CryptoSuite::DEFAULT);
        let mut rx = session(CryptoSuite::DEFAULT);

        for seq in [0xFFFE, 0xFFFF, 0x0000, 0x0001] {
            let plain = rtp_packet(seq, &[seq as u8; 8]);
            let mut packet = plain.clone();
            tx.protect_rtp(&mut packet).unwrap();
            rx.unprotect_rtp(&mut packet).unwrap();
            assert_eq!(packet, plain);
        }

        assert_eq!(tx.stream_roc(0xDEADBEEF), Some(1));
        assert_eq!(rx.stream_roc(0xDEADBEEF), Some(1));
    }

    #[test]
    fn rtcp_roundtrip() {
        let mut tx = session(CryptoSuite::DEFAULT);
        let mut rx = session(CryptoSuite::DEFAULT);

        let plain = rtcp_receiver_report();
        let mut packet = plain.clone();

        tx.protect_rtcp(&mut packet).unwrap();
        assert_eq!(packet.len(), plain.len() + 4 + 10);
        assert_eq!(packet[..8], plain[..8]);
        assert_ne!(packet[8..32], plain[8..]);

        rx.unprotect_rtcp(&mut packet).unwrap();
        assert_eq!(packet, plain);
    }

    #[test]
    fn rtcp_uses_80_bit_tag_with_32_bit_suite() {
        let suite = CryptoSuite::by_name("AES_CM_128_HMAC_SHA1_32").unwrap();
        let mut tx = session(suite);

        let plain = rtcp_receiver_report();
        let mut packet = plain.clone();
        tx.protect_rtcp(&mut packet).unwrap();
        assert_eq!(packet.len(), plain.len() + 4 + 10);
    }

    #[test]
    fn truncated_packets() {
        let mut rx = session(CryptoSuite::DEFAULT);

        assert_eq!(
            rx.unprotect_rtp(&mut vec![0x80; 15]),
            Err(SrtpError::PacketTooShort)
        );
        assert_eq!(
            rx.unprotect_rtcp(&mut vec![0x80; 12]),
            Err(SrtpError::PacketTooShort)
        );
    }

    #[test]
    fn resumed_stream_continues_packet_index() {
        let mut tx = session(CryptoSuite::DEFAULT);
        let mut rx = session(CryptoSuite::DEFAULT);

        for seq in [0xFFFF, 0x0000, 0x0005] {
            let mut packet = rtp_packet(seq, &[1; 8]);
            tx.protect_rtp(&mut packet).unwrap();
            rx.unprotect_rtp(&mut packet).unwrap();
        }
        tx.protect_rtcp(&mut rtcp_receiver_report()).unwrap();

        let states = tx.stream_states();
        assert!(states.contains(&SrtpStreamState {
            ssrc: 0xDEADBEEF,
            roc: 1,
            highest_seq: Some(5),
            srtcp_index: 0,
        }));

        let mut resumed = session(CryptoSuite::DEFAULT);
        resumed.resume_streams(&states);
        assert_eq!(resumed.stream_roc(0xDEADBEEF), Some(1));

        let plain = rtp_packet(6, &[2; 8]);
        let mut packet = plain.clone();
        resumed.protect_rtp(&mut packet).unwrap();
        rx.unprotect_rtp(&mut packet).unwrap();
        assert_eq!(packet, plain);

        // The SRTCP index continues as well
        let mut report = rtcp_receiver_report();
        resumed.protect_rtcp(&mut report).unwrap();
        let index_offset = report.len() - 10 - 4;
        assert_eq!(report[index_offset..index_offset + 4], (SRTCP_E_FLAG | 1).to_be_bytes());
    }
}
