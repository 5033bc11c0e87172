use crate::{CryptoSuite, SrtpError};
use aes::cipher::{KeyIvInit, StreamCipher};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

const LABEL_RTP_ENCRYPTION: u8 = 0x00;
const LABEL_RTP_AUTH: u8 = 0x01;
const LABEL_RTP_SALT: u8 = 0x02;
const LABEL_RTCP_ENCRYPTION: u8 = 0x03;
const LABEL_RTCP_AUTH: u8 = 0x04;
const LABEL_RTCP_SALT: u8 = 0x05;

/// Session keys derived from a master key & salt
#[derive(Clone)]
pub struct SessionKeys {
    pub cipher_key: Vec<u8>,
    pub auth_key: Vec<u8>,
    pub salt: Vec<u8>,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl SessionKeys {
    /// Derive the SRTP session keys (labels 0-2)
    pub fn derive_rtp(
        suite: &CryptoSuite,
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<Self, SrtpError> {
        Self::derive(
            suite,
            master_key,
            master_salt,
            [LABEL_RTP_ENCRYPTION, LABEL_RTP_AUTH, LABEL_RTP_SALT],
        )
    }

    /// Derive the SRTCP session keys (labels 3-5)
    pub fn derive_rtcp(
        suite: &CryptoSuite,
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<Self, SrtpError> {
        Self::derive(
            suite,
            master_key,
            master_salt,
            [LABEL_RTCP_ENCRYPTION, LABEL_RTCP_AUTH, LABEL_RTCP_SALT],
        )
    }

    fn derive(
        suite: &CryptoSuite,
        master_key: &[u8],
        master_salt: &[u8],
        [enc, auth, salt]: [u8; 3],
    ) -> Result<Self, SrtpError> {
        if master_key.len() != suite.cipher_key_len {
            return Err(SrtpError::KeyLength {
                expected: suite.cipher_key_len,
                got: master_key.len(),
            });
        }

        if master_salt.len() != suite.salt_len {
            return Err(SrtpError::SaltLength {
                expected: suite.salt_len,
                got: master_salt.len(),
            });
        }

        Ok(Self {
            cipher_key: prf(master_key, master_salt, enc, suite.cipher_key_len)?,
            auth_key: prf(master_key, master_salt, auth, suite.auth_key_len)?,
            salt: prf(master_key, master_salt, salt, suite.salt_len)?,
        })
    }
}

/// AES-CM PRF with key derivation rate 0 (RFC 3711 section 4.3)
fn prf(
    master_key: &[u8],
    master_salt: &[u8],
    label: u8,
    len: usize,
) -> Result<Vec<u8>, SrtpError> {
    let mut iv = [0u8; 16];
    iv[..master_salt.len()].copy_from_slice(master_salt);
    iv[7] ^= label;

    let mut output = vec![0u8; len];
    apply_keystream(master_key, &iv, &mut output)?;
    Ok(output)
}

/// Counter mode IV: `(salt << 16) ^ (ssrc << 64) ^ (index << 16)`
pub(crate) fn packet_iv(salt: &[u8], ssrc: u32, index: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];

    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[8..14].copy_from_slice(&index.to_be_bytes()[2..]);

    for (iv, salt) in iv.iter_mut().zip(salt) {
        *iv ^= salt;
    }

    iv
}

pub(crate) fn apply_keystream(key: &[u8], iv: &[u8; 16], data: &mut [u8]) -> Result<(), SrtpError> {
    let invalid = |_| SrtpError::KeyLength {
        expected: 16,
        got: key.len(),
    };

    match key.len() {
        24 => Aes192Ctr::new_from_slices(key, iv)
            .map_err(invalid)?
            .apply_keystream(data),
        32 => Aes256Ctr::new_from_slices(key, iv)
            .map_err(invalid)?
            .apply_keystream(data),
        _ => Aes128Ctr::new_from_slices(key, iv)
            .map_err(invalid)?
            .apply_keystream(data),
    }

    Ok(())
}
