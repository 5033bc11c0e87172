/// Parameters of a SRTP crypto suite as named in SDES `a=crypto` attributes (RFC 4568, RFC 6188)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoSuite {
    /// Name used in the SDP crypto attribute
    pub name: &'static str,
    /// Length of the master key & the derived session encryption key
    pub cipher_key_len: usize,
    /// Length of the master salt & the derived session salt
    pub salt_len: usize,
    /// Length of the derived HMAC-SHA1 session key
    pub auth_key_len: usize,
    /// Length of the authentication tag appended to SRTP packets
    pub auth_tag_len: usize,
    /// Length of the authentication tag appended to SRTCP packets
    ///
    /// The 32 bit variants still use 80 bit tags for SRTCP.
    pub srtcp_auth_tag_len: usize,
}

const fn aes_cm(
    name: &'static str,
    cipher_key_len: usize,
    auth_tag_len: usize,
) -> CryptoSuite {
    CryptoSuite {
        name,
        cipher_key_len,
        salt_len: 14,
        auth_key_len: 20,
        auth_tag_len,
        srtcp_auth_tag_len: 10,
    }
}

/// All supported suites, ordered by preference
pub const SUITES: [CryptoSuite; 6] = [
    aes_cm("AES_CM_128_HMAC_SHA1_80", 16, 10),
    aes_cm("AES_CM_128_HMAC_SHA1_32", 16, 4),
    aes_cm("AES_192_CM_HMAC_SHA1_80", 24, 10),
    aes_cm("AES_192_CM_HMAC_SHA1_32", 24, 4),
    aes_cm("AES_256_CM_HMAC_SHA1_80", 32, 10),
    aes_cm("AES_256_CM_HMAC_SHA1_32", 32, 4),
];

impl CryptoSuite {
    /// Default suite used when nothing else was negotiated
    pub const DEFAULT: &'static CryptoSuite = &SUITES[0];

    pub fn by_name(name: &str) -> Option<&'static CryptoSuite> {
        SUITES.iter().find(|suite| suite.name == name)
    }

    pub fn by_index(index: usize) -> Option<&'static CryptoSuite> {
        SUITES.get(index)
    }

    /// Find the suite with the given cipher key length and SRTP auth tag length
    pub fn by_lengths(cipher_key_len: usize, auth_tag_len: usize) -> Option<&'static CryptoSuite> {
        SUITES
            .iter()
            .find(|s| s.cipher_key_len == cipher_key_len && s.auth_tag_len == auth_tag_len)
    }

    /// Position of this suite inside [`SUITES`]
    pub fn index(&self) -> usize {
        SUITES
            .iter()
            .position(|suite| suite == self)
            .unwrap_or_default()
    }

    /// Length of the concatenated master key and salt as carried in SDES key parameters
    pub fn master_len(&self) -> usize {
        self.cipher_key_len + self.salt_len
    }
}
