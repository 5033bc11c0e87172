//! Human readable descriptions of the ZRTP engine's message codes

use super::Severity;

pub(crate) const INFO_SECURE_STATE_ON: i32 = 10;
pub(crate) const WARNING_SRTP_AUTH_ERROR: i32 = 6;
pub(crate) const WARNING_SRTP_REPLAY_ERROR: i32 = 7;

const INFO_MESSAGES: [(i32, &str); 11] = [
    (1, "Hello received, preparing a Commit"),
    (2, "Commit: Generated a public DH key"),
    (3, "Responder: Commit received, preparing DHPart1"),
    (4, "DH1Part: Generated a public DH key"),
    (5, "Initiator: DHPart1 received, preparing DHPart2"),
    (6, "Responder: DHPart2 received, preparing Confirm1"),
    (7, "Initiator: Confirm1 received, preparing Confirm2"),
    (8, "Responder: Confirm2 received, preparing Conf2Ack"),
    (9, "At least one retained secrets matches - security OK"),
    (INFO_SECURE_STATE_ON, "Entered secure state"),
    (11, "No more security for this session"),
];

const WARNING_MESSAGES: [(i32, &str); 8] = [
    (
        1,
        "Commit contains an AES256 cipher but does not offer a Diffie-Hellman 4096",
    ),
    (2, "Received a GoClear message"),
    (
        3,
        "Hello offers an AES256 cipher but does not offer a Diffie-Hellman 4096",
    ),
    (4, "No retained shared secrets available - must verify SAS"),
    (5, "Internal ZRTP packet checksum mismatch - packet dropped"),
    (
        WARNING_SRTP_AUTH_ERROR,
        "Dropping packet because SRTP authentication failed",
    ),
    (
        WARNING_SRTP_REPLAY_ERROR,
        "Dropping packet because SRTP replay check failed",
    ),
    (
        8,
        "Valid retained shared secrets available but no matches found - must verify SAS",
    ),
];

const SEVERE_MESSAGES: [(i32, &str); 8] = [
    (1, "Hash HMAC check of Hello failed"),
    (2, "Hash HMAC check of Commit failed"),
    (3, "Hash HMAC check of DHPart1 failed"),
    (4, "Hash HMAC check of DHPart2 failed"),
    (5, "Cannot send data - connection or peer down?"),
    (6, "Internal protocol error occurred"),
    (7, "Cannot start a timer - internal resources exhausted?"),
    (
        8,
        "Too many retries during ZRTP negotiation - connection or peer down?",
    ),
];

const ZRTP_ERROR_MESSAGES: [(i32, &str); 18] = [
    (0x10, "Malformed packet (CRC OK, but wrong structure)"),
    (0x20, "Critical software error"),
    (0x30, "Unsupported ZRTP version"),
    (0x40, "Hello components mismatch"),
    (0x51, "Hash type not supported"),
    (0x52, "Cipher type not supported"),
    (0x53, "Public key exchange not supported"),
    (0x54, "SRTP auth. tag not supported"),
    (0x55, "SAS scheme not supported"),
    (0x56, "No shared secret available, DH mode required"),
    (0x61, "DH Error: bad pvi or pvr ( == 1, 0, or p-1)"),
    (0x62, "DH Error: hvi != hashed data"),
    (0x63, "Received relayed SAS from untrusted MiTM"),
    (0x70, "Auth. Error: Bad Confirm pkt HMAC"),
    (0x80, "Nonce reuse"),
    (0x90, "Equal ZIDs in Hello"),
    (0x100, "GoClear packet received, but not allowed"),
    (0x7fff_ffff, "Packet ignored"),
];

/// Describe a message code, unknown codes produce a generic description
pub(crate) fn describe(severity: Severity, code: i32) -> String {
    let table: &[(i32, &str)] = match severity {
        Severity::Info => &INFO_MESSAGES,
        Severity::Warning => &WARNING_MESSAGES,
        Severity::Severe => &SEVERE_MESSAGES,
        // Received errors are reported with a negative code
        Severity::ZrtpError => &ZRTP_ERROR_MESSAGES,
    };

    let code = if severity == Severity::ZrtpError {
        code.wrapping_abs()
    } else {
        code
    };

    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, message)| (*message).to_owned())
        .unwrap_or_else(|| format!("unknown {severity:?} code {code:#x}"))
}
