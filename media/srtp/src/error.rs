/// Catch-all error type returned by most functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SrtpError {
    #[error("invalid master key length, expected {expected} bytes, got {got}")]
    KeyLength { expected: usize, got: usize },
    #[error("invalid master salt length, expected {expected} bytes, got {got}")]
    SaltLength { expected: usize, got: usize },
    #[error("packet is too short to be processed")]
    PacketTooShort,
    #[error("authentication failure")]
    AuthFail,
    #[error("replay check failed (bad index)")]
    ReplayFail,
    #[error("replay check failed (index too old)")]
    ReplayOld,
}
