use rtp::StatisticsSnapshot;
use tokio::sync::mpsc;

/// Category of a key exchange warning or failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationCategory {
    /// SDES crypto attribute could not be used
    Sdes,
    /// Error code reported by the ZRTP protocol
    Zrtp,
    /// Severe ZRTP engine failure (e.g. retries exhausted)
    Severe,
}

/// Event emitted by a media session to the call management layer
#[derive(Debug, Clone, PartialEq)]
pub enum CallEventKind {
    /// Media is now encrypted using the given cipher
    SecureOn { cipher: String },
    /// Media is no longer encrypted
    SecureOff,
    /// Short authentication string the users should compare
    ShowSas { sas: String, verified: bool },
    /// The peer does not support ZRTP
    NotSupportedByPeer,
    /// The peer requested to switch back to unencrypted media
    ConfirmGoClear,
    /// Recoverable key exchange problem, the session continues
    NegotiationWarning {
        reason: String,
        category: NegotiationCategory,
    },
    /// Key exchange failed, the call itself is not torn down
    NegotiationFailed {
        reason: String,
        category: NegotiationCategory,
    },
    /// Periodic transport statistics
    Statistics(StatisticsSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub call_id: String,
    pub kind: CallEventKind,
}

/// Sending half of the event channel shared by all components of a call
#[derive(Debug, Clone)]
pub struct EventSink {
    call_id: String,
    tx: Option<mpsc::UnboundedSender<CallEvent>>,
}

impl EventSink {
    pub fn new(call_id: impl Into<String>, tx: mpsc::UnboundedSender<CallEvent>) -> Self {
        Self {
            call_id: call_id.into(),
            tx: Some(tx),
        }
    }

    /// Sink which only logs events
    pub fn disabled(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tx: None,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub(crate) fn emit(&self, kind: CallEventKind) {
        log::debug!("call {}: {kind:?}", self.call_id);

        let Some(tx) = &self.tx else {
            return;
        };

        let event = CallEvent {
            call_id: self.call_id.clone(),
            kind,
        };

        if tx.send(event).is_err() {
            log::debug!("call {}: event receiver dropped", self.call_id);
        }
    }
}
