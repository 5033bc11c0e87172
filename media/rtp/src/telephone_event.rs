/// Payload of a RFC 4733 `telephone-event` RTP packet
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     event     |E|R| volume    |          duration             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelephoneEvent {
    pub event: u8,
    pub end: bool,
    /// Power level of the tone in -dBm0 (0..=63)
    pub volume: u8,
    /// Duration in timestamp units
    pub duration: u16,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TelephoneEventError {
    #[error("telephone-event payload must be at least 4 bytes, got {0}")]
    TooShort(usize),
    #[error("{0:?} is not a DTMF digit")]
    InvalidDigit(char),
}

impl TelephoneEvent {
    /// Default payload type, usually negotiated dynamically
    pub const DEFAULT_PAYLOAD_TYPE: u8 = 101;
    /// Telephone events always use a fixed 8kHz clock
    pub const CLOCK_RATE: u32 = 8000;
    pub const PAYLOAD_LEN: usize = 4;

    /// Map a DTMF digit (`0-9`, `*`, `#`, `A-D`) to its event code
    pub fn digit_to_event(digit: char) -> Result<u8, TelephoneEventError> {
        let event = match digit.to_ascii_uppercase() {
            c @ '0'..='9' => c as u8 - b'0',
            '*' => 10,
            '#' => 11,
            c @ 'A'..='D' => c as u8 - b'A' + 12,
            _ => return Err(TelephoneEventError::InvalidDigit(digit)),
        };

        Ok(event)
    }

    /// Map an event code back to its DTMF digit
    pub fn event_to_digit(event: u8) -> Option<char> {
        match event {
            0..=9 => Some(char::from(b'0' + event)),
            10 => Some('*'),
            11 => Some('#'),
            12..=15 => Some(char::from(b'A' + event - 12)),
            _ => None,
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let [d0, d1] = self.duration.to_be_bytes();

        [
            self.event,
            (u8::from(self.end) << 7) | (self.volume & 0x3F),
            d0,
            d1,
        ]
    }

    pub fn parse(payload: &[u8]) -> Result<Self, TelephoneEventError> {
        let &[event, flags, d0, d1, ..] = payload else {
            return Err(TelephoneEventError::TooShort(payload.len()));
        };

        Ok(Self {
            event,
            end: flags & 0x80 != 0,
            volume: flags & 0x3F,
            duration: u16::from_be_bytes([d0, d1]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits() {
        assert_eq!(TelephoneEvent::digit_to_event('5'), Ok(5));
        assert_eq!(TelephoneEvent::digit_to_event('*'), Ok(10));
        assert_eq!(TelephoneEvent::digit_to_event('#'), Ok(11));
        assert_eq!(TelephoneEvent::digit_to_event('d'), Ok(15));
        assert_eq!(
            TelephoneEvent::digit_to_event('x'),
            Err(TelephoneEventError::InvalidDigit('x'))
        );

        assert_eq!(TelephoneEvent::event_to_digit(12), Some('A'));
        assert_eq!(TelephoneEvent::event_to_digit(16), None);
    }

    #[test]
    fn wire_format() {
        let event = TelephoneEvent {
            event: 11,
            end: true,
            volume: 10,
            duration: 800,
        };

        assert_eq!(event.to_bytes(), [11, 0x8A, 0x03, 0x20]);
        assert_eq!(TelephoneEvent::parse(&event.to_bytes()), Ok(event));
        assert_eq!(
            TelephoneEvent::parse(&[1, 2, 3]),
            Err(TelephoneEventError::TooShort(3))
        );
    }
}
