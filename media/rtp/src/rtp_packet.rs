use crate::{RtpTimestamp, SequenceNumber, Ssrc};
use bytes::Bytes;
use rtp_types::{RtpPacketBuilder, prelude::RtpPacketWriter};

#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub pt: u8,
    pub sequence_number: SequenceNumber,
    pub ssrc: Ssrc,
    pub timestamp: RtpTimestamp,
    pub marker: bool,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn write_vec(&self, vec: &mut Vec<u8>) -> Result<(), rtp_types::RtpWriteError> {
        let builder = RtpPacketBuilder::<_, Vec<u8>>::new()
            .payload_type(self.pt)
            .sequence_number(self.sequence_number.0)
            .ssrc(self.ssrc.0)
            .timestamp(self.timestamp.0)
            .marker_bit(self.marker)
            .payload(&self.payload[..]);

        vec.reserve(builder.calculate_size()?);

        let mut writer = RtpPacketWriterVec { output: vec };
        builder.write(&mut writer)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, rtp_types::RtpWriteError> {
        let mut vec = Vec::with_capacity(1500);
        self.write_vec(&mut vec)?;
        Ok(vec)
    }

    pub fn parse(bytes: impl Into<Bytes>) -> Result<Self, rtp_types::RtpParseError> {
        let packet: Bytes = bytes.into();

        let parsed = rtp_types::RtpPacket::parse(&packet[..])?;

        Ok(RtpPacket {
            pt: parsed.payload_type(),
            sequence_number: SequenceNumber(parsed.sequence_number()),
            ssrc: Ssrc(parsed.ssrc()),
            timestamp: RtpTimestamp(parsed.timestamp()),
            marker: parsed.marker_bit(),
            payload: packet.slice_ref(parsed.payload()),
        })
    }
}

struct RtpPacketWriterVec<'a> {
    output: &'a mut Vec<u8>,
}

impl<'a> RtpPacketWriter for RtpPacketWriterVec<'a> {
    type Output = ();
    type Payload = &'a [u8];
    type Extension = Vec<u8>;

    fn reserve(&mut self, size: usize) {
        self.output.reserve(size);
    }

    fn push(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data)
    }

    fn push_extension(&mut self, extension_data: &Self::Extension) {
        self.push(extension_data)
    }

    fn push_payload(&mut self, data: &Self::Payload) {
        self.push(data)
    }

    fn padding(&mut self, _size: u8) {}

    fn finish(&mut self) -> Self::Output {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_parse() {
        let packet = RtpPacket {
            pt: 101,
            sequence_number: SequenceNumber(4711),
            ssrc: Ssrc(0x1234_5678),
            timestamp: RtpTimestamp(160),
            marker: true,
            payload: Bytes::from_static(&[1, 0x8a, 0x03, 0x20]),
        };

        let bytes = packet.to_vec().unwrap();
        assert_eq!(bytes.len(), 12 + 4);

        let parsed = RtpPacket::parse(bytes).unwrap();
        assert_eq!(parsed.pt, 101);
        assert_eq!(parsed.sequence_number, SequenceNumber(4711));
        assert_eq!(parsed.ssrc, Ssrc(0x1234_5678));
        assert_eq!(parsed.timestamp, RtpTimestamp(160));
        assert!(parsed.marker);
        assert_eq!(&parsed.payload[..], &[1, 0x8a, 0x03, 0x20]);
    }
}
