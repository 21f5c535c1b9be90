//! Mode-6 control message codec and fragment reassembly.
//!
//! ```text
//!  0                   1                   2                   3
//! |LI | VN  |Mode |R|E|M| OpCode  |          Sequence             |
//! |            Status             |       Association ID          |
//! |            Offset             |            Count              |
//! |                 Data (up to 468 bytes) ...                    |
//! ```

use crate::engine::EngineError;

pub const HEADER_LEN: usize = 12;
/// Largest payload carried by one fragment.
pub const MAX_DATA: usize = 468;
/// Header, payload and room for a MAC.
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_DATA + 24;

pub const MODE_CONTROL: u8 = 6;

const FLAG_RESPONSE: u8 = 0x80;
const FLAG_ERROR: u8 = 0x40;
const FLAG_MORE: u8 = 0x20;
const OPCODE_MASK: u8 = 0x1f;

/// Control operations the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    ReadStatus = 1,
    ReadVariables = 2,
    ReadClock = 4,
}

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Decoded 12-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub version: u8,
    pub response: bool,
    pub error: bool,
    pub more: bool,
    pub opcode: u8,
    pub sequence: u16,
    pub status: u16,
    pub assid: u16,
    pub offset: u16,
    pub count: u16,
}

impl ControlHeader {
    /// A request header for `opcode` carrying `count` payload bytes.
    pub fn request(version: u8, opcode: Opcode, sequence: u16, assid: u16, count: u16) -> Self {
        Self {
            version,
            response: false,
            error: false,
            more: false,
            opcode: opcode.code(),
            sequence,
            status: 0,
            assid,
            offset: 0,
            count,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut flags = self.opcode & OPCODE_MASK;
        if self.response {
            flags |= FLAG_RESPONSE;
        }
        if self.error {
            flags |= FLAG_ERROR;
        }
        if self.more {
            flags |= FLAG_MORE;
        }

        let mut buf = [0u8; HEADER_LEN];
        buf[0] = ((self.version & 0x07) << 3) | MODE_CONTROL;
        buf[1] = flags;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..6].copy_from_slice(&self.status.to_be_bytes());
        buf[6..8].copy_from_slice(&self.assid.to_be_bytes());
        buf[8..10].copy_from_slice(&self.offset.to_be_bytes());
        buf[10..12].copy_from_slice(&self.count.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, EngineError> {
        if buf.len() < HEADER_LEN {
            return Err(EngineError::Protocol(format!(
                "datagram too short: needed {} bytes, got {}",
                HEADER_LEN,
                buf.len()
            )));
        }

        let mode = buf[0] & 0x07;
        if mode != MODE_CONTROL {
            return Err(EngineError::Protocol(format!("unexpected mode {}", mode)));
        }

        let word = |at: usize| u16::from_be_bytes([buf[at], buf[at + 1]]);
        Ok(Self {
            version: (buf[0] >> 3) & 0x07,
            response: buf[1] & FLAG_RESPONSE != 0,
            error: buf[1] & FLAG_ERROR != 0,
            more: buf[1] & FLAG_MORE != 0,
            opcode: buf[1] & OPCODE_MASK,
            sequence: word(2),
            status: word(4),
            assid: word(6),
            offset: word(8),
            count: word(10),
        })
    }
}

/// Build a request datagram, padded to a 32-bit boundary.
pub fn encode_request(header: &ControlHeader, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    if data.len() > MAX_DATA {
        return Err(EngineError::BadArgument(format!(
            "request data too long: {} bytes, limit {}",
            data.len(),
            MAX_DATA
        )));
    }

    let mut datagram = Vec::with_capacity(HEADER_LEN + data.len() + 3);
    datagram.extend_from_slice(&header.to_bytes());
    datagram.extend_from_slice(data);
    while datagram.len() % 4 != 0 {
        datagram.push(0);
    }
    Ok(datagram)
}

/// One received datagram split into header and payload.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub header: ControlHeader,
    pub data: &'a [u8],
}

impl<'a> Fragment<'a> {
    pub fn decode(datagram: &'a [u8]) -> Result<Self, EngineError> {
        let header = ControlHeader::from_bytes(datagram)?;
        let count = usize::from(header.count);
        let available = datagram.len() - HEADER_LEN;
        if count > available || count > MAX_DATA {
            return Err(EngineError::Protocol(format!(
                "fragment claims {} bytes, carries {}",
                count, available
            )));
        }
        Ok(Self {
            header,
            data: &datagram[HEADER_LEN..HEADER_LEN + count],
        })
    }
}

/// A complete response after reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub status: u16,
    pub assid: u16,
    pub data: Vec<u8>,
}

impl ControlResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Collects fragments until a gap-free run ending in a final fragment exists.
#[derive(Debug, Default)]
pub struct FragmentAssembly {
    /// (offset, payload), kept sorted by offset.
    fragments: Vec<(usize, Vec<u8>)>,
    /// End offset announced by the fragment without the M bit.
    end: Option<usize>,
    status: u16,
    assid: u16,
}

impl FragmentAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn insert(&mut self, fragment: Fragment<'_>) -> Result<(), EngineError> {
        let offset = usize::from(fragment.header.offset);
        let end = offset + fragment.data.len();

        let position = self.fragments.partition_point(|(at, _)| *at < offset);
        if let Some((at, _)) = self.fragments.get(position) {
            if *at == offset {
                tracing::trace!(offset, "Duplicate fragment dropped");
                return Ok(());
            }
            if *at < end {
                return Err(EngineError::Protocol(format!(
                    "fragment at {} overlaps fragment at {}",
                    offset, at
                )));
            }
        }
        if let Some((at, data)) = position.checked_sub(1).and_then(|i| self.fragments.get(i)) {
            if at + data.len() > offset {
                return Err(EngineError::Protocol(format!(
                    "fragment at {} overlaps fragment at {}",
                    offset, at
                )));
            }
        }

        if !fragment.header.more {
            if self.end.is_some() {
                return Err(EngineError::Protocol(
                    "response has two final fragments".to_string(),
                ));
            }
            self.end = Some(end);
        }

        self.status = fragment.header.status;
        self.assid = fragment.header.assid;
        self.fragments.insert(position, (offset, fragment.data.to_vec()));
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        let Some(end) = self.end else {
            return false;
        };
        let mut expected = 0;
        for (offset, data) in &self.fragments {
            if *offset != expected {
                return false;
            }
            expected += data.len();
        }
        expected == end
    }

    pub fn into_response(self) -> ControlResponse {
        let data = self
            .fragments
            .into_iter()
            .flat_map(|(_, data)| data)
            .collect();
        ControlResponse {
            status: self.status,
            assid: self.assid,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_datagram(offset: u16, more: bool, data: &[u8]) -> Vec<u8> {
        let header = ControlHeader {
            version: 2,
            response: true,
            error: false,
            more,
            opcode: Opcode::ReadVariables.code(),
            sequence: 9,
            status: 0x0615,
            assid: 0,
            offset,
            count: data.len() as u16,
        };
        let mut datagram = header.to_bytes().to_vec();
        datagram.extend_from_slice(data);
        datagram
    }

    #[test]
    fn request_header_layout() {
        let header = ControlHeader::request(2, Opcode::ReadStatus, 0x0102, 0x0304, 0);
        let bytes = encode_request(&header, &[]).unwrap();
        assert_eq!(
            bytes,
            vec![0x16, 0x01, 0x01, 0x02, 0x00, 0x00, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn request_is_padded() {
        let header = ControlHeader::request(2, Opcode::ReadVariables, 1, 0, 5);
        let bytes = encode_request(&header, b"clock").unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[12..17], b"clock");
        assert_eq!(&bytes[17..], &[0, 0, 0]);
    }

    #[test]
    fn oversized_request_rejected() {
        let header = ControlHeader::request(2, Opcode::ReadVariables, 1, 0, 0);
        let data = vec![b'x'; MAX_DATA + 1];
        assert!(matches!(
            encode_request(&header, &data),
            Err(EngineError::BadArgument(_))
        ));
    }

    #[test]
    fn decode_reads_flags_and_payload() {
        let datagram = response_datagram(0, true, b"abc");
        let fragment = Fragment::decode(&datagram).unwrap();
        assert!(fragment.header.response);
        assert!(fragment.header.more);
        assert!(!fragment.header.error);
        assert_eq!(fragment.header.sequence, 9);
        assert_eq!(fragment.header.status, 0x0615);
        assert_eq!(fragment.data, b"abc");
    }

    #[test]
    fn decode_rejects_short_and_wrong_mode() {
        assert!(Fragment::decode(&[0x16, 0x81]).is_err());
        let mut datagram = response_datagram(0, false, b"");
        datagram[0] = 0x13;
        assert!(Fragment::decode(&datagram).is_err());
    }

    #[test]
    fn decode_rejects_count_past_end() {
        let mut datagram = response_datagram(0, false, b"abc");
        datagram.truncate(HEADER_LEN + 1);
        assert!(Fragment::decode(&datagram).is_err());
    }

    #[test]
    fn out_of_order_fragments_reassemble() {
        let second = response_datagram(3, false, b"def");
        let first = response_datagram(0, true, b"abc");
        let mut assembly = FragmentAssembly::new();
        assembly.insert(Fragment::decode(&second).unwrap()).unwrap();
        assert!(!assembly.is_complete());
        assembly.insert(Fragment::decode(&first).unwrap()).unwrap();
        assert!(assembly.is_complete());
        assert_eq!(assembly.into_response().data, b"abcdef");
    }

    #[test]
    fn overlapping_fragment_is_an_error() {
        let first = response_datagram(0, true, b"abcd");
        let overlap = response_datagram(2, false, b"xy");
        let mut assembly = FragmentAssembly::new();
        assembly.insert(Fragment::decode(&first).unwrap()).unwrap();
        assert!(assembly.insert(Fragment::decode(&overlap).unwrap()).is_err());
    }

    #[test]
    fn duplicate_fragment_is_ignored() {
        let first = response_datagram(0, false, b"abc");
        let mut assembly = FragmentAssembly::new();
        assembly.insert(Fragment::decode(&first).unwrap()).unwrap();
        assembly.insert(Fragment::decode(&first).unwrap()).unwrap();
        assert!(assembly.is_complete());
        assert_eq!(assembly.into_response().data, b"abc");
    }
}
