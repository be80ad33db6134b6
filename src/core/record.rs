use crate::core::{Error, Result};

pub const PAYLOAD_CAPACITY: usize = 256;
/// Usable payload bytes; the last byte is always the NUL terminator.
pub const MAX_PAYLOAD_LEN: usize = PAYLOAD_CAPACITY - 1;

pub const STATUS_OFFSET: usize = 0;
pub const CLIENT_ID_OFFSET: usize = 4;

/// Payload written with `Status::Free` when a server exits.
pub const SHUTDOWN_SENTINEL: &str = "SERVER_SHUTDOWN";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Free,
    Request,
    Response,
}

impl Status {
    pub fn as_raw(self) -> i32 {
        match self {
            Status::Free => 0,
            Status::Request => 1,
            Status::Response => 2,
        }
    }

    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Status::Free),
            1 => Ok(Status::Request),
            2 => Ok(Status::Response),
            _ => Err(Error::Corrupt("unknown status value")),
        }
    }
}

/// Field set of the on-disk record.
///
/// `Simple` is `{status, payload}`; `MultiClient` inserts a 4-byte client id
/// between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLayout {
    Simple,
    MultiClient,
}

impl RecordLayout {
    pub const fn size(self) -> usize {
        self.payload_offset() + PAYLOAD_CAPACITY
    }

    pub const fn payload_offset(self) -> usize {
        match self {
            RecordLayout::Simple => 4,
            RecordLayout::MultiClient => 8,
        }
    }

    pub const fn has_client_id(self) -> bool {
        matches!(self, RecordLayout::MultiClient)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    pub status: Status,
    pub client_id: u32,
    payload: [u8; PAYLOAD_CAPACITY],
}

impl Default for Record {
    fn default() -> Self {
        Self::free(0)
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("status", &self.status)
            .field("client_id", &self.client_id)
            .field("payload", &self.payload_text())
            .finish()
    }
}

impl Record {
    pub fn new(status: Status, client_id: u32, payload: &str) -> Self {
        let mut record = Self {
            status,
            client_id,
            payload: [0u8; PAYLOAD_CAPACITY],
        };
        record.set_payload(payload);
        record
    }

    /// A released slot with an empty payload.
    pub fn free(client_id: u32) -> Self {
        Self {
            status: Status::Free,
            client_id,
            payload: [0u8; PAYLOAD_CAPACITY],
        }
    }

    pub fn request(client_id: u32, payload: &str) -> Self {
        Self::new(Status::Request, client_id, payload)
    }

    pub fn response(client_id: u32, payload: &str) -> Self {
        Self::new(Status::Response, client_id, payload)
    }

    pub fn shutdown_notice() -> Self {
        Self::new(Status::Free, 0, SHUTDOWN_SENTINEL)
    }

    /// Replaces the payload, truncating to `MAX_PAYLOAD_LEN` bytes on a char
    /// boundary. Returns `true` if the text was truncated.
    pub fn set_payload(&mut self, text: &str) -> bool {
        let mut end = text.len().min(MAX_PAYLOAD_LEN);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &text.as_bytes()[..end];
        // Interior NULs would end the text early on the reading side.
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(end);
        self.payload = [0u8; PAYLOAD_CAPACITY];
        self.payload[..end].copy_from_slice(&bytes[..end]);
        end < text.len()
    }

    pub fn payload_bytes(&self) -> &[u8] {
        let len = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_PAYLOAD_LEN);
        &self.payload[..len]
    }

    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(self.payload_bytes()).into_owned()
    }

    pub fn is_shutdown_notice(&self) -> bool {
        self.status == Status::Free && self.payload_bytes() == SHUTDOWN_SENTINEL.as_bytes()
    }

    pub fn encode(&self, layout: RecordLayout, buf: &mut [u8]) -> Result<()> {
        if buf.len() != layout.size() {
            return Err(Error::Corrupt("record buffer size mismatch"));
        }
        buf.fill(0);
        buf[STATUS_OFFSET..STATUS_OFFSET + 4].copy_from_slice(&self.status.as_raw().to_le_bytes());
        if layout.has_client_id() {
            let id = i32::try_from(self.client_id)
                .map_err(|_| Error::Corrupt("client id out of range"))?;
            buf[CLIENT_ID_OFFSET..CLIENT_ID_OFFSET + 4].copy_from_slice(&id.to_le_bytes());
        }
        let offset = layout.payload_offset();
        buf[offset..offset + MAX_PAYLOAD_LEN].copy_from_slice(&self.payload[..MAX_PAYLOAD_LEN]);
        Ok(())
    }

    pub fn to_bytes(&self, layout: RecordLayout) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; layout.size()];
        self.encode(layout, &mut buf)?;
        Ok(buf)
    }

    pub fn decode(layout: RecordLayout, buf: &[u8]) -> Result<Self> {
        if buf.len() != layout.size() {
            return Err(Error::Corrupt("record buffer size mismatch"));
        }
        let status = Status::from_raw(read_i32(buf, STATUS_OFFSET)?)?;
        let client_id = if layout.has_client_id() {
            // Negative ids never come from a conforming peer; fold them to "unassigned".
            u32::try_from(read_i32(buf, CLIENT_ID_OFFSET)?).unwrap_or(0)
        } else {
            0
        };
        let offset = layout.payload_offset();
        let mut payload = [0u8; PAYLOAD_CAPACITY];
        payload[..MAX_PAYLOAD_LEN].copy_from_slice(&buf[offset..offset + MAX_PAYLOAD_LEN]);
        Ok(Self {
            status,
            client_id,
            payload,
        })
    }
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(Error::Corrupt("record field out of bounds"))?;
    Ok(i32::from_le_bytes(bytes))
}
