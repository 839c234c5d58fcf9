use itertools::Itertools;

use crate::error::Error;
use crate::value::{extract_binary, fill_placeholders, Value};

/// The seven Socket.IO packet types, keyed by their wire-format digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    ConnectError = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl PacketType {
    fn from_digit(c: char) -> Result<Self, Error> {
        match c {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' => Ok(Self::BinaryEvent),
            '6' => Ok(Self::BinaryAck),
            other => Err(Error::InvalidPacketType(other)),
        }
    }

    fn to_digit(self) -> char {
        (b'0' + self as u8) as char
    }

    pub fn is_binary(self) -> bool {
        matches!(self, Self::BinaryEvent | Self::BinaryAck)
    }
}

/// One Socket.IO packet: the in-memory record produced by [`Packet::decode`]
/// or built with [`Packet::new`]/the convenience constructors, and consumed
/// by [`Packet::encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub r#type: PacketType,
    /// Always starts with `/`; `"/"` is the default namespace.
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Value,
    pub attachment_count: usize,
    /// Accumulated during reassembly (see [`Packet::add_attachment`]); empty
    /// for freshly constructed outbound packets.
    pub attachments: Vec<Vec<u8>>,
}

/// The wire form of an encoded packet: one text frame, plus zero or more
/// raw binary frames to be sent immediately afterward in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub text: String,
    pub attachments: Vec<Vec<u8>>,
}

fn normalize_namespace(ns: impl Into<String>) -> String {
    let ns = ns.into();
    if ns.is_empty() {
        "/".to_string()
    } else if ns.starts_with('/') {
        ns
    } else {
        format!("/{ns}")
    }
}

impl Packet {
    /// Build a packet from its logical fields, validating the binary
    /// invariants and upgrading `Event`/`Ack` to their binary counterparts
    /// when `data` contains byte-string leaves.
    pub fn new(
        kind: PacketType,
        namespace: impl Into<String>,
        id: Option<u64>,
        data: Value,
    ) -> Result<Self, Error> {
        let has_binary = data.contains_binary_leaf();
        let kind = match kind {
            PacketType::Event if has_binary => PacketType::BinaryEvent,
            PacketType::Ack if has_binary => PacketType::BinaryAck,
            other => other,
        };
        match (kind.is_binary(), has_binary) {
            (true, false) => return Err(Error::BinaryTypeWithoutBinaryLeaves),
            (false, true) => return Err(Error::NonBinaryTypeWithBinaryLeaves),
            _ => {}
        }
        Ok(Self {
            r#type: kind,
            namespace: normalize_namespace(namespace),
            id,
            attachment_count: data.count_binary_leaves(),
            data,
            attachments: Vec::new(),
        })
    }

    pub fn connect(namespace: impl Into<String>, data: Value) -> Result<Self, Error> {
        Self::new(PacketType::Connect, namespace, None, data)
    }

    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Self::new(PacketType::Disconnect, namespace, None, Value::Null)
            .expect("Disconnect packets never carry binary data")
    }

    pub fn event(namespace: impl Into<String>, id: Option<u64>, data: Value) -> Result<Self, Error> {
        Self::new(PacketType::Event, namespace, id, data)
    }

    pub fn ack(namespace: impl Into<String>, id: u64, data: Value) -> Result<Self, Error> {
        Self::new(PacketType::Ack, namespace, Some(id), data)
    }

    pub fn connect_error(namespace: impl Into<String>, data: Value) -> Self {
        Self::new(PacketType::ConnectError, namespace, None, data)
            .expect("ConnectError payloads are plain JSON, never binary")
    }

    /// True once every declared attachment has been supplied via
    /// [`Packet::add_attachment`] (always true for non-binary types).
    pub fn is_complete(&self) -> bool {
        self.attachments.len() >= self.attachment_count
    }

    /// Feed one raw binary frame into a packet that is mid-reassembly.
    /// Returns `true` once the packet is complete, at which point `data`'s
    /// placeholders have all been replaced with the supplied bytes.
    pub fn add_attachment(&mut self, bytes: Vec<u8>) -> Result<bool, Error> {
        if self.attachments.len() >= self.attachment_count {
            return Err(Error::TooManyAttachments);
        }
        self.attachments.push(bytes);
        let complete = self.is_complete();
        if complete {
            let data = std::mem::replace(&mut self.data, Value::Null);
            self.data = fill_placeholders(data, &self.attachments);
        }
        Ok(complete)
    }

    /// Encode this packet into its wire text frame plus any binary frames,
    /// in the order they must be sent.
    pub fn encode(&self) -> Encoded {
        let mut attachments = Vec::new();
        let json_value = extract_binary(&self.data, &mut attachments);

        let mut text = String::new();
        text.push(self.r#type.to_digit());
        if self.r#type.is_binary() {
            text.push_str(&attachments.len().to_string());
            text.push('-');
        }
        if self.namespace != "/" {
            text.push_str(&self.namespace);
            text.push(',');
        }
        if let Some(id) = self.id {
            text.push_str(&id.to_string());
        }
        if !matches!(json_value, serde_json::Value::Null) {
            // `to_string` on a `Value` never fails.
            text.push_str(&json_value.to_string());
        }

        Encoded { text, attachments }
    }

    /// Decode a single text frame. Binary packets come back incomplete
    /// (`attachment_count > 0`, `attachments` empty); feed the raw payload
    /// frames that follow through [`Packet::add_attachment`].
    pub fn decode(frame: &str) -> Result<Self, Error> {
        let mut chars = frame.chars();
        let type_digit = chars.next().ok_or(Error::EmptyFrame)?;
        let kind = PacketType::from_digit(type_digit)?;

        let mut attachment_count = 0usize;
        if kind.is_binary() {
            let digits: String = chars.take_while_ref(|c| c.is_ascii_digit()).collect();
            attachment_count = digits.parse().map_err(|_| Error::InvalidAttachmentCount)?;
            if chars.next() != Some('-') {
                return Err(Error::InvalidAttachmentCount);
            }
            if attachment_count == 0 {
                return Err(Error::BinaryTypeWithoutBinaryLeaves);
            }
        }

        let namespace = if chars.clone().next() == Some('/') {
            let mut ns: String = chars.take_while_ref(|c| *c != ',').collect();
            if chars.clone().next() == Some(',') {
                chars.next();
            }
            if let Some(pos) = ns.find('?') {
                ns.truncate(pos);
            }
            ns
        } else {
            "/".to_string()
        };

        let id_digits: String = chars.take_while_ref(|c| c.is_ascii_digit()).collect();
        let id = if id_digits.is_empty() {
            None
        } else {
            Some(id_digits.parse().map_err(|_| Error::InvalidAttachmentCount)?)
        };

        let rest: String = chars.collect();
        let json_value: serde_json::Value = if rest.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&rest)?
        };
        let data = Value::from(json_value);

        if !kind.is_binary() && data.contains_binary_leaf() {
            return Err(Error::NonBinaryTypeWithBinaryLeaves);
        }

        Ok(Self {
            r#type: kind,
            namespace,
            id,
            data,
            attachment_count,
            attachments: Vec::new(),
        })
    }
}
