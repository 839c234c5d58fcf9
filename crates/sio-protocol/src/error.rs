use thiserror::Error;

/// Structural (protocol) decode/construction errors.
///
/// These are distinct from application errors (see `sio-server`'s
/// `ConnectRefused`): a structural error means the frame or packet itself
/// is malformed, not that a handler rejected a connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("empty packet frame")]
    EmptyFrame,
    #[error("unknown packet type digit {0:?}")]
    InvalidPacketType(char),
    #[error("invalid attachment count segment")]
    InvalidAttachmentCount,
    #[error("binary packet type declared with no binary attachments")]
    BinaryTypeWithoutBinaryLeaves,
    #[error("non-binary packet type constructed with binary leaves in data")]
    NonBinaryTypeWithBinaryLeaves,
    #[error("more attachments supplied than attachment_count declared")]
    TooManyAttachments,
    #[error("namespace segment must start with '/'")]
    InvalidNamespace(String),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}
