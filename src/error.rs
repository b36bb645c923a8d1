use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of input at offset {offset}")]
    TruncatedInput { offset: usize },

    #[error("malformed string at offset {offset} (byte {byte:#04x})")]
    MalformedString { offset: usize, byte: u8 },

    #[error("unknown attachment type {kind} at offset {offset}")]
    UnknownAttachmentType { kind: u8, offset: usize },

    #[error("unknown timeline type {kind} at offset {offset}")]
    UnknownTimelineType { kind: u8, offset: usize },

    #[error("invalid skeleton data: {message}")]
    InvalidData { message: String },

    /// Wrapper every decode failure surfaces as; the underlying cause is in
    /// `source`.
    #[error("error reading skeleton data: {source}")]
    SkeletonRead { source: Box<Error> },
}
