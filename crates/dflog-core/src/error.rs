use thiserror::Error;

#[derive(Error, Debug)]
pub enum DfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format character '{ch}' in message {name}")]
    UnsupportedFormatChar { ch: char, name: String },

    #[error("record length mismatch for {name}: descriptor declares {expected} bytes, body supplied {actual}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown record type {type_id} at offset {offset}")]
    UnknownType { type_id: u8, offset: usize },

    #[error("bad header 0x{byte0:02x} 0x{byte1:02x} at offset {offset}")]
    BadHeader { byte0: u8, byte1: u8, offset: usize },

    #[error("short read at offset {offset}: expected {expected} bytes, {actual} available")]
    ShortRead {
        offset: usize,
        expected: usize,
        actual: usize,
    },

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("type mismatch accessing field '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("no FMT descriptor installed for type id {0}")]
    NoSuchDescriptor(u8),

    #[error("no unused format type id available")]
    RegistryFull,
}
