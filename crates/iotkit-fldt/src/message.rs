//! FLDT wire messages
//!
//! Every frame starts with a kind byte and the 5-byte file type. Multi-byte
//! fields are big-endian.
//!
//! | Kind | Payload after the file type |
//! |---|---|
//! | ANNOUNCE, INFO | version (9), gateway address (6) |
//! | GET_INFO, GET_HEADER | none |
//! | HEADER | descriptor (40) |
//! | GET_CHUNK | version (9), offset (u32), max length (u16) |
//! | CHUNK | version (9), offset (u32), length (u16), bytes |
//! | GET_FOOTER | version (9) |
//! | FOOTER | footer |
//! | ERROR | request kind (u8), status code (u8) |
//!
//! The version carried in chunk and footer traffic tags each exchange with
//! the file it belongs to, so responses for a cancelled download are dropped.

use iotkit_update::codec::ByteReader;
use iotkit_update::{
    CodecError, FileInfo, FileTypeId, FileVersion, FirmwareDescriptor, FirmwareFooter, MacAddr,
};
use std::fmt;

/// Message kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Unsolicited file info broadcast
    Announce = 0x01,
    /// File info query
    GetInfo = 0x02,
    /// File info reply
    Info = 0x03,
    /// Descriptor query
    GetHeader = 0x04,
    /// Descriptor reply
    Header = 0x05,
    /// Content query
    GetChunk = 0x06,
    /// Content reply
    Chunk = 0x07,
    /// Footer query
    GetFooter = 0x08,
    /// Footer reply
    Footer = 0x09,
    /// Error reply
    Error = 0x0f,
}

impl MessageKind {
    /// Map a wire value to a kind
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        Ok(match value {
            0x01 => MessageKind::Announce,
            0x02 => MessageKind::GetInfo,
            0x03 => MessageKind::Info,
            0x04 => MessageKind::GetHeader,
            0x05 => MessageKind::Header,
            0x06 => MessageKind::GetChunk,
            0x07 => MessageKind::Chunk,
            0x08 => MessageKind::GetFooter,
            0x09 => MessageKind::Footer,
            0x0f => MessageKind::Error,
            other => {
                return Err(CodecError::InvalidField {
                    field: "message.kind",
                    value: u64::from(other),
                });
            }
        })
    }

    /// Whether a client sends this kind
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            MessageKind::GetInfo
                | MessageKind::GetHeader
                | MessageKind::GetChunk
                | MessageKind::GetFooter
        )
    }
}

/// Status code carried by ERROR replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// File type not served
    Unsupported = 1,
    /// File, version, offset or footer not available
    NotFound = 2,
    /// Request could not be decoded
    Malformed = 3,
    /// Responder failed internally
    Internal = 4,
}

impl ErrorCode {
    /// Map a wire value to a code
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        Ok(match value {
            1 => ErrorCode::Unsupported,
            2 => ErrorCode::NotFound,
            3 => ErrorCode::Malformed,
            4 => ErrorCode::Internal,
            other => {
                return Err(CodecError::InvalidField {
                    field: "error.code",
                    value: u64::from(other),
                });
            }
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::Unsupported => "unsupported",
            ErrorCode::NotFound => "not found",
            ErrorCode::Malformed => "malformed",
            ErrorCode::Internal => "internal",
        };
        f.write_str(text)
    }
}

/// One FLDT frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FldtMessage {
    /// Gateway advertises what it holds
    Announce(FileInfo),
    /// Ask a gateway what it holds
    GetInfo {
        /// File type queried
        file_type: FileTypeId,
    },
    /// Answer to `GetInfo`
    Info(FileInfo),
    /// Ask for the descriptor
    GetHeader {
        /// File type queried
        file_type: FileTypeId,
    },
    /// Descriptor of the served file
    Header {
        /// File type
        file_type: FileTypeId,
        /// Served descriptor
        descriptor: FirmwareDescriptor,
    },
    /// Ask for content
    GetChunk {
        /// File type
        file_type: FileTypeId,
        /// Version being downloaded
        version: FileVersion,
        /// Start offset
        offset: u32,
        /// Largest acceptable payload
        max_len: u16,
    },
    /// Content slice
    Chunk {
        /// File type
        file_type: FileTypeId,
        /// Version the bytes belong to
        version: FileVersion,
        /// Start offset
        offset: u32,
        /// Content bytes
        data: Vec<u8>,
    },
    /// Ask for the footer
    GetFooter {
        /// File type
        file_type: FileTypeId,
        /// Version being downloaded
        version: FileVersion,
    },
    /// Footer of the served file
    Footer {
        /// File type
        file_type: FileTypeId,
        /// Served footer
        footer: FirmwareFooter,
    },
    /// Request failed
    Error {
        /// File type of the failed request
        file_type: FileTypeId,
        /// Kind of the failed request
        request: MessageKind,
        /// Status
        code: ErrorCode,
    },
}

impl FldtMessage {
    /// Kind byte and file type
    pub const HEADER_LEN: usize = 1 + FileTypeId::ENCODED_LEN;

    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            FldtMessage::Announce(_) => MessageKind::Announce,
            FldtMessage::GetInfo { .. } => MessageKind::GetInfo,
            FldtMessage::Info(_) => MessageKind::Info,
            FldtMessage::GetHeader { .. } => MessageKind::GetHeader,
            FldtMessage::Header { .. } => MessageKind::Header,
            FldtMessage::GetChunk { .. } => MessageKind::GetChunk,
            FldtMessage::Chunk { .. } => MessageKind::Chunk,
            FldtMessage::GetFooter { .. } => MessageKind::GetFooter,
            FldtMessage::Footer { .. } => MessageKind::Footer,
            FldtMessage::Error { .. } => MessageKind::Error,
        }
    }

    /// File type the message concerns
    pub fn file_type(&self) -> FileTypeId {
        match self {
            FldtMessage::Announce(info) | FldtMessage::Info(info) => info.file_type,
            FldtMessage::GetInfo { file_type }
            | FldtMessage::GetHeader { file_type }
            | FldtMessage::Header { file_type, .. }
            | FldtMessage::GetChunk { file_type, .. }
            | FldtMessage::Chunk { file_type, .. }
            | FldtMessage::GetFooter { file_type, .. }
            | FldtMessage::Footer { file_type, .. }
            | FldtMessage::Error { file_type, .. } => *file_type,
        }
    }

    /// Wire form.
    ///
    /// Fails for a chunk whose payload does not fit the 16-bit length field.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + FirmwareDescriptor::ENCODED_LEN);
        out.push(self.kind() as u8);
        out.extend_from_slice(&self.file_type().encode());

        match self {
            FldtMessage::Announce(info) | FldtMessage::Info(info) => {
                out.extend_from_slice(&info.version.encode());
                out.extend_from_slice(&info.gateway.0);
            }
            FldtMessage::GetInfo { .. } | FldtMessage::GetHeader { .. } => {}
            FldtMessage::Header { descriptor, .. } => descriptor.encode_into(&mut out),
            FldtMessage::GetChunk {
                version,
                offset,
                max_len,
                ..
            } => {
                out.extend_from_slice(&version.encode());
                out.extend_from_slice(&offset.to_be_bytes());
                out.extend_from_slice(&max_len.to_be_bytes());
            }
            FldtMessage::Chunk {
                version,
                offset,
                data,
                ..
            } => {
                let len = u16::try_from(data.len()).ok().ok_or(CodecError::InvalidField {
                    field: "chunk.length",
                    value: u64::try_from(data.len()).unwrap_or(u64::MAX),
                })?;
                out.extend_from_slice(&version.encode());
                out.extend_from_slice(&offset.to_be_bytes());
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(data);
            }
            FldtMessage::GetFooter { version, .. } => out.extend_from_slice(&version.encode()),
            FldtMessage::Footer { footer, .. } => out.extend_from_slice(&footer.encode()),
            FldtMessage::Error { request, code, .. } => {
                out.push(*request as u8);
                out.push(*code as u8);
            }
        }
        Ok(out)
    }

    /// Kind and file type of a frame, readable even when the payload is damaged
    pub fn peek(frame: &[u8]) -> Result<(MessageKind, FileTypeId), CodecError> {
        let mut reader = ByteReader::new(frame);
        let kind = MessageKind::from_u8(reader.u8()?)?;
        let file_type = FileTypeId::decode_from(&mut reader)?;
        Ok((kind, file_type))
    }

    /// Decode one frame
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(frame);
        let kind = MessageKind::from_u8(reader.u8()?)?;
        let file_type = FileTypeId::decode_from(&mut reader)?;

        let message = match kind {
            MessageKind::Announce | MessageKind::Info => {
                let info = FileInfo {
                    file_type,
                    version: FileVersion::decode_from(&mut reader)?,
                    gateway: MacAddr(reader.array::<6>()?),
                };
                if kind == MessageKind::Announce {
                    FldtMessage::Announce(info)
                } else {
                    FldtMessage::Info(info)
                }
            }
            MessageKind::GetInfo => FldtMessage::GetInfo { file_type },
            MessageKind::GetHeader => FldtMessage::GetHeader { file_type },
            MessageKind::Header => FldtMessage::Header {
                file_type,
                descriptor: FirmwareDescriptor::decode_from(&mut reader)?,
            },
            MessageKind::GetChunk => FldtMessage::GetChunk {
                file_type,
                version: FileVersion::decode_from(&mut reader)?,
                offset: reader.u32()?,
                max_len: reader.u16()?,
            },
            MessageKind::Chunk => {
                let version = FileVersion::decode_from(&mut reader)?;
                let offset = reader.u32()?;
                let len = usize::from(reader.u16()?);
                let data = reader.bytes(len)?.to_vec();
                FldtMessage::Chunk {
                    file_type,
                    version,
                    offset,
                    data,
                }
            }
            MessageKind::GetFooter => FldtMessage::GetFooter {
                file_type,
                version: FileVersion::decode_from(&mut reader)?,
            },
            MessageKind::Footer => FldtMessage::Footer {
                file_type,
                footer: FirmwareFooter::decode(reader.rest())?,
            },
            MessageKind::Error => FldtMessage::Error {
                file_type,
                request: MessageKind::from_u8(reader.u8()?)?,
                code: ErrorCode::from_u8(reader.u8()?)?,
            },
        };

        reader.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> FirmwareDescriptor {
        FirmwareDescriptor::new(
            FirmwareDescriptor::manufacturer_from_str("ACME0000"),
            [1, 0, 0, 0],
            FileVersion::new(1, 2, 0),
            2000,
        )
    }

    #[test]
    fn test_frame_starts_with_kind_and_file_type() -> Result<(), CodecError> {
        let frame = FldtMessage::GetHeader {
            file_type: FileTypeId::User(0x0102_0304),
        }
        .encode()?;
        assert_eq!(frame, vec![0x04, 0x02, 0x01, 0x02, 0x03, 0x04]);
        Ok(())
    }

    #[test]
    fn test_get_chunk_layout() -> Result<(), CodecError> {
        let message = FldtMessage::GetChunk {
            file_type: FileTypeId::Firmware,
            version: FileVersion::new(1, 2, 0),
            offset: 1536,
            max_len: 512,
        };
        let frame = message.encode()?;
        assert_eq!(frame.len(), FldtMessage::HEADER_LEN + 9 + 4 + 2);
        assert_eq!(frame.get(15..19), Some(&[0x00, 0x00, 0x06, 0x00][..]));
        assert_eq!(FldtMessage::decode(&frame)?, message);
        Ok(())
    }

    #[test]
    fn test_chunk_length_must_match() -> Result<(), CodecError> {
        let mut frame = FldtMessage::Chunk {
            file_type: FileTypeId::Firmware,
            version: FileVersion::new(1, 2, 0),
            offset: 0,
            data: vec![1, 2, 3, 4],
        }
        .encode()?;

        frame.push(5);
        assert_eq!(
            FldtMessage::decode(&frame),
            Err(CodecError::TrailingBytes { extra: 1 })
        );

        frame.truncate(frame.len() - 3);
        assert!(matches!(
            FldtMessage::decode(&frame),
            Err(CodecError::Truncated { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_oversized_chunk_is_not_encoded() -> Result<(), CodecError> {
        let largest = FldtMessage::Chunk {
            file_type: FileTypeId::Firmware,
            version: FileVersion::new(1, 2, 0),
            offset: 0,
            data: vec![0xaa; usize::from(u16::MAX)],
        };
        let frame = largest.encode()?;
        assert_eq!(FldtMessage::decode(&frame)?, largest);

        let oversized = FldtMessage::Chunk {
            file_type: FileTypeId::Firmware,
            version: FileVersion::new(1, 2, 0),
            offset: 0,
            data: vec![0xaa; usize::from(u16::MAX) + 1],
        };
        assert_eq!(
            oversized.encode(),
            Err(CodecError::InvalidField {
                field: "chunk.length",
                value: 65536
            })
        );
        Ok(())
    }

    #[test]
    fn test_header_and_error_decode() -> Result<(), CodecError> {
        let header = FldtMessage::Header {
            file_type: FileTypeId::Firmware,
            descriptor: descriptor(),
        };
        assert_eq!(FldtMessage::decode(&header.encode()?)?, header);

        let error = FldtMessage::Error {
            file_type: FileTypeId::User(9),
            request: MessageKind::GetInfo,
            code: ErrorCode::Unsupported,
        };
        assert_eq!(FldtMessage::decode(&error.encode()?)?, error);
        Ok(())
    }

    #[test]
    fn test_peek_survives_damaged_payload() -> Result<(), CodecError> {
        let mut frame = FldtMessage::Header {
            file_type: FileTypeId::TrustList,
            descriptor: descriptor(),
        }
        .encode()?;
        frame.truncate(12);

        assert!(FldtMessage::decode(&frame).is_err());
        assert_eq!(
            FldtMessage::peek(&frame)?,
            (MessageKind::Header, FileTypeId::TrustList)
        );
        Ok(())
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!(
            FldtMessage::decode(&[0x7e, 0, 0, 0, 0, 0]),
            Err(CodecError::InvalidField {
                field: "message.kind",
                value: 0x7e
            })
        );
    }

    #[test]
    fn test_request_kinds() {
        assert!(MessageKind::GetChunk.is_request());
        assert!(!MessageKind::Announce.is_request());
        assert!(!MessageKind::Error.is_request());
    }
}
