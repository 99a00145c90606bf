/*
MIT License

Copyright (c) 2021 Philipp Schuster

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/
//! Error types of the header parser and the extractor.

use core::str::Utf8Error;
use thiserror::Error;

/// Errors of the numeric text fields of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NumberFieldError {
    /// A byte that is neither a digit of the field's radix nor padding.
    #[error("byte {byte:#04x} at position {position} is not a valid digit")]
    InvalidDigit { byte: u8, position: usize },
    /// The value does not fit into the requested integer type.
    #[error("value does not fit the target integer type")]
    Overflow,
    /// GNU base-256 encoded negative value.
    #[error("negative base-256 value")]
    Negative,
}

/// Reasons why a block is neither a valid header nor an end marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("invalid size field: {0}")]
    InvalidSize(#[source] NumberFieldError),
    #[error("invalid checksum field: {0}")]
    InvalidChecksumField(#[source] NumberFieldError),
    #[error("entry name is empty")]
    EmptyName,
    #[error("entry name is not valid UTF-8: {0}")]
    NonUtf8Name(#[source] Utf8Error),
    #[error("entry name contains control byte {0:#04x}")]
    ControlCharacterInName(u8),
    /// A PAX extended header record could not be decoded. `position` is
    /// relative to the start of the PAX payload.
    #[error("malformed PAX record at payload byte {position}")]
    MalformedPax { position: usize },
}

/// Coarse classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fewer bytes remain than a header or payload requires.
    TruncatedArchive,
    /// A header block is invalid or fails checksum validation.
    MalformedHeader,
    /// The caller requested an early stop.
    Cancelled,
}

/// Errors that are reported while walking an archive. Every variant knows
/// the byte offset of the header block it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("truncated archive at offset {offset}: {needed} bytes required, {available} available")]
    TruncatedArchive {
        offset: usize,
        needed: u64,
        available: usize,
    },
    #[error("malformed header at offset {offset}: {source}")]
    MalformedHeader { offset: usize, source: HeaderError },
    #[error("checksum mismatch at offset {offset}: header stores {expected}, block sums to {actual}")]
    ChecksumMismatch {
        offset: usize,
        expected: u64,
        actual: u64,
    },
    #[error("extraction cancelled at offset {offset}")]
    Cancelled { offset: usize },
}

impl ExtractError {
    /// Returns the [`ErrorKind`]. A checksum mismatch is a kind of malformed
    /// header.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TruncatedArchive { .. } => ErrorKind::TruncatedArchive,
            Self::MalformedHeader { .. } | Self::ChecksumMismatch { .. } => {
                ErrorKind::MalformedHeader
            }
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Byte offset of the affected header block.
    #[must_use]
    pub const fn offset(&self) -> usize {
        match self {
            Self::TruncatedArchive { offset, .. }
            | Self::MalformedHeader { offset, .. }
            | Self::ChecksumMismatch { offset, .. }
            | Self::Cancelled { offset } => *offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_kind_and_offset() {
        let err = ExtractError::ChecksumMismatch {
            offset: 1024,
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
        assert_eq!(err.offset(), 1024);

        let err = ExtractError::Cancelled { offset: 512 };
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.offset(), 512);
    }

    #[test]
    fn test_display_contains_cause() {
        let err = ExtractError::MalformedHeader {
            offset: 0,
            source: HeaderError::InvalidSize(NumberFieldError::InvalidDigit {
                byte: b'9',
                position: 3,
            }),
        };
        assert_eq!(
            err.to_string(),
            "malformed header at offset 0: invalid size field: byte 0x39 at position 3 is not a valid digit"
        );
    }
}
