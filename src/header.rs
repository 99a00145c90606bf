/*
MIT License

Copyright (c) 2023 Philipp Schuster

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
//! TAR header definition taken from <https://www.gnu.org/software/tar/manual/html_node/Standard.html>.
//! A Tar-archive is a collection of 512-byte sized blocks. Unfortunately there are several
//! TAR-like archive specifications. An Overview can be found here:
//! <https://www.gnu.org/software/tar/manual/html_node/Formats.html#Formats>
//!
//! `.ova` files are written by various tools (VirtualBox, VMware `ovftool`, GNU tar), so the
//! parser accepts v7, ustar and GNU headers alike.

#![allow(non_upper_case_globals)]

use crate::{HeaderError, NumberFieldError, TarFormatOctal, TarFormatString, BLOCKSIZE};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};
use core::ops::Range;

/// Length of the `name` and `linkname` fields.
pub const NAME_LEN: usize = 100;
/// Length of the ustar `prefix` field.
pub const PREFIX_LEN: usize = 155;

/// Byte range of the checksum field inside a header block.
const CHECKSUM_RANGE: Range<usize> = 148..156;

/// Wrapper around the UNIX file permissions given in octal ASCII.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct Mode(TarFormatOctal<8>);

impl Mode {
    /// Parses the [`ModeFlags`] from the mode string. Old archives store
    /// file type bits next to the permissions; these are dropped.
    pub fn to_flags(self) -> Result<ModeFlags, NumberFieldError> {
        let bits = self.0.as_number::<u64>()?;
        Ok(ModeFlags::from_bits_truncate(bits))
    }
}

impl Debug for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&self.to_flags(), f)
    }
}

/// Header of the TAR format as specified by POSIX (POSIX 1003.1-1990.
/// "New" (version?) GNU Tar versions use this archive format by default.
/// (<https://www.gnu.org/software/tar/manual/html_node/Formats.html#Formats>).
///
/// Each file is started by such a header, that describes the size and
/// the file name. After that, the file content stands in chunks of 512 bytes.
/// The number of bytes can be derived from the file size.
///
/// This is also mostly compatible with the "Ustar"-header and the "GNU format".
/// GNU headers keep atime, ctime and sparse data where ustar has `prefix`.
/// These fields are not interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct PosixHeader {
    pub name: TarFormatString<NAME_LEN>,
    pub mode: Mode,
    pub uid: TarFormatOctal<8>,
    pub gid: TarFormatOctal<8>,
    // confusing; size is stored as ASCII string
    pub size: TarFormatOctal<12>,
    pub mtime: TarFormatOctal<12>,
    pub cksum: TarFormatOctal<8>,
    pub typeflag: TypeFlagRaw,
    pub linkname: TarFormatString<NAME_LEN>,
    pub magic: TarFormatString<6>,
    pub version: TarFormatString<2>,
    pub uname: TarFormatString<32>,
    pub gname: TarFormatString<32>,
    pub dev_major: TarFormatOctal<8>,
    pub dev_minor: TarFormatOctal<8>,
    pub prefix: TarFormatString<PREFIX_LEN>,
    // padding => to BLOCKSIZE bytes
    pub _pad: [u8; 12],
}

const _: () = assert!(core::mem::size_of::<PosixHeader>() == BLOCKSIZE);
const _: () = assert!(core::mem::align_of::<PosixHeader>() == 1);

impl PosixHeader {
    /// Interprets a block of the archive as header.
    #[must_use]
    pub const fn from_block(block: &[u8; BLOCKSIZE]) -> &Self {
        // SAFETY: `PosixHeader` consists of byte arrays only, has the size of
        // a block and an alignment of one. Every bit pattern is valid.
        unsafe { &*block.as_ptr().cast::<Self>() }
    }

    /// Whether the header is a POSIX ustar header (`"ustar\0"`, version
    /// `"00"`). Only then the `prefix` field holds a path prefix.
    #[must_use]
    pub fn is_ustar(&self) -> bool {
        self.magic.raw() == b"ustar\0" && self.version.raw() == b"00"
    }

    /// Whether the header uses the old GNU magic `"ustar "` with version
    /// `" \0"`.
    #[must_use]
    pub fn is_gnu(&self) -> bool {
        self.magic.raw() == b"ustar " && self.version.raw() == b" \0"
    }

    /// The declared payload size in bytes (excluding padding).
    pub fn payload_size(&self) -> Result<u64, NumberFieldError> {
        self.size.as_u64_or_base256()
    }
}

/// A Tar archive is terminated, if an end-of-archive entry, which consists
/// of two 512 blocks of zero bytes, is found.
#[must_use]
pub fn is_zero_block(block: &[u8; BLOCKSIZE]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Computes the unsigned and the historic signed checksum of a header block.
/// The checksum field itself counts as eight spaces.
fn block_checksums(block: &[u8; BLOCKSIZE]) -> (u64, i64) {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM_RANGE.contains(&i) { b' ' } else { b })
        .fold((0u64, 0i64), |(unsigned, signed), b| {
            (unsigned + u64::from(b), signed + i64::from(b as i8))
        })
}

#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct TypeFlagRaw(u8);

impl TypeFlagRaw {
    /// Maps the underlying byte to a [`TypeFlag`].
    #[must_use]
    pub const fn to_type_flag(self) -> TypeFlag {
        TypeFlag::from_byte(self.0)
    }
}

impl Debug for TypeFlagRaw {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(&self.to_type_flag(), f)
    }
}

/// Describes the kind of payload, that follows after a
/// [`PosixHeader`]. The properties of this payload are
/// described inside the header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum TypeFlag {
    /// Represents a regular file. In order to be compatible with older versions of tar, a typeflag
    /// value of AREGTYPE should be silently recognized as a regular file. New archives should be
    /// created using REGTYPE. Also, for backward compatibility, tar treats a regular file whose
    /// name ends with a slash as a directory.
    REGTYPE,
    /// Legacy regular file, see [`TypeFlag::REGTYPE`].
    AREGTYPE,
    /// This flag represents a file linked to another file, of any type, previously archived. Such
    /// files are identified in Unix by each file having the same device and inode number. The
    /// linked-to name is specified in the linkname field with a trailing null.
    LINK,
    /// This represents a symbolic link to another file. The linked-to name is specified in the
    /// linkname field with a trailing null.
    SYMTYPE,
    /// Character special file.
    CHRTYPE,
    /// Block special file.
    BLKTYPE,
    /// This flag specifies a directory or sub-directory. The directory name in the name field
    /// should end with a slash.
    DIRTYPE,
    /// This specifies a FIFO special file. Note that the archiving of a FIFO file archives the
    /// existence of this file and not its contents.
    FIFOTYPE,
    /// This specifies a contiguous file, which is the same as a normal file except that, in
    /// operating systems which support it, all its space is allocated contiguously on the disk.
    /// Operating systems which do not allow contiguous allocation should silently treat this type
    /// as a normal file.
    CONTTYPE,
    /// Extended header referring to the next file in the archive
    XHDTYPE,
    /// Global extended header
    XGLTYPE,
    /// GNU extension: the payload is the name of the next entry.
    GNUTYPE_LONGNAME,
    /// GNU extension: the payload is the link target of the next entry.
    GNUTYPE_LONGLINK,
    /// Any tag this crate doesn't know. The payload is skipped.
    Other(u8),
}

impl TypeFlag {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' => Self::REGTYPE,
            b'\0' => Self::AREGTYPE,
            b'1' => Self::LINK,
            b'2' => Self::SYMTYPE,
            b'3' => Self::CHRTYPE,
            b'4' => Self::BLKTYPE,
            b'5' => Self::DIRTYPE,
            b'6' => Self::FIFOTYPE,
            b'7' => Self::CONTTYPE,
            b'x' => Self::XHDTYPE,
            b'g' => Self::XGLTYPE,
            b'L' => Self::GNUTYPE_LONGNAME,
            b'K' => Self::GNUTYPE_LONGLINK,
            other => Self::Other(other),
        }
    }

    /// Whether the entry carries file content that is extracted.
    #[must_use]
    pub const fn is_regular_file(self) -> bool {
        matches!(self, Self::REGTYPE | Self::AREGTYPE | Self::CONTTYPE)
    }

    /// Whether the payload is the name of the next logical entry.
    #[must_use]
    pub const fn is_long_name_extension(self) -> bool {
        matches!(self, Self::GNUTYPE_LONGNAME | Self::XHDTYPE)
    }

    /// Whether the entry only describes other entries and never stands for a
    /// file of its own.
    #[must_use]
    pub const fn is_metadata(self) -> bool {
        matches!(
            self,
            Self::XHDTYPE | Self::XGLTYPE | Self::GNUTYPE_LONGNAME | Self::GNUTYPE_LONGLINK
        )
    }
}

bitflags::bitflags! {
    /// UNIX file permissions in octal format.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u64 {
        /// Set UID on execution.
        const SetUID = 0o4000;
        /// Set GID on execution.
        const SetGID = 0o2000;
        /// Reserved.
        const TSVTX = 0o1000;
        /// Owner read.
        const OwnerRead = 0o400;
        /// Owner write.
        const OwnerWrite = 0o200;
        /// Owner execute.
        const OwnerExec = 0o100;
        /// Group read.
        const GroupRead = 0o040;
        /// Group write.
        const GroupWrite = 0o020;
        /// Group execute.
        const GroupExec = 0o010;
        /// Others read.
        const OthersRead = 0o004;
        /// Others write.
        const OthersWrite = 0o002;
        /// Others execute.
        const OthersExec = 0o001;
    }
}

/// Outcome of the checksum verification of a header block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChecksumStatus {
    Valid,
    /// `expected` is the value stored in the header, `actual` the unsigned
    /// sum over the block.
    Mismatch { expected: u64, actual: u64 },
}

/// Decoded header of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Path of the entry inside the archive, including the ustar prefix.
    pub name: String,
    /// Exact payload length in bytes, padding excluded.
    pub size: u64,
    pub type_flag: TypeFlag,
    pub mode: ModeFlags,
    /// Modification time in seconds since the UNIX epoch.
    pub mtime: u64,
    pub checksum: ChecksumStatus,
}

/// Result of decoding one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderBlock {
    /// The block consists of zero bytes only.
    EndMarker,
    Header(Header),
}

/// Decodes one block into a [`HeaderBlock`].
///
/// A checksum mismatch is not an error at this level. It is reported through
/// [`Header::checksum`] and the caller decides what to make of it.
///
/// # Errors
/// Returns a [`HeaderError`] if the block is neither all-zero nor a header
/// with a parseable size and checksum field and a valid name.
pub fn parse_header_block(block: &[u8; BLOCKSIZE]) -> Result<HeaderBlock, HeaderError> {
    decode_header_block(block, NameCheck::Validate)
}

/// Whether the name fields of a header are checked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum NameCheck {
    Validate,
    /// A GNU long name or PAX path replaces the name. GNU tar stores the
    /// first 100 bytes of the long name in the header, possibly cutting a
    /// multibyte character, so the bytes are taken as they are.
    Replaced,
}

pub(crate) fn decode_header_block(
    block: &[u8; BLOCKSIZE],
    name_check: NameCheck,
) -> Result<HeaderBlock, HeaderError> {
    if is_zero_block(block) {
        return Ok(HeaderBlock::EndMarker);
    }

    let hdr = PosixHeader::from_block(block);

    let expected = hdr
        .cksum
        .as_number::<u64>()
        .map_err(HeaderError::InvalidChecksumField)?;
    let (unsigned, signed) = block_checksums(block);
    let checksum = if expected == unsigned || i64::try_from(expected) == Ok(signed) {
        ChecksumStatus::Valid
    } else {
        ChecksumStatus::Mismatch {
            expected,
            actual: unsigned,
        }
    };

    let size = hdr.payload_size().map_err(HeaderError::InvalidSize)?;
    let name = full_name(hdr);
    let name = match name_check {
        NameCheck::Validate => validate_name(&name)?,
        NameCheck::Replaced => String::from_utf8_lossy(&name).into_owned(),
    };

    let mut type_flag = hdr.typeflag.to_type_flag();
    if type_flag == TypeFlag::AREGTYPE && name.ends_with('/') {
        type_flag = TypeFlag::DIRTYPE;
    }

    let mode = hdr.mode.to_flags().unwrap_or_else(|e| {
        log::warn!("Ignoring unparseable mode of entry '{name}': {e}");
        ModeFlags::empty()
    });
    let mtime = hdr.mtime.as_u64_or_base256().unwrap_or_else(|e| {
        log::warn!("Ignoring unparseable mtime of entry '{name}': {e}");
        0
    });

    Ok(HeaderBlock::Header(Header {
        name,
        size,
        type_flag,
        mode,
        mtime,
        checksum,
    }))
}

/// Joins the ustar prefix and the name field.
fn full_name(hdr: &PosixHeader) -> Vec<u8> {
    let name = hdr.name.as_bytes();
    let prefix = if hdr.is_ustar() {
        hdr.prefix.as_bytes()
    } else {
        &[]
    };

    let mut joined = Vec::with_capacity(prefix.len() + 1 + name.len());
    if !prefix.is_empty() {
        joined.extend_from_slice(prefix);
        joined.push(b'/');
    }
    joined.extend_from_slice(name);
    joined
}

/// Checks that `bytes` form a usable entry name and copies them into a
/// [`String`].
pub(crate) fn validate_name(bytes: &[u8]) -> Result<String, HeaderError> {
    if bytes.is_empty() {
        return Err(HeaderError::EmptyName);
    }
    let name = core::str::from_utf8(bytes).map_err(HeaderError::NonUtf8Name)?;
    if let Some(c) = bytes.iter().find(|b| b.is_ascii_control()) {
        return Err(HeaderError::ControlCharacterInName(*c));
    }
    Ok(String::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fix_checksum, header_block, HeaderSpec};

    #[test]
    fn test_size() {
        assert_eq!(BLOCKSIZE, core::mem::size_of::<PosixHeader>());
    }

    #[test]
    fn test_parse_regular_file() {
        let block = header_block(&HeaderSpec::file("hello.txt", 5));
        let hdr = PosixHeader::from_block(&block);
        assert_eq!(hdr.name.as_str(), Ok("hello.txt"));
        assert!(hdr.is_ustar());

        let HeaderBlock::Header(header) = parse_header_block(&block).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(header.name, "hello.txt");
        assert_eq!(header.size, 5);
        assert_eq!(header.type_flag, TypeFlag::REGTYPE);
        assert_eq!(header.checksum, ChecksumStatus::Valid);
        assert_eq!(
            header.mode,
            ModeFlags::OwnerRead | ModeFlags::OwnerWrite | ModeFlags::GroupRead | ModeFlags::OthersRead
        );
        assert_eq!(header.mtime, 0o14_000_000_000);
    }

    #[test]
    fn test_zero_block_is_end_marker() {
        assert_eq!(
            parse_header_block(&[0; BLOCKSIZE]),
            Ok(HeaderBlock::EndMarker)
        );
    }

    #[test]
    fn test_ustar_prefix_is_joined() {
        let mut spec = HeaderSpec::file("disk.vmdk", 0);
        spec.prefix = "appliance/images";
        let block = header_block(&spec);
        let HeaderBlock::Header(header) = parse_header_block(&block).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(header.name, "appliance/images/disk.vmdk");
    }

    #[test]
    fn test_prefix_ignored_without_ustar_magic() {
        let mut spec = HeaderSpec::file("disk.vmdk", 0);
        spec.prefix = "appliance";
        spec.magic = *b"\0\0\0\0\0\0";
        let block = header_block(&spec);
        let HeaderBlock::Header(header) = parse_header_block(&block).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(header.name, "disk.vmdk");
    }

    #[test]
    fn test_gnu_header_has_no_prefix() {
        let mut block = header_block(&HeaderSpec::file("disk.vmdk", 0));
        block[257..263].copy_from_slice(b"ustar ");
        block[263..265].copy_from_slice(b" \0");
        // GNU atime lives where ustar keeps the prefix
        block[345..357].copy_from_slice(b"14712345670\0");
        fix_checksum(&mut block);

        let hdr = PosixHeader::from_block(&block);
        assert!(hdr.is_gnu());
        assert!(!hdr.is_ustar());
        let HeaderBlock::Header(header) = parse_header_block(&block).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(header.name, "disk.vmdk");
    }

    #[test]
    fn test_replaced_name_is_not_validated() {
        // first 100 bytes of "a"*99 + "é.vmdk" end inside the 'é'
        let long = "a".repeat(99) + "\u{e9}.vmdk";
        let mut block = header_block(&HeaderSpec::file("", 3));
        block[..100].copy_from_slice(&long.as_bytes()[..100]);
        fix_checksum(&mut block);

        assert!(matches!(
            parse_header_block(&block),
            Err(HeaderError::NonUtf8Name(_))
        ));
        let HeaderBlock::Header(header) =
            decode_header_block(&block, NameCheck::Replaced).unwrap()
        else {
            panic!("expected a header");
        };
        assert_eq!(header.size, 3);
        assert!(header.name.starts_with(&"a".repeat(99)));
    }

    #[test]
    fn test_old_regular_file_with_slash_is_directory() {
        let mut spec = HeaderSpec::file("dir/", 0);
        spec.typeflag = b'\0';
        let HeaderBlock::Header(header) = parse_header_block(&header_block(&spec)).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(header.type_flag, TypeFlag::DIRTYPE);
    }

    #[test]
    fn test_unknown_type_flag() {
        let mut spec = HeaderSpec::file("vendor", 3);
        spec.typeflag = b'V';
        let HeaderBlock::Header(header) = parse_header_block(&header_block(&spec)).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(header.type_flag, TypeFlag::Other(b'V'));
        assert!(!header.type_flag.is_regular_file());
        assert_eq!(header.size, 3);
    }

    #[test]
    fn test_invalid_size_is_malformed() {
        let mut block = header_block(&HeaderSpec::file("hello.txt", 5));
        block[124..136].copy_from_slice(b"0000000000z\0");
        assert!(matches!(
            parse_header_block(&block),
            Err(HeaderError::InvalidSize(NumberFieldError::InvalidDigit { byte: b'z', .. }))
        ));
    }

    #[test]
    fn test_checksum_mismatch_is_reported() {
        let mut block = header_block(&HeaderSpec::file("hello.txt", 5));
        // alter the mtime without updating the checksum
        block[136] = b'2';
        let HeaderBlock::Header(header) = parse_header_block(&block).unwrap() else {
            panic!("expected a header");
        };
        assert!(matches!(header.checksum, ChecksumStatus::Mismatch { .. }));
    }

    #[test]
    fn test_signed_checksum_accepted() {
        let mut spec = HeaderSpec::file("hello.txt", 5);
        spec.uname = "\u{e9}";
        let mut block = header_block(&spec);
        let (_, signed) = block_checksums(&block);
        let field = std::format!("{signed:06o}\0 ");
        block[CHECKSUM_RANGE].copy_from_slice(field.as_bytes());
        let HeaderBlock::Header(header) = parse_header_block(&block).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(header.checksum, ChecksumStatus::Valid);
    }

    #[test]
    fn test_invalid_checksum_field() {
        let mut block = header_block(&HeaderSpec::file("hello.txt", 5));
        block[CHECKSUM_RANGE].copy_from_slice(b"xxxxxx\0 ");
        assert!(matches!(
            parse_header_block(&block),
            Err(HeaderError::InvalidChecksumField(_))
        ));
    }

    #[test]
    fn test_names_are_validated() {
        let spec = HeaderSpec::file("", 0);
        assert_eq!(
            parse_header_block(&header_block(&spec)),
            Err(HeaderError::EmptyName)
        );

        let spec = HeaderSpec::file("bad\u{7}name", 0);
        assert_eq!(
            parse_header_block(&header_block(&spec)),
            Err(HeaderError::ControlCharacterInName(7))
        );

        let mut block = header_block(&HeaderSpec::file("xx", 0));
        block[0] = 0xff;
        fix_checksum(&mut block);
        assert!(matches!(
            parse_header_block(&block),
            Err(HeaderError::NonUtf8Name(_))
        ));
    }

    #[test]
    fn test_type_flag_classification() {
        assert!(TypeFlag::from_byte(b'7').is_regular_file());
        assert!(TypeFlag::from_byte(b'L').is_long_name_extension());
        assert!(TypeFlag::from_byte(b'x').is_long_name_extension());
        assert!(!TypeFlag::from_byte(b'g').is_long_name_extension());
        assert!(TypeFlag::from_byte(b'K').is_metadata());
        assert!(!TypeFlag::from_byte(b'5').is_metadata());
    }
}
