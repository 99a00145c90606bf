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
//! Module for [`TarArchive`] and the extraction drivers [`extract`] and
//! [`extract_with`].

use crate::header::{decode_header_block, is_zero_block, NameCheck, PosixHeader};
use crate::pax::{gnu_long_name, pax_path};
use crate::{
    ChecksumStatus, ExtractError, Header, HeaderBlock, HeaderError, ModeFlags, NumberFieldError,
    TypeFlag, BLOCKSIZE,
};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};
use core::iter::FusedIterator;
use core::str::Utf8Error;

/// A regular file extracted from an archive. Owns a copy of its content.
#[derive(Clone, PartialEq, Eq)]
pub struct Member {
    name: String,
    content: Vec<u8>,
    mode: ModeFlags,
    mtime: u64,
}

impl Member {
    #[must_use]
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
            mode: ModeFlags::empty(),
            mtime: 0,
        }
    }

    /// Path of the member inside the archive.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data of the file. The length always equals the size declared in the
    /// header.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Filesize in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// UNIX permissions stored in the header.
    #[must_use]
    pub const fn mode(&self) -> ModeFlags {
        self.mode
    }

    /// Modification time in seconds since the UNIX epoch.
    #[must_use]
    pub const fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Returns the content as UTF-8 string.
    pub fn content_as_str(&self) -> Result<&str, Utf8Error> {
        core::str::from_utf8(&self.content)
    }

    /// Hands out name and content, e.g. to write them somewhere.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.name, self.content)
    }
}

impl Debug for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("size", &self.size())
            .field("mode", &self.mode)
            .field("mtime", &self.mtime)
            .field("content", &"<bytes>")
            .finish()
    }
}

/// What happens after a malformed or truncated entry.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first error.
    #[default]
    Strict,
    /// Record the error, skip the entry and go on.
    Lenient,
}

/// Which zero blocks end the archive.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum EndMarkerPolicy {
    /// The first zero block ends the archive.
    #[default]
    SingleZeroBlock,
    /// Only two consecutive zero blocks end the archive. A single zero block
    /// in the middle of the archive is skipped.
    TwoZeroBlocks,
}

/// How checksum mismatches are treated.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ChecksumPolicy {
    Ignore,
    /// Report an [`ExtractError::ChecksumMismatch`], but extract the entry.
    #[default]
    Warn,
    /// Treat a mismatch like any other malformed header.
    Enforce,
}

/// Configuration of an extraction run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    failure_policy: FailurePolicy,
    end_marker: EndMarkerPolicy,
    checksum: ChecksumPolicy,
}

impl ExtractOptions {
    /// Strict, ends at the first zero block and warns about checksum
    /// mismatches.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            failure_policy: FailurePolicy::Strict,
            end_marker: EndMarkerPolicy::SingleZeroBlock,
            checksum: ChecksumPolicy::Warn,
        }
    }

    #[must_use]
    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    #[must_use]
    pub const fn with_end_marker(mut self, end_marker: EndMarkerPolicy) -> Self {
        self.end_marker = end_marker;
        self
    }

    #[must_use]
    pub const fn with_checksum(mut self, checksum: ChecksumPolicy) -> Self {
        self.checksum = checksum;
        self
    }

    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    #[must_use]
    pub const fn end_marker(&self) -> EndMarkerPolicy {
        self.end_marker
    }

    #[must_use]
    pub const fn checksum(&self) -> ChecksumPolicy {
        self.checksum
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Hooks into an extraction run, e.g. to show progress or to cancel it.
/// Observers only watch; they can't change what is extracted.
pub trait ExtractObserver {
    /// Called for every decoded header, including metadata entries.
    fn on_header(&mut self, _offset: usize, _header: &Header) {}

    /// Called once per emitted [`Member`].
    fn on_member(&mut self, _member: &Member) {}

    /// Polled once per archive entry. Returning `true` stops the extraction
    /// before the next entry.
    fn should_cancel(&mut self) -> bool {
        false
    }
}

impl ExtractObserver for () {}

/// How an extraction run ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The end of the archive was reached. Lenient runs may still have
    /// recorded errors.
    Completed,
    /// An error stopped the run. It is the last entry of
    /// [`Extraction::errors`].
    Aborted,
    /// The observer cancelled the run.
    Cancelled,
}

/// Result of [`extract`] and [`extract_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Extracted files in archive order.
    pub members: Vec<Member>,
    /// Errors and warnings in the order they were found.
    pub errors: Vec<ExtractError>,
    pub outcome: Outcome,
}

impl Extraction {
    /// True if the archive was read to its end without any error or warning.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcome == Outcome::Completed && self.errors.is_empty()
    }

    /// The error that stopped the run, if any.
    #[must_use]
    pub fn fatal_error(&self) -> Option<&ExtractError> {
        match self.outcome {
            Outcome::Completed => None,
            Outcome::Aborted | Outcome::Cancelled => self.errors.last(),
        }
    }
}

/// Extracts all regular files of `data` with the default [`ExtractOptions`].
#[must_use]
pub fn extract(data: &[u8]) -> Extraction {
    extract_with(data, &ExtractOptions::default(), &mut ())
}

/// Extracts all regular files of `data`. The `observer` is informed about
/// every header and member and may cancel the run.
pub fn extract_with<O>(data: &[u8], options: &ExtractOptions, observer: &mut O) -> Extraction
where
    O: ExtractObserver + ?Sized,
{
    let mut entries = ArchiveIterator::new(data, *options);
    let mut members = Vec::new();
    let mut errors = Vec::new();
    while let Some(entry) = entries.step(observer) {
        match entry {
            Ok(member) => members.push(member),
            Err(e) => errors.push(e),
        }
    }
    let outcome = match entries.state {
        State::Cancelled => Outcome::Cancelled,
        State::Aborted => Outcome::Aborted,
        State::Running | State::Finished => Outcome::Completed,
    };
    Extraction {
        members,
        errors,
        outcome,
    }
}

/// Wrapper type around the bytes, which represents an archive.
#[derive(Debug, Copy, Clone)]
pub struct TarArchive<'a> {
    data: &'a [u8],
}

impl<'a> TarArchive<'a> {
    /// Interprets the provided byte array as Tar archive. The length doesn't
    /// need to be a multiple of the block size; a cut-off archive shows up
    /// as [`ExtractError::TruncatedArchive`] while iterating.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Iterates over all regular files with the default [`ExtractOptions`].
    #[must_use]
    pub fn entries(&self) -> ArchiveIterator<'a> {
        self.entries_with(ExtractOptions::default())
    }

    /// Iterates over all regular files. Each call starts from the beginning.
    #[must_use]
    pub const fn entries_with(&self, options: ExtractOptions) -> ArchiveIterator<'a> {
        ArchiveIterator::new(self.data, options)
    }

    /// See [`extract_with`].
    pub fn extract_with<O>(&self, options: &ExtractOptions, observer: &mut O) -> Extraction
    where
        O: ExtractObserver + ?Sized,
    {
        extract_with(self.data, options, observer)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Running,
    Finished,
    Aborted,
    Cancelled,
}

/// Iterator over the regular files. Each iteration step starts at the next
/// Tar header entry and yields either a [`Member`] or an error.
///
/// Metadata entries (GNU long names, PAX headers) are consumed silently and
/// applied to the next entry. Directories, links and other entries without
/// extractable content are skipped. In strict mode, the iterator ends after
/// the first error. A checksum warning is yielded before the member it
/// belongs to.
#[derive(Debug)]
pub struct ArchiveIterator<'a> {
    data: &'a [u8],
    options: ExtractOptions,
    /// Start of the next header block. Always a multiple of [`BLOCKSIZE`].
    offset: usize,
    long_name: Option<String>,
    pax_path: Option<String>,
    /// Member held back behind a checksum warning.
    pending: Option<Member>,
    state: State,
}

impl<'a> ArchiveIterator<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8], options: ExtractOptions) -> Self {
        Self {
            data,
            options,
            offset: 0,
            long_name: None,
            pax_path: None,
            pending: None,
            state: State::Running,
        }
    }

    /// Byte offset of the next header block.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Records an error that ends the run regardless of the policy.
    fn abort(&mut self, err: ExtractError) -> Result<Member, ExtractError> {
        log::warn!("Stopping extraction: {err}");
        self.state = State::Aborted;
        Err(err)
    }

    /// Applies the failure policy. In lenient mode, the next header is
    /// searched at `resume_at` and pending name overrides are dropped.
    fn fail(&mut self, err: ExtractError, resume_at: usize) -> Result<Member, ExtractError> {
        match self.options.failure_policy {
            FailurePolicy::Strict => self.abort(err),
            FailurePolicy::Lenient => {
                log::warn!("Skipping entry: {err}");
                debug_assert!(resume_at > err.offset());
                self.offset = resume_at.min(self.data.len());
                self.long_name = None;
                self.pax_path = None;
                Err(err)
            }
        }
    }

    /// Where to continue after a malformed header at `offset`: behind its
    /// payload if the size is known, else directly behind the header.
    fn resume_after_malformed(&self, block: &[u8; BLOCKSIZE], offset: usize) -> usize {
        let payload_start = offset + BLOCKSIZE;
        PosixHeader::from_block(block)
            .payload_size()
            .ok()
            .and_then(padded_size)
            .and_then(|padded| usize::try_from(padded).ok())
            .and_then(|padded| payload_start.checked_add(padded))
            .unwrap_or(payload_start)
    }

    /// Handles a zero block at `offset`. Returns `true` if the archive ends.
    fn on_zero_block(&mut self, offset: usize) -> bool {
        match self.options.end_marker {
            EndMarkerPolicy::SingleZeroBlock => {
                log::debug!("End of Tar archive at offset {offset}");
                true
            }
            EndMarkerPolicy::TwoZeroBlocks => {
                let next = self.data[offset + BLOCKSIZE..].first_chunk::<BLOCKSIZE>();
                match next {
                    Some(next) if is_zero_block(next) => {
                        // gracefully terminated Archive
                        log::debug!("End of Tar archive with two zero blocks at offset {offset}");
                        true
                    }
                    Some(_) => {
                        log::warn!("Skipping single zero block at offset {offset}");
                        self.offset = offset + BLOCKSIZE;
                        false
                    }
                    None => {
                        log::warn!(
                            "Zero block found at end of Tar archive, but only one instead of two!"
                        );
                        true
                    }
                }
            }
        }
    }

    /// Runs the extraction loop until the next member or error. The
    /// `observer` is polled for cancellation before every entry.
    pub fn step<O>(&mut self, observer: &mut O) -> Option<Result<Member, ExtractError>>
    where
        O: ExtractObserver + ?Sized,
    {
        if let Some(member) = self.pending.take() {
            observer.on_member(&member);
            return Some(Ok(member));
        }

        loop {
            if self.state != State::Running {
                return None;
            }
            let data = self.data;
            let offset = self.offset;

            if observer.should_cancel() {
                log::debug!("Extraction cancelled at offset {offset}");
                self.state = State::Cancelled;
                return Some(Err(ExtractError::Cancelled { offset }));
            }

            let Some(block) = data[offset..].first_chunk::<BLOCKSIZE>() else {
                return Some(self.abort(ExtractError::TruncatedArchive {
                    offset,
                    needed: BLOCKSIZE as u64,
                    available: data.len() - offset,
                }));
            };

            let name_check = if self.long_name.is_some() || self.pax_path.is_some() {
                NameCheck::Replaced
            } else {
                NameCheck::Validate
            };
            let header = match decode_header_block(block, name_check) {
                Ok(HeaderBlock::Header(header)) => header,
                Ok(HeaderBlock::EndMarker) => {
                    if self.on_zero_block(offset) {
                        self.state = State::Finished;
                    }
                    continue;
                }
                Err(source) => {
                    let resume_at = self.resume_after_malformed(block, offset);
                    let err = ExtractError::MalformedHeader { offset, source };
                    return Some(self.fail(err, resume_at));
                }
            };
            observer.on_header(offset, &header);

            let payload_start = offset + BLOCKSIZE;
            let available = data.len() - payload_start;
            let Some(padded) = padded_size(header.size) else {
                let source = HeaderError::InvalidSize(NumberFieldError::Overflow);
                let err = ExtractError::MalformedHeader { offset, source };
                return Some(self.fail(err, payload_start));
            };
            let (size, padded) = match (usize::try_from(header.size), usize::try_from(padded)) {
                (Ok(size), Ok(padded)) if padded <= available => (size, padded),
                _ => {
                    return Some(self.abort(ExtractError::TruncatedArchive {
                        offset,
                        needed: padded,
                        available,
                    }))
                }
            };

            let warning = match (header.checksum, self.options.checksum) {
                (ChecksumStatus::Valid, _) | (_, ChecksumPolicy::Ignore) => None,
                (ChecksumStatus::Mismatch { expected, actual }, policy) => {
                    let err = ExtractError::ChecksumMismatch {
                        offset,
                        expected,
                        actual,
                    };
                    if policy == ChecksumPolicy::Enforce {
                        return Some(self.fail(err, payload_start + padded));
                    }
                    log::warn!("{err}");
                    Some(err)
                }
            };

            // because each block is 512 bytes long, the file is not necessarily a multiple of 512 bytes
            let payload = &data[payload_start..payload_start + size];
            self.offset = payload_start + padded;
            log::trace!(
                "Entry '{}' ({:?}) at offset {offset}, next header at {}",
                header.name,
                header.type_flag,
                self.offset
            );

            if header.type_flag.is_metadata() {
                let decoded = match header.type_flag {
                    TypeFlag::GNUTYPE_LONGNAME => gnu_long_name(payload).map(|name| {
                        self.long_name = Some(name);
                    }),
                    TypeFlag::XHDTYPE => pax_path(payload).map(|path| {
                        if path.is_some() {
                            self.pax_path = path;
                        }
                    }),
                    // global headers are validated, but their path is not
                    // meant for a single entry
                    TypeFlag::XGLTYPE => pax_path(payload).map(|_| ()),
                    _ => Ok(()),
                };
                if let Err(source) = decoded {
                    let resume_at = self.offset;
                    let err = ExtractError::MalformedHeader { offset, source };
                    return Some(self.fail(err, resume_at));
                }
                if let Some(warning) = warning {
                    return Some(Err(warning));
                }
                continue;
            }

            // overrides apply to exactly one real entry; PAX wins over GNU
            let long_name = self.long_name.take();
            let name = self.pax_path.take().or(long_name).unwrap_or(header.name);

            if !header.type_flag.is_regular_file() {
                log::debug!(
                    "Skipping entry '{name}' of type={:?}, only files are extracted",
                    header.type_flag
                );
                if let Some(warning) = warning {
                    return Some(Err(warning));
                }
                continue;
            }

            let member = Member {
                name,
                content: payload.to_vec(),
                mode: header.mode,
                mtime: header.mtime,
            };
            log::debug!("Extracted '{}' ({} bytes)", member.name, member.size());
            if let Some(warning) = warning {
                self.pending = Some(member);
                return Some(Err(warning));
            }
            observer.on_member(&member);
            return Some(Ok(member));
        }
    }
}

impl Iterator for ArchiveIterator<'_> {
    type Item = Result<Member, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step(&mut ())
    }
}

impl FusedIterator for ArchiveIterator<'_> {}

/// Rounds `size` up to the next multiple of [`BLOCKSIZE`]. [`None`] on
/// overflow.
#[must_use]
pub const fn padded_size(size: u64) -> Option<u64> {
    size.checked_next_multiple_of(BLOCKSIZE as u64)
}
