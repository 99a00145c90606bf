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
//! Library to extract the member files of `.ova` virtual appliances in `no_std` + `alloc`
//! contexts. An `.ova` file is an uncompressed Tar archive that usually holds an OVF
//! descriptor, a manifest and one or more disk images.
//!
//! The whole archive must be in memory. [`extract`] walks it block by block and copies each
//! regular file into an owned [`Member`]; [`TarArchive::entries`] does the same lazily.
//! Decompression and writing files to disk are left to the caller.
//!
//! Supported are v7, ustar and GNU headers, GNU long names (`././@LongLink`) and the `path`
//! record of PAX extended headers. Directories, links and other entries are skipped, only
//! regular files are yielded.
//!
//! ```
//! let archive: &[u8] = &[0; 1024];
//! let extraction = ova_extract::extract(archive);
//! assert!(extraction.is_clean());
//! assert!(extraction.members.is_empty());
//! ```
//!
//! [This link](https://www.gnu.org/software/tar/manual/html_section/Formats.html) gives a good
//! overview over possible archive formats and their limitations.

#![no_std]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_doc_code_examples)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations)]

extern crate alloc;

#[cfg_attr(test, macro_use)]
#[cfg(test)]
extern crate std;

/// Each Archive Entry (either Header or Data Block) is a block of 512 bytes.
pub const BLOCKSIZE: usize = 512;

mod archive;
mod error;
mod header;
mod pax;
mod tar_format_types;
#[cfg(test)]
mod test_utils;

pub use archive::*;
pub use error::*;
pub use header::*;
pub use pax::*;
pub use tar_format_types::*;
