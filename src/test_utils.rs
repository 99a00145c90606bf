//! Helpers to assemble archives in memory for unit tests.

use crate::BLOCKSIZE;
use std::format;
use std::string::String;
use std::vec::Vec;

/// The header fields tests care about. Everything else gets fixed values.
#[derive(Debug, Clone)]
pub struct HeaderSpec<'a> {
    pub name: &'a str,
    pub prefix: &'a str,
    pub size: u64,
    pub typeflag: u8,
    pub magic: [u8; 6],
    pub uname: &'a str,
}

impl<'a> HeaderSpec<'a> {
    pub const fn file(name: &'a str, size: u64) -> Self {
        Self {
            name,
            prefix: "",
            size,
            typeflag: b'0',
            magic: *b"ustar\0",
            uname: "user",
        }
    }

    pub const fn with_type(mut self, typeflag: u8) -> Self {
        self.typeflag = typeflag;
        self
    }
}

fn put(block: &mut [u8; BLOCKSIZE], at: usize, len: usize, value: &[u8]) {
    let n = value.len().min(len);
    block[at..at + n].copy_from_slice(&value[..n]);
}

/// Recomputes the checksum field after a test modified the block.
pub fn fix_checksum(block: &mut [u8; BLOCKSIZE]) {
    block[148..156].fill(b' ');
    let sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
    put(block, 148, 8, format!("{sum:06o}\0 ").as_bytes());
}

pub fn header_block(spec: &HeaderSpec) -> [u8; BLOCKSIZE] {
    let mut block = [0; BLOCKSIZE];
    put(&mut block, 0, 100, spec.name.as_bytes());
    put(&mut block, 100, 8, b"0000644\0");
    put(&mut block, 108, 8, b"0001750\0");
    put(&mut block, 116, 8, b"0001750\0");
    put(&mut block, 124, 12, format!("{:011o}\0", spec.size).as_bytes());
    put(&mut block, 136, 12, b"14000000000\0");
    block[156] = spec.typeflag;
    put(&mut block, 257, 6, &spec.magic);
    put(&mut block, 263, 2, b"00");
    put(&mut block, 265, 32, spec.uname.as_bytes());
    put(&mut block, 297, 32, b"user");
    put(&mut block, 345, 155, spec.prefix.as_bytes());
    fix_checksum(&mut block);
    block
}

/// Encodes PAX records, each as `"<len> <key>=<value>\n"`.
pub fn pax_payload(records: &[(&str, &str)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (key, value) in records {
        let body = format!(" {key}={value}\n");
        // the length field counts its own digits
        let mut len = body.len() + 1;
        while format!("{len}").len() + body.len() != len {
            len += 1;
        }
        payload.extend_from_slice(format!("{len}{body}").as_bytes());
    }
    payload
}

#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    data: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header and the padded payload.
    pub fn entry(mut self, spec: &HeaderSpec, payload: &[u8]) -> Self {
        self.data.extend_from_slice(&header_block(spec));
        self.data.extend_from_slice(payload);
        let padding = payload.len().next_multiple_of(BLOCKSIZE) - payload.len();
        self.data.resize(self.data.len() + padding, 0);
        self
    }

    pub fn file(self, name: &str, content: &[u8]) -> Self {
        self.entry(&HeaderSpec::file(name, content.len() as u64), content)
    }

    pub fn dir(self, name: &str) -> Self {
        self.entry(&HeaderSpec::file(name, 0).with_type(b'5'), &[])
    }

    pub fn gnu_long_name(self, name: &str) -> Self {
        let mut payload = String::from(name).into_bytes();
        payload.push(0);
        self.entry(
            &HeaderSpec::file("././@LongLink", payload.len() as u64).with_type(b'L'),
            &payload,
        )
    }

    pub fn pax(self, typeflag: u8, records: &[(&str, &str)]) -> Self {
        let payload = pax_payload(records);
        self.entry(
            &HeaderSpec::file("PaxHeaders/entry", payload.len() as u64).with_type(typeflag),
            &payload,
        )
    }

    /// Appends raw bytes, e.g. a hand-crafted block.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn zero_block(self) -> Self {
        self.raw(&[0; BLOCKSIZE])
    }

    /// Terminates the archive the way GNU tar does, with two zero blocks.
    pub fn end(self) -> Self {
        self.zero_block().zero_block()
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}
