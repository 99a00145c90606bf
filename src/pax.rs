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
//! Long name extensions: PAX extended header records
//! (<https://pubs.opengroup.org/onlinepubs/9699919799/utilities/pax.html#tag_20_92_13_03>)
//! and the GNU `././@LongLink` payload.

use crate::header::validate_name;
use crate::HeaderError;
use alloc::string::String;
use core::str::from_utf8;

/// One `key=value` record of a PAX extended header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PaxRecord<'a> {
    pub key: &'a str,
    pub value: &'a [u8],
}

/// Iterator over the records of a PAX extended header payload. Each record
/// has the form `"<len> <key>=<value>\n"`, where `<len>` is the decimal length
/// of the whole record including itself and the newline.
///
/// After the first error, the iterator returns [`None`].
#[derive(Debug, Clone)]
pub struct PaxRecords<'a> {
    payload: &'a [u8],
    position: usize,
}

impl<'a> PaxRecords<'a> {
    #[must_use]
    pub const fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            position: 0,
        }
    }

    fn malformed(&mut self) -> HeaderError {
        let position = self.position;
        self.position = self.payload.len();
        HeaderError::MalformedPax { position }
    }

    fn parse_next(&mut self, rest: &'a [u8]) -> Result<PaxRecord<'a>, HeaderError> {
        let space = memchr::memchr(b' ', rest).ok_or_else(|| self.malformed())?;
        let len = from_utf8(&rest[..space])
            .ok()
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<usize>().ok())
            .filter(|&len| len > space + 1 && len <= rest.len())
            .ok_or_else(|| self.malformed())?;

        let record = &rest[space + 1..len];
        let Some((&b'\n', body)) = record.split_last() else {
            return Err(self.malformed());
        };
        let equals = memchr::memchr(b'=', body).ok_or_else(|| self.malformed())?;
        let key = from_utf8(&body[..equals]).map_err(|_| self.malformed())?;
        if key.is_empty() {
            return Err(self.malformed());
        }

        self.position += len;
        Ok(PaxRecord {
            key,
            value: &body[equals + 1..],
        })
    }
}

impl<'a> Iterator for PaxRecords<'a> {
    type Item = Result<PaxRecord<'a>, HeaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let payload = self.payload;
        let rest = &payload[self.position..];
        // writers may pad the payload with NULL bytes
        if rest.iter().all(|&b| b == 0) {
            self.position = payload.len();
            return None;
        }
        Some(self.parse_next(rest))
    }
}

/// Parses a PAX payload and returns the value of its last `path` record, if
/// any. All records are validated, also those that are not used.
///
/// # Errors
/// Returns [`HeaderError::MalformedPax`] for a broken record and the name
/// errors of [`HeaderError`] for an unusable `path` value.
pub fn pax_path(payload: &[u8]) -> Result<Option<String>, HeaderError> {
    let mut path = None;
    for record in PaxRecords::new(payload) {
        let record = record?;
        if record.key == "path" {
            path = Some(record.value);
        }
    }
    path.map(validate_name).transpose()
}

/// Decodes the payload of a GNU long name entry: the name, terminated by a
/// NULL byte.
///
/// # Errors
/// Returns the name errors of [`HeaderError`].
pub fn gnu_long_name(payload: &[u8]) -> Result<String, HeaderError> {
    let len = memchr::memchr(0, payload).unwrap_or(payload.len());
    validate_name(&payload[..len])
}
