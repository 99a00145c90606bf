use crate::NumberFieldError;
use core::fmt::{Debug, Formatter};
use core::str::{from_utf8, Utf8Error};

/// Base type for strings embedded in a Tar header. The length depends on the
/// context. The returned string is likely to be UTF-8/ASCII, which is verified
/// by getters, such as [`TarFormatString::as_str`].
///
/// An optionally null terminated string. The contents are either:
/// 1. A fully populated string with no null termination or
/// 2. A partially populated string where the unused bytes are zero.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct TarFormatString<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> TarFormatString<N> {
    /// Constructor.
    ///
    /// # Panics
    /// Panics of `N` is zero, i.e., the underlying array has no length.
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        assert!(N > 0, "array should have at least one element");
        Self { bytes }
    }

    /// True if the is string empty (ignoring NULL bytes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// Returns the length of the payload in bytes. This is either the full
    /// capacity `N` or the data until the first NULL byte.
    #[must_use]
    pub fn size(&self) -> usize {
        memchr::memchr(0, &self.bytes).unwrap_or(N)
    }

    /// Returns the payload bytes without terminating or intermediate NULL bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[0..self.size()]
    }

    /// Returns the whole underlying array, including padding.
    #[must_use]
    pub const fn raw(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Returns a str ref without terminating or intermediate NULL bytes. The
    /// string is truncated at the first NULL byte, in case not the full length
    /// was used.
    ///
    /// # Errors
    /// Returns a [`Utf8Error`] error for invalid strings.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        from_utf8(self.as_bytes())
    }
}

impl<const N: usize> Debug for TarFormatString<N> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        write!(
            f,
            "str='{:?}',byte_usage={}/{}",
            self.as_str(),
            self.size(),
            N
        )
    }
}

/// A number with a specified base, stored as ASCII digits.
///
/// Writers disagree on the padding: some emit leading spaces, most a
/// trailing NULL byte, ustar writers often a trailing space followed by a
/// NULL byte. All of these variants are accepted; anything else is not.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct TarFormatNumber<const N: usize, const R: u32>(TarFormatString<N>);

/// An octal number. Surrounding spaces and NULL bytes are ignored.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct TarFormatOctal<const N: usize>(TarFormatNumber<N, 8>);

impl<const N: usize, const R: u32> TarFormatNumber<N, R> {
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(TarFormatString::new(bytes))
    }

    /// Returns the digits of the field with the padding stripped.
    ///
    /// # Errors
    /// Returns [`NumberFieldError::InvalidDigit`] if a byte that is neither a
    /// digit of radix `R` nor padding is found, or if padding is followed by
    /// further digits.
    pub fn digits(&self) -> Result<&[u8], NumberFieldError> {
        let bytes = self.0.raw();
        let start = bytes.iter().position(|&b| b != b' ').unwrap_or(N);
        let end = memchr::memchr2(0, b' ', &bytes[start..]).map_or(N, |i| start + i);

        if let Some(position) = bytes[start..end]
            .iter()
            .position(|&b| !char::from(b).is_digit(R))
        {
            return Err(NumberFieldError::InvalidDigit {
                byte: bytes[start + position],
                position: start + position,
            });
        }
        if let Some(position) = bytes[end..].iter().position(|&b| b != 0 && b != b' ') {
            return Err(NumberFieldError::InvalidDigit {
                byte: bytes[end + position],
                position: end + position,
            });
        }
        Ok(&bytes[start..end])
    }

    /// Interprets the underlying value as a number of the specified type using
    /// its respective radix. A field that consists of padding only is zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying value cannot be parsed as a number
    /// of the specified type and respective radix.
    pub fn as_number<T>(&self) -> Result<T, NumberFieldError>
    where
        T: num_traits::Num,
    {
        let digits = self.digits()?;
        if digits.is_empty() {
            return Ok(T::zero());
        }
        // Only ASCII digits are left at this point.
        let str = from_utf8(digits).map_err(|_| NumberFieldError::Overflow)?;
        T::from_str_radix(str, R).map_err(|_| NumberFieldError::Overflow)
    }

    /// Returns the underlying [`TarFormatString`].
    #[must_use]
    pub const fn as_inner(&self) -> &TarFormatString<N> {
        &self.0
    }
}

impl<const N: usize, const R: u32> Debug for TarFormatNumber<N, R> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self.as_number::<u64>() {
            Err(msg) => write!(f, "{} [{:?}]", msg, self.0.as_str()),
            Ok(val) => write!(f, "{} [{:?}]", val, self.0.as_str()),
        }
    }
}

impl<const N: usize> Debug for TarFormatOctal<N> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl<const N: usize> TarFormatOctal<N> {
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(TarFormatNumber::<N, 8>::new(bytes))
    }

    /// Interprets the underlying value as a number of the specified type using
    /// its respective radix.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying value cannot be parsed as a number
    /// of the specified type and respective radix.
    pub fn as_number<T>(&self) -> Result<T, NumberFieldError>
    where
        T: num_traits::Num,
    {
        self.0.as_number::<T>()
    }

    /// Like [`Self::as_number`], but also understands the GNU base-256
    /// encoding: if the high bit of the first byte is set, the remaining bits
    /// form a big-endian binary number. GNU tar uses this for sizes of 8GiB
    /// and more.
    ///
    /// # Errors
    /// Returns [`NumberFieldError::Negative`] for negative base-256 values and
    /// [`NumberFieldError::Overflow`] if the value exceeds [`u64`].
    pub fn as_u64_or_base256(&self) -> Result<u64, NumberFieldError> {
        let bytes = self.0.as_inner().raw();
        match bytes[0] {
            0xff => Err(NumberFieldError::Negative),
            lead if lead & 0x80 != 0 => bytes[1..]
                .iter()
                .try_fold(u64::from(lead & 0x7f), |acc, &b| {
                    acc.checked_mul(256)
                        .and_then(|acc| acc.checked_add(u64::from(b)))
                })
                .ok_or(NumberFieldError::Overflow),
            _ => self.as_number::<u64>(),
        }
    }

    /// Returns the underlying [`TarFormatString`].
    #[must_use]
    pub const fn as_inner(&self) -> &TarFormatString<N> {
        self.0.as_inner()
    }
}
