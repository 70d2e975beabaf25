use super::{canonical_index, capacity_for, Coding, CodingMethod, EXPLICIT_CODING};
use crate::errors::{Error, FormatError};
use std::io::{self, Cursor, Read, Write};

/// Reads bands from a segment
///
/// Besides the input stream, this holds the band headers of the segment: the extra bytes that
/// describe coding methods for bands whose first value escapes out of the default coding.
pub struct BandReader<R> {
    input: R,
    headers: Cursor<Vec<u8>>,
}

impl<R: Read> BandReader<R> {
    pub fn new(input: R) -> BandReader<R> {
        BandReader {
            input,
            headers: Cursor::new(vec![]),
        }
    }

    pub fn set_band_headers(&mut self, headers: Vec<u8>) {
        self.headers = Cursor::new(headers);
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    /// Read a single value (eg. a segment header field), never escaping
    pub fn read_value(&mut self, name: &str, coding: Coding) -> Result<i32, Error> {
        coding
            .read_value(&mut self.input)
            .map_err(|err| eof_as_format(err, name))
    }

    /// Read a single non-negative count
    pub fn read_count(&mut self, name: &str) -> Result<usize, Error> {
        let value = self.read_value(name, Coding::UNSIGNED5)?;
        usize::try_from(value)
            .map_err(|_| Error::format(format!("negative count {} in {}", value, name)))
    }

    /// Read raw bytes
    pub fn read_bytes(&mut self, name: &str, count: usize) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::with_capacity(capacity_for(count));
        let read = (&mut self.input)
            .take(count as u64)
            .read_to_end(&mut bytes)
            .map_err(|err| eof_as_format(err, name))?;
        if read < count {
            return Err(Error::Format(FormatError::UnexpectedEof {
                band: name.to_owned(),
            }));
        }
        Ok(bytes)
    }

    /// Read one raw byte, for bands whose length is only known once they have been read
    pub fn read_byte(&mut self, name: &str) -> Result<u8, Error> {
        let mut byte = [0];
        self.input
            .read_exact(&mut byte)
            .map_err(|err| eof_as_format(err, name))?;
        Ok(byte[0])
    }

    /// Read a band of `count` values with the given default coding
    pub fn read_band(&mut self, name: &str, coding: Coding, count: usize) -> Result<Vec<i32>, Error> {
        log::trace!("Reading band {} ({} values, {})", name, count, coding);
        self.read_band_inner(coding, count)
            .map_err(|err| match err {
                Error::IoError(err) => eof_as_format(err, name),
                other => other,
            })
    }

    fn read_band_inner(&mut self, coding: Coding, count: usize) -> Result<Vec<i32>, Error> {
        if count == 0 {
            return Ok(vec![]);
        }
        if !can_escape(coding) {
            return Ok(coding.decode(&mut self.input, count)?);
        }

        let first = coding.read_value(&mut self.input)?;
        match escape_specifier(coding, first) {
            Some(specifier) => {
                let method = CodingMethod::parse(specifier, &mut self.headers, coding)?;
                log::trace!("Band escapes to {:?}", method);
                method.decode(&mut self.input, count)
            }
            None => Ok(coding.decode_continuing(&mut self.input, count, Some(first))?),
        }
    }

    /// Read a band of indices into a table of the given length
    pub fn read_indices(
        &mut self,
        name: &str,
        coding: Coding,
        count: usize,
        len: usize,
    ) -> Result<Vec<usize>, Error> {
        self.read_band(name, coding, count)?
            .into_iter()
            .map(|value| check_index(name, value, len))
            .collect()
    }

    /// Read a band of counts (which must all be non-negative)
    pub fn read_counts(&mut self, name: &str, coding: Coding, count: usize) -> Result<Vec<usize>, Error> {
        self.read_indices(name, coding, count, usize::MAX)
    }
}

/// Check that a band value is a valid index into a table of length `len`
pub fn check_index(band: &str, value: i32, len: usize) -> Result<usize, Error> {
    match usize::try_from(value) {
        Ok(index) if index < len => Ok(index),
        _ => Err(Error::Format(FormatError::DanglingIndex {
            band: band.to_owned(),
            index: value as i64,
            len,
        })),
    }
}

/// Writes bands of a segment
#[derive(Default)]
pub struct BandWriter {
    output: Vec<u8>,
    headers: Vec<u8>,
}

impl BandWriter {
    pub fn new() -> BandWriter {
        BandWriter::default()
    }

    /// Write a single value, never escaping
    pub fn write_value(&mut self, coding: Coding, value: i32) -> Result<(), Error> {
        coding.write_value(&mut self.output, value)
    }

    pub fn write_count(&mut self, count: usize) -> Result<(), Error> {
        self.write_value(Coding::UNSIGNED5, to_i32(count)?)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.output.write_all(bytes)?;
        Ok(())
    }

    /// Write a band with its default coding
    ///
    /// If the first value would be mistaken for an escape, an explicit escape back to the default
    /// coding is written first. Values outside the range of the default coding escape into
    /// `SIGNED5` instead.
    pub fn write_band(&mut self, name: &str, coding: Coding, values: &[i32]) -> Result<(), Error> {
        log::trace!("Writing band {} ({} values, {})", name, values.len(), coding);
        let first = match values.first() {
            Some(first) => *first,
            None => return Ok(()),
        };
        if !can_escape(coding) {
            return coding.encode(&mut self.output, values);
        }

        let out_of_range = !coding.is_full_range()
            && values
                .iter()
                .any(|value| (*value as i64) < coding.min() || (*value as i64) > coding.max());
        if out_of_range {
            let fallback = if coding.is_delta() {
                Coding::DELTA5
            } else {
                Coding::SIGNED5
            };
            log::debug!("Band {} does not fit {}, escaping to {}", name, coding, fallback);
            self.write_escape(coding, fallback)?;
            fallback.encode(&mut self.output, values)
        } else {
            if escape_specifier(coding, coding.first_raw_value(first)).is_some() {
                self.write_escape(coding, coding)?;
            }
            coding.encode(&mut self.output, values)
        }
    }

    /// Write the first value of a band with default coding `coding`, switching it to `target`
    fn write_escape(&mut self, coding: Coding, target: Coding) -> Result<(), Error> {
        let specifier = match canonical_index(target) {
            Some(index) => index as i32,
            None => {
                let code = (target.b() - 1) << 3 | target.s() << 1 | target.is_delta() as u8;
                self.headers.push(code);
                self.headers.push((target.h() - 1) as u8);
                EXPLICIT_CODING as i32
            }
        };
        let escape = if coding.is_signed() {
            -1 - specifier
        } else {
            coding.l() as i32 + specifier
        };
        coding.write_value(&mut self.output, escape)
    }

    /// Write a band of indices or counts
    pub fn write_indices(&mut self, name: &str, coding: Coding, values: &[usize]) -> Result<(), Error> {
        let values = values
            .iter()
            .map(|value| to_i32(*value))
            .collect::<Result<Vec<i32>, Error>>()?;
        self.write_band(name, coding, &values)
    }

    /// Bytes of the bands written so far
    pub fn bands(&self) -> &[u8] {
        &self.output
    }

    /// Band header bytes accumulated for escaped bands
    pub fn band_headers(&self) -> &[u8] {
        &self.headers
    }
}

pub fn to_i32(value: usize) -> Result<i32, Error> {
    i32::try_from(value).map_err(|_| {
        Error::Format(FormatError::NotEncodable {
            value: value as i64,
            coding: "a 32-bit band".to_owned(),
        })
    })
}

fn can_escape(coding: Coding) -> bool {
    coding.b() > 1 && coding.l() != 0
}

/// Meta coding specifier selected by the first value of a band, if it is an escape
fn escape_specifier(coding: Coding, first: i32) -> Option<u8> {
    if coding.is_signed() {
        if (-256..=-1).contains(&first) {
            return Some((-1 - first) as u8);
        }
    } else {
        let l = coding.l() as i64;
        let first = first as i64;
        if first >= l && first <= l + 255 {
            return Some((first - l) as u8);
        }
    }
    None
}

fn eof_as_format(err: io::Error, band: &str) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Format(FormatError::UnexpectedEof {
            band: band.to_owned(),
        })
    } else {
        Error::IoError(err)
    }
}
