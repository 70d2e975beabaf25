use crate::errors::{Error, FormatError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};

/// Most values to reserve space for ahead of decoding them
///
/// Counts come from the input, so they only bound what can be read, not what will be.
const MAX_RESERVED: usize = 4096;

/// Capacity to reserve for `count` values about to be read from the input
pub fn capacity_for(count: usize) -> usize {
    count.min(MAX_RESERVED)
}

/// Integer coding from the `(B, H, S, D)` family
///
///   - `B` is the maximum number of bytes used for one value (1 to 5)
///   - `H` is the radix used for continuation bytes (1 to 256)
///   - `S` is the number of low bits of the code used for the sign (0 to 2)
///   - `D` says whether values are the running sum of the decoded numbers
///
/// Byte values below `L = 256 - H` terminate a value. This means that small values are always one
/// byte long, and `H` trades off how quickly the representable range grows with each byte.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Coding {
    b: u8,
    h: u16,
    s: u8,
    delta: bool,
}

impl Coding {
    pub const BYTE1: Coding = Coding::unchecked(1, 256, 0, false);
    pub const CHAR3: Coding = Coding::unchecked(3, 128, 0, false);
    pub const BCI5: Coding = Coding::unchecked(5, 4, 0, false);
    pub const BRANCH5: Coding = Coding::unchecked(5, 4, 2, false);
    pub const UNSIGNED5: Coding = Coding::unchecked(5, 64, 0, false);
    pub const UDELTA5: Coding = Coding::unchecked(5, 64, 0, true);
    pub const SIGNED5: Coding = Coding::unchecked(5, 64, 1, false);
    pub const DELTA5: Coding = Coding::unchecked(5, 64, 1, true);
    pub const MDELTA5: Coding = Coding::unchecked(5, 64, 2, true);

    pub(crate) const fn unchecked(b: u8, h: u16, s: u8, delta: bool) -> Coding {
        Coding { b, h, s, delta }
    }

    /// Make a coding, checking that the parameters are in range
    pub fn new(b: u8, h: u16, s: u8, delta: bool) -> Result<Coding, Error> {
        if !(1..=5).contains(&b) || !(1..=256).contains(&h) || s > 2 || (b == 1 && h != 256) {
            return Err(Error::Format(FormatError::BadCoding(format!(
                "({},{},{},{}) is not a valid coding",
                b, h, s, delta as u8
            ))));
        }
        Ok(Coding { b, h, s, delta })
    }

    pub fn b(&self) -> u8 {
        self.b
    }

    pub fn h(&self) -> u16 {
        self.h
    }

    pub fn s(&self) -> u8 {
        self.s
    }

    pub fn is_delta(&self) -> bool {
        self.delta
    }

    pub fn is_signed(&self) -> bool {
        self.s != 0
    }

    /// Number of byte values which terminate a value
    pub fn l(&self) -> u32 {
        256 - self.h as u32
    }

    /// Number of distinct codes
    pub fn cardinality(&self) -> u64 {
        let h = self.h as u64;
        let l = self.l() as u64;
        let mut total = 0;
        let mut h_pow = 1;
        for _ in 1..self.b {
            total += l * h_pow;
            h_pow *= h;
        }
        total + 256 * h_pow
    }

    /// Whether every 32-bit value has a code
    ///
    /// Full range codings wrap around like Java `int` arithmetic when summing deltas. Others reduce
    /// sums back into `[min, max]`.
    pub fn is_full_range(&self) -> bool {
        self.cardinality() >= 1 << 32
    }

    /// Smallest value this coding represents
    pub fn min(&self) -> i64 {
        if self.is_full_range() {
            i32::MIN as i64
        } else if self.s == 0 {
            0
        } else {
            let mask = self.sign_mask();
            let mut code = self.cardinality() - 1;
            while code & mask != mask {
                code -= 1;
            }
            -((code >> self.s) as i64) - 1
        }
    }

    /// Largest value this coding represents
    pub fn max(&self) -> i64 {
        if self.is_full_range() {
            i32::MAX as i64
        } else if self.s == 0 {
            self.cardinality() as i64 - 1
        } else {
            let mask = self.sign_mask();
            let mut code = self.cardinality() - 1;
            while code & mask == mask {
                code -= 1;
            }
            (code - (code >> self.s)) as i64
        }
    }

    fn sign_mask(&self) -> u64 {
        (1 << self.s) - 1
    }

    /// Read the bytes of one code
    pub fn read_code<R: Read>(&self, input: &mut R) -> io::Result<u64> {
        let l = self.l() as u64;
        let mut code: u64 = 0;
        let mut h_pow: u64 = 1;
        for i in 0..self.b {
            let byte = input.read_u8()? as u64;
            code += byte * h_pow;
            if byte < l || i + 1 == self.b {
                break;
            }
            h_pow *= self.h as u64;
        }
        Ok(code)
    }

    /// Write the bytes of one code (which must be below the cardinality)
    pub fn write_code<W: Write>(&self, output: &mut W, code: u64) -> io::Result<()> {
        let l = self.l() as u64;
        let h = self.h as u64;
        let mut code = code;
        for _ in 1..self.b {
            if code < l {
                return output.write_u8(code as u8);
            }
            code -= l;
            output.write_u8((l + code % h) as u8)?;
            code /= h;
        }
        output.write_u8(code as u8)
    }

    /// Turn a code into a value (without any delta decoding)
    pub fn decode_sign(&self, code: u64) -> i32 {
        let code = code as u32;
        if self.s == 0 {
            code as i32
        } else {
            let mask = (1u32 << self.s) - 1;
            if code & mask == mask {
                !(code >> self.s) as i32
            } else {
                code.wrapping_sub(code >> self.s) as i32
            }
        }
    }

    /// Turn a value into a code (without any delta encoding), if it is representable
    pub fn encode_sign(&self, value: i64) -> Option<u64> {
        let code = if self.s == 0 {
            if value >= 0 {
                value as u64
            } else if self.is_full_range() && value >= i32::MIN as i64 {
                value as i32 as u32 as u64
            } else {
                return None;
            }
        } else {
            let mask = self.sign_mask();
            if value >= 0 {
                let value = value as u64;
                value + value / mask
            } else {
                ((!value as u64) << self.s) | mask
            }
        };
        let limit = self.cardinality().min(1 << 32);
        if code < limit {
            Some(code)
        } else {
            None
        }
    }

    /// Bring a running sum back into `[min, max]`
    fn reduce(&self, sum: i64) -> i32 {
        if self.is_full_range() {
            return sum as i32;
        }
        let cardinality = self.cardinality() as i64;
        let min = self.min();
        (min + (sum - min).rem_euclid(cardinality)) as i32
    }

    /// Read one value, without applying delta decoding
    pub fn read_value<R: Read>(&self, input: &mut R) -> io::Result<i32> {
        self.read_code(input).map(|code| self.decode_sign(code))
    }

    /// Read one value, treating it as a delta from `previous` if this is a delta coding
    pub fn read_next<R: Read>(&self, input: &mut R, previous: i32) -> io::Result<i32> {
        let value = self.read_value(input)?;
        Ok(self.accumulate(previous, value))
    }

    fn accumulate(&self, previous: i32, value: i32) -> i32 {
        if self.delta {
            self.reduce(previous as i64 + value as i64)
        } else {
            value
        }
    }

    /// Decode `count` values
    pub fn decode<R: Read>(&self, input: &mut R, count: usize) -> io::Result<Vec<i32>> {
        self.decode_continuing(input, count, None)
    }

    /// Decode `count` values, the first of which may have already been read (raw, before any delta
    /// decoding)
    pub fn decode_continuing<R: Read>(
        &self,
        input: &mut R,
        count: usize,
        first: Option<i32>,
    ) -> io::Result<Vec<i32>> {
        let mut values = Vec::with_capacity(capacity_for(count));
        let mut previous = 0;
        for i in 0..count {
            let raw = match first {
                Some(first) if i == 0 => first,
                _ => self.read_value(input)?,
            };
            previous = self.accumulate(previous, raw);
            values.push(previous);
        }
        Ok(values)
    }

    /// Raw value the decoder sees first when reading a band starting with `value`
    pub fn first_raw_value(&self, value: i32) -> i32 {
        if self.delta {
            self.reduce(value as i64)
        } else {
            value
        }
    }

    /// Write one value, without applying delta encoding
    pub fn write_value<W: Write>(&self, output: &mut W, value: i32) -> Result<(), Error> {
        let code = self.encode_sign(value as i64).ok_or_else(|| self.not_encodable(value))?;
        self.write_code(output, code)?;
        Ok(())
    }

    /// Encode all of the values of a band
    pub fn encode<W: Write>(&self, output: &mut W, values: &[i32]) -> Result<(), Error> {
        let mut previous: i32 = 0;
        for value in values {
            let raw = if self.delta {
                let delta = if self.is_full_range() {
                    value.wrapping_sub(previous)
                } else {
                    self.reduce(*value as i64 - previous as i64)
                };
                previous = *value;
                delta
            } else {
                *value
            };
            self.write_value(output, raw)?;
        }
        Ok(())
    }

    fn not_encodable(&self, value: i32) -> Error {
        Error::Format(FormatError::NotEncodable {
            value: value as i64,
            coding: self.to_string(),
        })
    }
}

impl fmt::Display for Coding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}", self.b, self.h)?;
        if self.s != 0 || self.delta {
            write!(f, ",{}", self.s)?;
        }
        if self.delta {
            f.write_str(",1")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Coding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coding{}", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn encoded(coding: Coding, values: &[i32]) -> Vec<u8> {
        let mut out = vec![];
        coding.encode(&mut out, values).unwrap();
        out
    }

    fn decoded(coding: Coding, bytes: &[u8], count: usize) -> Vec<i32> {
        coding.decode(&mut Cursor::new(bytes), count).unwrap()
    }

    #[test]
    fn unsigned5_bytes() {
        assert_eq!(encoded(Coding::UNSIGNED5, &[0]), vec![0]);
        assert_eq!(encoded(Coding::UNSIGNED5, &[191]), vec![191]);
        assert_eq!(encoded(Coding::UNSIGNED5, &[192]), vec![192, 0]);
        assert_eq!(encoded(Coding::UNSIGNED5, &[255]), vec![255, 0]);
        assert_eq!(encoded(Coding::UNSIGNED5, &[256]), vec![192, 1]);
        assert_eq!(decoded(Coding::UNSIGNED5, &[192, 1, 7], 2), vec![256, 7]);
    }

    #[test]
    fn signed_codes() {
        assert_eq!(encoded(Coding::SIGNED5, &[0, -1, 1, -2]), vec![0, 1, 2, 3]);
        assert_eq!(decoded(Coding::SIGNED5, &[0, 1, 2, 3], 4), vec![0, -1, 1, -2]);

        // Two sign bits: only codes ending in `11` are negative
        assert_eq!(Coding::MDELTA5.encode_sign(2), Some(2));
        assert_eq!(Coding::MDELTA5.encode_sign(3), Some(4));
        assert_eq!(Coding::MDELTA5.encode_sign(-1), Some(3));
        assert_eq!(Coding::MDELTA5.decode_sign(7), -2);
    }

    #[test]
    fn delta_codes() {
        assert_eq!(encoded(Coding::DELTA5, &[5, 7, 6]), vec![10, 4, 1]);
        assert_eq!(decoded(Coding::DELTA5, &[10, 4, 1], 3), vec![5, 7, 6]);
    }

    #[test]
    fn delta_subrange_wraps_into_range() {
        let coding = Coding::new(1, 256, 0, true).unwrap();
        assert_eq!(encoded(coding, &[250, 3]), vec![250, 9]);
        assert_eq!(decoded(coding, &[250, 9], 2), vec![250, 3]);
    }

    #[test]
    fn full_range_extremes() {
        for coding in [Coding::UNSIGNED5, Coding::SIGNED5, Coding::DELTA5, Coding::UDELTA5] {
            let values = [i32::MIN, i32::MAX, -1, 0, 1];
            let bytes = encoded(coding, &values);
            assert_eq!(decoded(coding, &bytes, values.len()), values, "{}", coding);
        }
    }

    #[test]
    fn ranges() {
        assert_eq!(Coding::BYTE1.cardinality(), 256);
        assert_eq!(Coding::BCI5.cardinality(), 86956);
        assert_eq!(Coding::UNSIGNED5.cardinality(), 4346097856);
        assert!(Coding::UNSIGNED5.is_full_range());

        let signed_byte = Coding::new(1, 256, 1, false).unwrap();
        assert_eq!((signed_byte.min(), signed_byte.max()), (-128, 127));
        assert_eq!((Coding::CHAR3.min(), Coding::CHAR3.max()), (0, 4_210_815));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut out = vec![];
        assert!(Coding::BYTE1.encode(&mut out, &[256]).is_err());
        assert!(Coding::BCI5.encode(&mut out, &[-1]).is_err());
    }

    #[test]
    fn invalid_parameters() {
        assert!(Coding::new(6, 64, 0, false).is_err());
        assert!(Coding::new(1, 64, 0, false).is_err());
        assert!(Coding::new(5, 64, 3, false).is_err());
        assert!(Coding::new(2, 0, 0, false).is_err());
    }

    #[test]
    fn display() {
        assert_eq!(Coding::UNSIGNED5.to_string(), "(5,64)");
        assert_eq!(Coding::SIGNED5.to_string(), "(5,64,1)");
        assert_eq!(Coding::UDELTA5.to_string(), "(5,64,0,1)");
    }
}
