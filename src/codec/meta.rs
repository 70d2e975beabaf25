use super::{canonical_coding, capacity_for, Coding};
use crate::errors::{Error, FormatError};
use byteorder::ReadBytesExt;
use std::io::Read;

/// Specifier for an explicit `(B, H, S, D)` coding, described by two band header bytes
pub const EXPLICIT_CODING: u8 = 116;

const RUN_CODING_FIRST: u8 = 117;
const RUN_CODING_LAST: u8 = 140;
const POPULATION_CODING_FIRST: u8 = 141;
const POPULATION_CODING_LAST: u8 = 188;

/// Values of `L` which the population coding token coding may be derived from
const POPULATION_TOKEN_L: [u16; 12] = [0, 4, 8, 16, 32, 64, 128, 192, 224, 240, 248, 252];

/// Deepest run coding nesting accepted in a band header
const MAX_NESTING: usize = 16;

/// How all of the values of a band are coded
///
/// Bands are coded with their default BHSD coding unless their first value escapes into a band
/// header, in which case the header describes one of these methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodingMethod {
    Plain(Coding),

    /// First `k` values use `first`, the rest use `rest`
    Run {
        k: usize,
        first: Box<CodingMethod>,
        rest: Box<CodingMethod>,
    },

    /// Values are drawn (mostly) from a small table of favoured values
    ///
    /// The favoured values come first, then one token per band value (0 meaning "not favoured",
    /// `n` meaning the `n`th favoured value), then the unfavoured values in order.
    Population {
        favoured: Coding,
        tokens: TokenCoding,
        unfavoured: Coding,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenCoding {
    Explicit(Coding),

    /// Smallest coding `(B, 256 - l)` which can represent every token
    Derived { l: u16 },
}

impl CodingMethod {
    /// Parse the coding method for a specifier, reading any extra bytes from the band headers
    ///
    /// `default` is the band's default coding, also used for the `0` specifier in nested methods.
    pub fn parse<H: Read>(specifier: u8, headers: &mut H, default: Coding) -> Result<Self, Error> {
        CodingMethod::parse_nested(specifier, headers, default, 0)
    }

    fn parse_nested<H: Read>(
        specifier: u8,
        headers: &mut H,
        default: Coding,
        depth: usize,
    ) -> Result<Self, Error> {
        if depth > MAX_NESTING {
            return Err(bad_coding(format!(
                "coding methods nested more than {} deep",
                MAX_NESTING
            )));
        }
        match specifier {
            0 => Ok(CodingMethod::Plain(default)),
            1..=115 => canonical_coding(specifier as usize)
                .map(CodingMethod::Plain)
                .ok_or_else(|| bad_coding(format!("no canonical coding {}", specifier))),
            EXPLICIT_CODING => {
                let code = read_header(headers)?;
                let h = read_header(headers)? as u16 + 1;
                let b = (code >> 3 & 0x07) + 1;
                let s = code >> 1 & 0x03;
                let delta = code & 0x01 == 1;
                Coding::new(b, h, s, delta).map(CodingMethod::Plain)
            }
            RUN_CODING_FIRST..=RUN_CODING_LAST => {
                let offset = specifier - RUN_CODING_FIRST;
                let kx = offset & 0x03;
                let explicit_kb = offset >> 2 & 0x01 == 1;
                let first_default = offset >> 3 & 0x01 == 1;
                let rest_default = offset >> 4 & 0x01 == 1;

                let kb = if explicit_kb {
                    read_header(headers)? as usize
                } else {
                    3
                };
                let k = (kb + 1) << (4 * kx);
                let first = if first_default {
                    CodingMethod::Plain(default)
                } else {
                    CodingMethod::parse_nested(read_header(headers)?, headers, default, depth + 1)?
                };
                let rest = if rest_default {
                    CodingMethod::Plain(default)
                } else {
                    CodingMethod::parse_nested(read_header(headers)?, headers, default, depth + 1)?
                };
                Ok(CodingMethod::Run {
                    k,
                    first: Box::new(first),
                    rest: Box::new(rest),
                })
            }
            POPULATION_CODING_FIRST..=POPULATION_CODING_LAST => {
                let offset = specifier - POPULATION_CODING_FIRST;
                let favoured_default = offset & 0x01 == 1;
                let unfavoured_default = offset >> 1 & 0x01 == 1;
                let token_l = (offset >> 2) as usize;

                let favoured = if favoured_default {
                    default
                } else {
                    parse_plain(read_header(headers)?, headers, default)?
                };
                let tokens = if token_l != 0 {
                    TokenCoding::Derived {
                        l: POPULATION_TOKEN_L[token_l],
                    }
                } else {
                    TokenCoding::Explicit(parse_plain(read_header(headers)?, headers, default)?)
                };
                let unfavoured = if unfavoured_default {
                    default
                } else {
                    parse_plain(read_header(headers)?, headers, default)?
                };
                Ok(CodingMethod::Population {
                    favoured,
                    tokens,
                    unfavoured,
                })
            }
            _ => Err(bad_coding(format!("unknown coding specifier {}", specifier))),
        }
    }

    /// Decode `count` values
    pub fn decode<R: Read>(&self, input: &mut R, count: usize) -> Result<Vec<i32>, Error> {
        match self {
            CodingMethod::Plain(coding) => Ok(coding.decode(input, count)?),
            CodingMethod::Run { k, first, rest } => {
                let first_count = count.min(*k);
                let mut values = first.decode(input, first_count)?;
                values.extend(rest.decode(input, count - first_count)?);
                Ok(values)
            }
            CodingMethod::Population {
                favoured,
                tokens,
                unfavoured,
            } => decode_population(input, count, *favoured, *tokens, *unfavoured),
        }
    }
}

fn decode_population<R: Read>(
    input: &mut R,
    count: usize,
    favoured_coding: Coding,
    tokens: TokenCoding,
    unfavoured_coding: Coding,
) -> Result<Vec<i32>, Error> {
    // Favoured values end when one repeats the previous value or the one of smallest magnitude
    let mut favoured: Vec<i32> = vec![];
    let mut smallest: Option<i32> = None;
    let mut last = 0;
    loop {
        let value = favoured_coding.read_next(input, last)?;
        if !favoured.is_empty() && (Some(value) == smallest || value == last) {
            break;
        }
        favoured.push(value);
        smallest = Some(match smallest {
            Some(small) if (small as i64).abs() < (value as i64).abs() => small,
            Some(small) if (small as i64).abs() == (value as i64).abs() => small.max(value),
            _ => value,
        });
        last = value;
    }

    let token_coding = match tokens {
        TokenCoding::Explicit(coding) => coding,
        TokenCoding::Derived { l } => derive_token_coding(favoured.len(), l)?,
    };

    let tokens = token_coding.decode(input, count)?;
    let mut values = Vec::with_capacity(capacity_for(count));
    let mut last_unfavoured = 0;
    for token in tokens {
        if token == 0 {
            last_unfavoured = unfavoured_coding.read_next(input, last_unfavoured)?;
            values.push(last_unfavoured);
        } else {
            let value = usize::try_from(token)
                .ok()
                .and_then(|token| favoured.get(token - 1))
                .ok_or_else(|| {
                    bad_coding(format!(
                        "population token {} for {} favoured values",
                        token,
                        favoured.len()
                    ))
                })?;
            values.push(*value);
        }
    }
    Ok(values)
}

fn derive_token_coding(favoured_count: usize, l: u16) -> Result<Coding, Error> {
    if favoured_count < 256 {
        return Ok(Coding::BYTE1);
    }
    for b in 2..=4 {
        let coding = Coding::new(b, 256 - l, 0, false)?;
        if coding.cardinality() > favoured_count as u64 {
            return Ok(coding);
        }
    }
    Err(bad_coding(format!(
        "no token coding for {} favoured values with L = {}",
        favoured_count, l
    )))
}

fn parse_plain<H: Read>(specifier: u8, headers: &mut H, default: Coding) -> Result<Coding, Error> {
    match CodingMethod::parse(specifier, headers, default)? {
        CodingMethod::Plain(coding) => Ok(coding),
        _ => Err(Error::unsupported(
            "population coding with a nested run or population coding",
        )),
    }
}

fn read_header<H: Read>(headers: &mut H) -> Result<u8, Error> {
    headers
        .read_u8()
        .map_err(|_| bad_coding("band headers ended early"))
}

fn bad_coding(message: impl Into<String>) -> Error {
    Error::Format(FormatError::BadCoding(message.into()))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn parse(specifier: u8, headers: &[u8]) -> CodingMethod {
        CodingMethod::parse(specifier, &mut Cursor::new(headers), Coding::UNSIGNED5).unwrap()
    }

    #[test]
    fn canonical_and_default() {
        assert_eq!(parse(0, &[]), CodingMethod::Plain(Coding::UNSIGNED5));
        assert_eq!(parse(1, &[]), CodingMethod::Plain(Coding::BYTE1));
        assert_eq!(parse(42, &[]), CodingMethod::Plain(Coding::DELTA5));
    }

    #[test]
    fn explicit_coding() {
        // b = 3, s = 0, d = 0, h = 128
        assert_eq!(parse(116, &[2 << 3, 127]), CodingMethod::Plain(Coding::CHAR3));
        // b = 5, s = 1, d = 1, h = 64
        assert_eq!(parse(116, &[4 << 3 | 1 << 1 | 1, 63]), CodingMethod::Plain(Coding::DELTA5));
    }

    #[test]
    fn run_coding() {
        // kx = 0, explicit kb = 1, both codings explicit
        let method = parse(117 + 4, &[1, 1, 26]);
        assert_eq!(
            method,
            CodingMethod::Run {
                k: 2,
                first: Box::new(CodingMethod::Plain(Coding::BYTE1)),
                rest: Box::new(CodingMethod::Plain(Coding::UNSIGNED5)),
            }
        );

        let values = method.decode(&mut Cursor::new(&[200, 201, 192, 1]), 3).unwrap();
        assert_eq!(values, vec![200, 201, 256]);
    }

    #[test]
    fn run_coding_defaults() {
        // kx = 1, kb = 3 (so k = 64), first coding default, rest coding explicit
        let method = parse(117 + 1 + 8, &[1]);
        assert_eq!(
            method,
            CodingMethod::Run {
                k: 64,
                first: Box::new(CodingMethod::Plain(Coding::UNSIGNED5)),
                rest: Box::new(CodingMethod::Plain(Coding::BYTE1)),
            }
        );
    }

    #[test]
    fn population_coding() {
        // favoured and unfavoured default (UNSIGNED5), tokens BYTE1
        let method = parse(141 + 3, &[1]);
        assert_eq!(
            method,
            CodingMethod::Population {
                favoured: Coding::UNSIGNED5,
                tokens: TokenCoding::Explicit(Coding::BYTE1),
                unfavoured: Coding::UNSIGNED5,
            }
        );

        // favoured: 7, 3, then 3 again terminates the table
        // tokens: 1, 0, 2, 1, 0
        // unfavoured: 100, 9
        let bytes = [7, 3, 3, 1, 0, 2, 1, 0, 100, 9];
        let values = method.decode(&mut Cursor::new(&bytes), 5).unwrap();
        assert_eq!(values, vec![7, 100, 3, 7, 9]);
    }

    #[test]
    fn population_derived_tokens() {
        let method = parse(141 + 3 + (1 << 2), &[]);
        assert_eq!(
            method,
            CodingMethod::Population {
                favoured: Coding::UNSIGNED5,
                tokens: TokenCoding::Derived { l: 4 },
                unfavoured: Coding::UNSIGNED5,
            }
        );

        // favoured table 5, 2, terminated by the smallest value (2)
        let bytes = [5, 2, 2, 2, 1];
        let values = method.decode(&mut Cursor::new(&bytes), 2).unwrap();
        assert_eq!(values, vec![2, 5]);
    }

    #[test]
    fn bad_specifiers() {
        let mut empty = Cursor::new(&[] as &[u8]);
        assert!(CodingMethod::parse(189, &mut empty, Coding::UNSIGNED5).is_err());
        assert!(CodingMethod::parse(116, &mut empty, Coding::UNSIGNED5).is_err());
    }

    #[test]
    fn deeply_nested_run_codings() {
        // each 117 nests another run coding as its first coding
        let headers = vec![117; 1 << 20];
        let err = CodingMethod::parse(117, &mut Cursor::new(headers), Coding::UNSIGNED5).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadCoding(_))));

        // a few levels are still fine: 133 nests only its first coding
        let headers = [133, 133, 0];
        assert!(CodingMethod::parse(133, &mut Cursor::new(&headers), Coding::UNSIGNED5).is_ok());
    }
}
