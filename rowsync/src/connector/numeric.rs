use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use byteorder::{BigEndian, ReadBytesExt};
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

const POSITIVE: u16 = 0x0000;
const NEGATIVE: u16 = 0x4000;
const NAN: u16 = 0xC000;
const POSITIVE_INFINITY: u16 = 0xD000;
const NEGATIVE_INFINITY: u16 = 0xF000;

/// PostgreSQL NUMERIC in its wire representation.
///
/// Values keep the base-10000 digit form the server sends, so they bind back into a
/// NUMERIC column without rounding. Collapsing to [`f64`] happens only when the
/// engine's neutral value representation requires it.
#[derive(Debug, Clone, PartialEq)]
pub enum PgNumeric {
    NaN,
    Infinity {
        negative: bool,
    },
    Value {
        negative: bool,
        /// Power of 10000 of the first digit group.
        weight: i16,
        /// Decimal digits rendered after the point.
        scale: u16,
        /// Digit groups in base 10000, most significant first.
        digits: Vec<i16>,
    },
}

const ZERO: PgNumeric = PgNumeric::Value {
    negative: false,
    weight: 0,
    scale: 0,
    digits: vec![],
};

impl PgNumeric {
    /// Collapses the value into an [`f64`], losing precision past its 53-bit mantissa.
    pub fn to_f64(&self) -> f64 {
        match self {
            PgNumeric::NaN => f64::NAN,
            PgNumeric::Infinity { negative: true } => f64::NEG_INFINITY,
            PgNumeric::Infinity { negative: false } => f64::INFINITY,
            PgNumeric::Value { .. } => self.to_string().parse().unwrap_or(f64::NAN),
        }
    }
}

impl From<f64> for PgNumeric {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            return PgNumeric::NaN;
        }
        if value.is_infinite() {
            return PgNumeric::Infinity {
                negative: value < 0.0,
            };
        }
        // Float formatting always yields plain decimal text, which the parser accepts.
        value.to_string().parse().unwrap_or(ZERO)
    }
}

impl From<i64> for PgNumeric {
    fn from(value: i64) -> Self {
        value.to_string().parse().unwrap_or(ZERO)
    }
}

/// Error raised when text cannot be parsed as a numeric literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseNumericError;

impl fmt::Display for ParseNumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid numeric literal")
    }
}

impl std::error::Error for ParseNumericError {}

impl FromStr for PgNumeric {
    type Err = ParseNumericError;

    /// Parses plain decimal text with an optional sign, plus the special spellings
    /// `NaN`, `Infinity` and `inf`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        match rest.to_ascii_lowercase().as_str() {
            // NaN carries no sign.
            "nan" if !negative => return Ok(PgNumeric::NaN),
            "nan" => return Err(ParseNumericError),
            "inf" | "infinity" => return Ok(PgNumeric::Infinity { negative }),
            _ => {}
        }

        let (int_part, frac_part) = match rest.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (rest, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseNumericError);
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseNumericError);
        }

        let scale = u16::try_from(frac_part.len()).map_err(|_| ParseNumericError)?;

        // Single decimal digit stream with the point position tracked from the left.
        let mut decimal_digits: Vec<u8> = int_part
            .bytes()
            .chain(frac_part.bytes())
            .map(|b| b - b'0')
            .collect();
        let mut point = int_part.len() as i32;

        let leading_zeros = decimal_digits.iter().take_while(|&&d| d == 0).count();
        decimal_digits.drain(..leading_zeros);
        point -= leading_zeros as i32;
        while decimal_digits.last() == Some(&0) {
            decimal_digits.pop();
        }

        if decimal_digits.is_empty() {
            return Ok(PgNumeric::Value {
                negative: false,
                weight: 0,
                scale,
                digits: vec![],
            });
        }

        // The first significant digit has decimal weight `point - 1`. Its base-10000
        // group starts at a multiple-of-4 boundary, so the group may need leading pad
        // zeros to line up.
        let first_weight = point - 1;
        let weight = first_weight.div_euclid(4);
        let pad = (4 * weight + 3 - first_weight) as usize;

        let mut digits = Vec::with_capacity((pad + decimal_digits.len()).div_ceil(4));
        let mut group = 0i16;
        let mut filled = pad;
        for &digit in &decimal_digits {
            group = group * 10 + digit as i16;
            filled += 1;
            if filled == 4 {
                digits.push(group);
                group = 0;
                filled = 0;
            }
        }
        if filled > 0 {
            for _ in filled..4 {
                group *= 10;
            }
            digits.push(group);
        }
        while digits.last() == Some(&0) {
            digits.pop();
        }

        Ok(PgNumeric::Value {
            negative,
            weight: weight as i16,
            scale,
            digits,
        })
    }
}

impl fmt::Display for PgNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (negative, weight, scale, digits) = match self {
            PgNumeric::NaN => return f.write_str("NaN"),
            PgNumeric::Infinity { negative: false } => return f.write_str("Infinity"),
            PgNumeric::Infinity { negative: true } => return f.write_str("-Infinity"),
            PgNumeric::Value {
                negative,
                weight,
                scale,
                digits,
            } => (*negative, *weight as i32, *scale as usize, digits),
        };

        if digits.is_empty() {
            return f.write_str("0");
        }
        if negative {
            f.write_str("-")?;
        }

        let group = |index: i32| -> i16 {
            usize::try_from(index)
                .ok()
                .and_then(|index| digits.get(index).copied())
                .unwrap_or(0)
        };

        if weight < 0 {
            f.write_str("0")?;
        } else {
            // The most significant group drops its leading zeros.
            write!(f, "{}", group(0))?;
            for index in 1..=weight {
                write!(f, "{:04}", group(index))?;
            }
        }

        if scale > 0 {
            let mut fraction = String::with_capacity(scale + 4);
            let mut index = weight + 1;
            while fraction.len() < scale {
                fraction.push_str(&format!("{:04}", group(index)));
                index += 1;
            }
            fraction.truncate(scale);
            write!(f, ".{fraction}")?;
        }

        Ok(())
    }
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + 'static + Sync + Send>> {
        let mut rdr = Cursor::new(raw);

        let num_digits = rdr.read_u16::<BigEndian>()?;
        let weight = rdr.read_i16::<BigEndian>()?;
        let sign = rdr.read_u16::<BigEndian>()?;
        let scale = rdr.read_u16::<BigEndian>()?;

        let negative = match sign {
            POSITIVE => false,
            NEGATIVE => true,
            NAN => return Ok(PgNumeric::NaN),
            POSITIVE_INFINITY => return Ok(PgNumeric::Infinity { negative: false }),
            NEGATIVE_INFINITY => return Ok(PgNumeric::Infinity { negative: true }),
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid numeric sign {other:#06x}"),
                )
                .into());
            }
        };

        let mut digits = Vec::with_capacity(num_digits as usize);
        for _ in 0..num_digits {
            digits.push(rdr.read_i16::<BigEndian>()?);
        }

        Ok(PgNumeric::Value {
            negative,
            weight,
            scale,
            digits,
        })
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::NUMERIC)
    }
}

impl ToSql for PgNumeric {
    fn to_sql(
        &self,
        _: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        let empty: &[i16] = &[];
        let (sign, weight, scale, digits) = match self {
            PgNumeric::NaN => (NAN, 0, 0, empty),
            PgNumeric::Infinity { negative: false } => (POSITIVE_INFINITY, 0, 0, empty),
            PgNumeric::Infinity { negative: true } => (NEGATIVE_INFINITY, 0, 0, empty),
            PgNumeric::Value {
                negative,
                weight,
                scale,
                digits,
            } => (
                if *negative { NEGATIVE } else { POSITIVE },
                *weight,
                *scale,
                digits.as_slice(),
            ),
        };

        let num_digits: u16 = digits.len().try_into()?;
        out.extend_from_slice(&num_digits.to_be_bytes());
        out.extend_from_slice(&weight.to_be_bytes());
        out.extend_from_slice(&sign.to_be_bytes());
        out.extend_from_slice(&scale.to_be_bytes());
        for digit in digits {
            out.extend_from_slice(&digit.to_be_bytes());
        }

        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::NUMERIC)
    }

    tokio_postgres::types::to_sql_checked!();
}
