use std::fmt;

/// A 96-bit scaled decimal, stored on disk in the 16-byte
/// `lo, mid, hi, flags` layout (scale in bits 16..24 of `flags`,
/// sign in bit 31).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: u128,
    scale: u8,
    negative: bool,
}

impl Decimal {
    pub const MAX_SCALE: u8 = 28;
    const MANTISSA_MASK: u128 = (1u128 << 96) - 1;

    /// Returns `None` when the mantissa needs more than 96 bits or the
    /// scale exceeds 28 digits.
    pub fn new(value: i128, scale: u8) -> Option<Self> {
        let mantissa = value.unsigned_abs();
        if mantissa > Self::MANTISSA_MASK || scale > Self::MAX_SCALE {
            return None;
        }
        Some(Self {
            mantissa,
            scale,
            negative: value < 0,
        })
    }

    pub fn mantissa(&self) -> i128 {
        let m = self.mantissa as i128;
        if self.negative { -m } else { m }
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&(self.mantissa as u32).to_le_bytes());
        out[4..8].copy_from_slice(&((self.mantissa >> 32) as u32).to_le_bytes());
        out[8..12].copy_from_slice(&((self.mantissa >> 64) as u32).to_le_bytes());
        let mut flags = (self.scale as u32) << 16;
        if self.negative {
            flags |= 1 << 31;
        }
        out[12..16].copy_from_slice(&flags.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Option<Self> {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let flags = word(12);
        // Only the scale byte and the sign bit may be set.
        if flags & !(0x00FF_0000 | 0x8000_0000) != 0 {
            return None;
        }
        let scale = ((flags >> 16) & 0xFF) as u8;
        if scale > Self::MAX_SCALE {
            return None;
        }
        let mantissa = word(0) as u128 | (word(4) as u128) << 32 | (word(8) as u128) << 64;
        Some(Self {
            mantissa,
            scale,
            negative: flags & 0x8000_0000 != 0,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        let sign = if self.negative && self.mantissa != 0 { "-" } else { "" };
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int, frac)
    }
}

/// Type tag written before every entry. The numbering is part of the file
/// format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Text = 0,
    U8 = 1,
    I8 = 2,
    Bool = 3,
    U16 = 4,
    I16 = 5,
    U32 = 6,
    I32 = 7,
    U64 = 8,
    I64 = 9,
    F32 = 10,
    F64 = 11,
    Decimal = 12,
    Blob = 13,
}

impl TypeTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => TypeTag::Text,
            1 => TypeTag::U8,
            2 => TypeTag::I8,
            3 => TypeTag::Bool,
            4 => TypeTag::U16,
            5 => TypeTag::I16,
            6 => TypeTag::U32,
            7 => TypeTag::I32,
            8 => TypeTag::U64,
            9 => TypeTag::I64,
            10 => TypeTag::F32,
            11 => TypeTag::F64,
            12 => TypeTag::Decimal,
            13 => TypeTag::Blob,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Text => "text",
            TypeTag::U8 => "u8",
            TypeTag::I8 => "i8",
            TypeTag::Bool => "bool",
            TypeTag::U16 => "u16",
            TypeTag::I16 => "i16",
            TypeTag::U32 => "u32",
            TypeTag::I32 => "i32",
            TypeTag::U64 => "u64",
            TypeTag::I64 => "i64",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Decimal => "decimal",
            TypeTag::Blob => "blob",
        }
    }
}

/// A typed cache value.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Text(String),
    U8(u8),
    I8(i8),
    Bool(bool),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Blob(Vec<u8>),
}

impl CacheValue {
    pub fn tag(&self) -> TypeTag {
        match self {
            CacheValue::Text(_) => TypeTag::Text,
            CacheValue::U8(_) => TypeTag::U8,
            CacheValue::I8(_) => TypeTag::I8,
            CacheValue::Bool(_) => TypeTag::Bool,
            CacheValue::U16(_) => TypeTag::U16,
            CacheValue::I16(_) => TypeTag::I16,
            CacheValue::U32(_) => TypeTag::U32,
            CacheValue::I32(_) => TypeTag::I32,
            CacheValue::U64(_) => TypeTag::U64,
            CacheValue::I64(_) => TypeTag::I64,
            CacheValue::F32(_) => TypeTag::F32,
            CacheValue::F64(_) => TypeTag::F64,
            CacheValue::Decimal(_) => TypeTag::Decimal,
            CacheValue::Blob(_) => TypeTag::Blob,
        }
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Text(s) => write!(f, "{}", s),
            CacheValue::U8(v) => write!(f, "{}", v),
            CacheValue::I8(v) => write!(f, "{}", v),
            CacheValue::Bool(v) => write!(f, "{}", v),
            CacheValue::U16(v) => write!(f, "{}", v),
            CacheValue::I16(v) => write!(f, "{}", v),
            CacheValue::U32(v) => write!(f, "{}", v),
            CacheValue::I32(v) => write!(f, "{}", v),
            CacheValue::U64(v) => write!(f, "{}", v),
            CacheValue::I64(v) => write!(f, "{}", v),
            CacheValue::F32(v) => write!(f, "{}", v),
            CacheValue::F64(v) => write!(f, "{}", v),
            CacheValue::Decimal(v) => write!(f, "{}", v),
            CacheValue::Blob(b) => {
                for byte in b.iter().take(16) {
                    write!(f, "{:02x}", byte)?;
                }
                if b.len() > 16 {
                    write!(f, "… ({} bytes)", b.len())?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(12345, 2).unwrap().to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3).unwrap().to_string(), "-0.005");
        assert_eq!(Decimal::new(42, 0).unwrap().to_string(), "42");
    }

    #[test]
    fn test_decimal_limits() {
        assert!(Decimal::new(1, 29).is_none());
        assert!(Decimal::new(1i128 << 96, 0).is_none());
        assert!(Decimal::new((1i128 << 96) - 1, 28).is_some());
    }

    #[test]
    fn test_decimal_byte_layout() {
        let d = Decimal::new(-0x0102_0304_0506_0708_090A_0B0C, 4).unwrap();
        let bytes = d.to_bytes();
        assert_eq!(&bytes[0..4], &[0x0C, 0x0B, 0x0A, 0x09]);
        assert_eq!(&bytes[12..16], &[0x00, 0x00, 0x04, 0x80]);
        assert_eq!(Decimal::from_bytes(bytes), Some(d));
    }

    #[test]
    fn test_decimal_rejects_reserved_flag_bits() {
        let mut bytes = Decimal::new(1, 0).unwrap().to_bytes();
        bytes[12] = 1;
        assert!(Decimal::from_bytes(bytes).is_none());
    }

    #[test]
    fn test_tag_numbering_is_stable() {
        for b in 0..=13u8 {
            assert_eq!(TypeTag::from_byte(b).unwrap() as u8, b);
        }
        assert!(TypeTag::from_byte(14).is_none());
    }
}
