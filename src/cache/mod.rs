//! Persistent typed key/value cache.
//!
//! One cache file sits next to each build description (`<file>.cache`). It
//! holds dependency fingerprints and the parse snapshots used to skip
//! re-expansion. The layout is little-endian:
//!
//! ```text
//! magic "OMCF" | u32 version | u64 entry count
//! entry: u8 tag | payload | u32 name length | name bytes
//! payload: fixed width for scalars, u32 length + bytes for text/blob
//! ```
//!
//! [`TypedCache::set`] is an upsert. Fingerprints and snapshots are rewritten
//! on every build, so a same-type overwrite is logged at `debug`; an
//! overwrite that changes the entry's type is a `warn`.

mod value;

pub use value::{CacheValue, Decimal, TypeTag};

use crate::error::CacheError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MAGIC: [u8; 4] = *b"OMCF";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Clone)]
pub struct TypedCache {
    entries: BTreeMap<String, CacheValue>,
    duplicates: Vec<String>,
}

macro_rules! typed_accessors {
    ($($get:ident, $set:ident, $variant:ident, $ty:ty;)*) => {
        $(
            pub fn $get(&self, name: &str) -> Result<$ty, CacheError> {
                match self.entries.get(name) {
                    Some(CacheValue::$variant(v)) => Ok(v.clone()),
                    Some(other) => Err(CacheError::TypeMismatch {
                        name: name.to_string(),
                        expected: TypeTag::$variant.name(),
                        found: other.tag().name(),
                    }),
                    None => Err(CacheError::NotFound(name.to_string())),
                }
            }

            pub fn $set(&mut self, name: impl Into<String>, value: $ty) -> Option<CacheValue> {
                self.set(name, CacheValue::$variant(value))
            }
        )*
    };
}

impl TypedCache {
    pub fn new() -> Self {
        Self::default()
    }

    typed_accessors! {
        get_text, set_text, Text, String;
        get_u8, set_u8, U8, u8;
        get_i8, set_i8, I8, i8;
        get_bool, set_bool, Bool, bool;
        get_u16, set_u16, U16, u16;
        get_i16, set_i16, I16, i16;
        get_u32, set_u32, U32, u32;
        get_i32, set_i32, I32, i32;
        get_u64, set_u64, U64, u64;
        get_i64, set_i64, I64, i64;
        get_f32, set_f32, F32, f32;
        get_f64, set_f64, F64, f64;
        get_decimal, set_decimal, Decimal, Decimal;
        get_blob, set_blob, Blob, Vec<u8>;
    }

    /// Upsert. Returns the value that was replaced, if any.
    pub fn set(&mut self, name: impl Into<String>, value: CacheValue) -> Option<CacheValue> {
        let name = name.into();
        let tag = value.tag();
        let previous = self.entries.insert(name.clone(), value);
        match &previous {
            Some(prev) if prev.tag() != tag => tracing::warn!(
                entry = %name,
                from = prev.tag().name(),
                to = tag.name(),
                "cache entry changed type"
            ),
            Some(_) => tracing::debug!(entry = %name, "cache entry overwritten"),
            None => {}
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&CacheValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<CacheValue> {
        self.entries.remove(name)
    }

    /// Drops every entry whose name starts with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names that occurred more than once in the loaded file (last one wins).
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// Loads `path`; a missing file yields an empty cache.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes).map_err(|e| match e {
            CacheError::BadMagic(_) => CacheError::BadMagic(path.to_path_buf()),
            other => other,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        let mut rdr = Reader { buf: bytes, pos: 0 };
        if bytes.len() < 4 || bytes[0..4] != MAGIC {
            return Err(CacheError::BadMagic(Default::default()));
        }
        rdr.pos = 4;
        let version = rdr.u32()?;
        if version > FORMAT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let count = rdr.u64()?;

        let mut cache = Self::new();
        for _ in 0..count {
            let tag_byte = rdr.array::<1>()?[0];
            let tag = TypeTag::from_byte(tag_byte)
                .ok_or_else(|| CacheError::Corrupt(format!("unknown type tag {}", tag_byte)))?;
            let value = rdr.value(tag)?;
            let name_len = rdr.u32()? as usize;
            let name = String::from_utf8(rdr.take(name_len)?.to_vec())
                .map_err(|_| CacheError::Corrupt("entry name is not UTF-8".into()))?;
            if cache.entries.insert(name.clone(), value).is_some() {
                cache.duplicates.push(name);
            }
        }
        Ok(cache)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.entries.len() * 32);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());
        for (name, value) in &self.entries {
            out.push(value.tag() as u8);
            write_value(&mut out, value);
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        out
    }
}

fn write_value(out: &mut Vec<u8>, value: &CacheValue) {
    match value {
        CacheValue::Text(s) => {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        CacheValue::Blob(b) => {
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
        CacheValue::U8(v) => out.push(*v),
        CacheValue::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::Bool(v) => out.push(if *v { 127 } else { 0 }),
        CacheValue::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        CacheValue::Decimal(d) => out.extend_from_slice(&d.to_bytes()),
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CacheError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                CacheError::Corrupt(format!("unexpected end of file at byte {}", self.pos))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CacheError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, CacheError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CacheError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn value(&mut self, tag: TypeTag) -> Result<CacheValue, CacheError> {
        Ok(match tag {
            TypeTag::Text => {
                let len = self.u32()? as usize;
                let text = String::from_utf8(self.take(len)?.to_vec())
                    .map_err(|_| CacheError::Corrupt("text entry is not UTF-8".into()))?;
                CacheValue::Text(text)
            }
            TypeTag::Blob => {
                let len = self.u32()? as usize;
                CacheValue::Blob(self.take(len)?.to_vec())
            }
            TypeTag::U8 => CacheValue::U8(self.array::<1>()?[0]),
            TypeTag::I8 => CacheValue::I8(i8::from_le_bytes(self.array()?)),
            TypeTag::Bool => CacheValue::Bool(self.array::<1>()?[0] != 0),
            TypeTag::U16 => CacheValue::U16(u16::from_le_bytes(self.array()?)),
            TypeTag::I16 => CacheValue::I16(i16::from_le_bytes(self.array()?)),
            TypeTag::U32 => CacheValue::U32(self.u32()?),
            TypeTag::I32 => CacheValue::I32(i32::from_le_bytes(self.array()?)),
            TypeTag::U64 => CacheValue::U64(self.u64()?),
            TypeTag::I64 => CacheValue::I64(i64::from_le_bytes(self.array()?)),
            TypeTag::F32 => CacheValue::F32(f32::from_le_bytes(self.array()?)),
            TypeTag::F64 => CacheValue::F64(f64::from_le_bytes(self.array()?)),
            TypeTag::Decimal => {
                let raw = self.array::<16>()?;
                CacheValue::Decimal(
                    Decimal::from_bytes(raw)
                        .ok_or_else(|| CacheError::Corrupt("invalid decimal payload".into()))?,
                )
            }
        })
    }
}
