//! Read and write strategy settings.
//!
//! Settings select *how* bytes move, never *which* bytes: a backend may use
//! them to size buffers, pick a read strategy, or decide when to sync, but
//! the content returned by a read or committed by a write is identical for
//! every combination.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Default buffer size for reads and writes (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Read strategy hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMethod {
    /// Buffered sequential `read` calls.
    #[default]
    Read,
    /// Memory-map the object when the backend can.
    Mmap,
}

impl fmt::Display for ReadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Mmap => write!(f, "mmap"),
        }
    }
}

impl FromStr for ReadMethod {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "mmap" => Ok(Self::Mmap),
            _ => Err(TypeError::UnknownReadMethod(s.to_string())),
        }
    }
}

/// Settings for opening a read stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSettings {
    /// Upper bound for the read buffer.
    pub buffer_size: usize,
    /// Preferred read strategy.
    pub method: ReadMethod,
    /// Fill the first buffer while opening the stream.
    pub prefetch: bool,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            method: ReadMethod::default(),
            prefetch: false,
        }
    }
}

impl ReadSettings {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_method(mut self, method: ReadMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Buffer size to allocate for a read, given the caller's hints.
    ///
    /// The buffer never exceeds `buffer_size`, shrinks to the expected read
    /// length or the known object size when either is smaller, and is
    /// always at least one byte.
    pub fn buffer_size_for(&self, read_hint: Option<usize>, file_size: Option<usize>) -> usize {
        let mut size = self.buffer_size;
        if let Some(hint) = read_hint {
            size = size.min(hint);
        }
        if let Some(file_size) = file_size {
            size = size.min(file_size);
        }
        size.max(1)
    }
}

/// Durability requested for a committed write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Hand the bytes to the backend and return (OS page cache for files).
    #[default]
    Buffered,
    /// Force the bytes to stable storage before the commit returns.
    Fsync,
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered => write!(f, "buffered"),
            Self::Fsync => write!(f, "fsync"),
        }
    }
}

impl FromStr for Durability {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buffered" => Ok(Self::Buffered),
            "fsync" => Ok(Self::Fsync),
            _ => Err(TypeError::UnknownDurability(s.to_string())),
        }
    }
}

/// Settings for opening a write stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSettings {
    pub durability: Durability,
}

impl WriteSettings {
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_defaults() {
        let s = ReadSettings::default();
        assert_eq!(s.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(s.method, ReadMethod::Read);
        assert!(!s.prefetch);
    }

    #[test]
    fn buffer_size_shrinks_to_hints() {
        let s = ReadSettings::default().with_buffer_size(4096);
        assert_eq!(s.buffer_size_for(None, None), 4096);
        assert_eq!(s.buffer_size_for(Some(100), None), 100);
        assert_eq!(s.buffer_size_for(None, Some(10)), 10);
        assert_eq!(s.buffer_size_for(Some(100_000), Some(100_000)), 4096);
    }

    #[test]
    fn buffer_size_never_zero() {
        let s = ReadSettings::default();
        assert_eq!(s.buffer_size_for(Some(0), Some(0)), 1);
        assert_eq!(s.with_buffer_size(0).buffer_size_for(None, None), 1);
    }

    #[test]
    fn parse_enums() {
        assert_eq!("MMAP".parse::<ReadMethod>().unwrap(), ReadMethod::Mmap);
        assert_eq!("fsync".parse::<Durability>().unwrap(), Durability::Fsync);
        assert!("direct".parse::<ReadMethod>().is_err());
        assert!("never".parse::<Durability>().is_err());
    }

    #[test]
    fn write_settings_builder() {
        let s = WriteSettings::default().with_durability(Durability::Fsync);
        assert_eq!(s.durability, Durability::Fsync);
        assert_eq!(WriteSettings::default().durability, Durability::Buffered);
    }
}
