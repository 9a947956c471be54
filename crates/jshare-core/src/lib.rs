//! Core shared types for jshare.
//!
//! This crate is intentionally small: it holds the primitives every pipeline
//! stage agrees on (version stamp, target layout checks, fingerprints, class
//! name and origin conventions).

mod fingerprint;
mod names;
mod origin;
mod size;

pub use fingerprint::Fingerprint;
pub use names::{binary_name, internal_name, is_generated_class};
pub use origin::{file_origin, is_shareable_origin, origin_path, BOOTSTRAP_ORIGIN};
pub use size::parse_size;

/// Version of the engine that produced an artifact.
///
/// Persisted archives embed this string and are rejected by a different
/// version.
pub const JSHARE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn to_u8(self) -> u8 {
        match self {
            Endian::Little => 0,
            Endian::Big => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Endian::Little),
            1 => Some(Endian::Big),
            _ => None,
        }
    }
}

#[inline]
pub const fn target_endian() -> Endian {
    if cfg!(target_endian = "little") {
        Endian::Little
    } else {
        Endian::Big
    }
}

/// Pointer width of the running target, in bytes.
#[inline]
pub const fn target_pointer_width() -> u8 {
    std::mem::size_of::<usize>() as u8
}

/// Rounds `size` up to the next multiple of 8.
#[inline]
pub const fn align8(size: u64) -> u64 {
    (size + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(13), 16);
    }

    #[test]
    fn endian_tag_round_trips() {
        let endian = target_endian();
        assert_eq!(Endian::from_u8(endian.to_u8()), Some(endian));
        assert_eq!(Endian::from_u8(7), None);
    }
}
