//! Service name type for Horizon OS services.
//!
//! Service names in Horizon OS are up to 8 ASCII characters, with remaining
//! bytes set to zero. The whole name fits in a single `u64`, which is the
//! lookup key the name service expects in its request arguments.

use static_assertions::const_assert_eq;

/// Fixed-capacity ASCII string for service names (max 8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct ServiceName {
    name: [u8; 8],
}

const_assert_eq!(size_of::<ServiceName>(), size_of::<u64>());

impl ServiceName {
    /// Maximum length of a service name (8 characters).
    pub const MAX_LEN: usize = 8;

    /// Creates a service name from a string slice.
    ///
    /// Returns `None` if the name exceeds 8 characters, contains a NUL or a
    /// non-ASCII byte.
    #[inline]
    pub const fn new(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > Self::MAX_LEN {
            return None;
        }

        let mut result = [0u8; 8];
        let mut c = 0;
        while c < bytes.len() {
            if !bytes[c].is_ascii() || bytes[c] == 0 {
                return None;
            }
            result[c] = bytes[c];
            c += 1;
        }
        Some(Self { name: result })
    }

    /// Creates a service name from a string slice, truncating if needed.
    ///
    /// # Panics
    ///
    /// Panics if the kept part contains non-ASCII characters. Meant for
    /// compile-time constants.
    #[inline]
    pub const fn new_truncate(name: &str) -> Self {
        let bytes = name.as_bytes();
        let len = if bytes.len() > Self::MAX_LEN {
            Self::MAX_LEN
        } else {
            bytes.len()
        };

        let mut result = [0u8; 8];
        let mut c = 0;
        while c < len {
            assert!(bytes[c].is_ascii(), "service name must be ASCII");
            result[c] = bytes[c];
            c += 1;
        }

        Self { name: result }
    }

    /// Packs the name little-endian into the lookup key.
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        u64::from_le_bytes(self.name)
    }

    /// Returns the full 8-byte buffer including zero padding.
    #[inline]
    pub const fn as_bytes_raw(&self) -> &[u8; 8] {
        &self.name
    }

    /// Returns the length of the service name (excluding trailing zeros).
    pub const fn len(&self) -> usize {
        let mut i = 0;
        while i < Self::MAX_LEN {
            if self.name[i] == 0 {
                return i;
            }
            i += 1;
        }
        Self::MAX_LEN
    }

    /// Returns whether the service name is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    /// Returns the service name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        // Constructors only admit ASCII.
        core::str::from_utf8(&self.name[..self.len()]).unwrap_or_default()
    }
}

impl core::fmt::Display for ServiceName {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl PartialEq<&str> for ServiceName {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<u64> for ServiceName {
    #[inline]
    fn eq(&self, other: &u64) -> bool {
        self.to_u64() == *other
    }
}
