//! Horizon OS firmware version.
//!
//! Some service commands only exist from a given firmware onwards; callers
//! that pick between command variants compare against a [`HosVersion`].

/// Atmosphere flag bit position (bit 31)
const ATMOSPHERE_BIT: u32 = 1 << 31;

/// Represents a Horizon OS version (major.minor.patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HosVersion(u32);

impl HosVersion {
    /// Creates a new HosVersion from major, minor, and patch components.
    #[inline]
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self(((major as u32) << 16) | ((minor as u32) << 8) | (patch as u32))
    }

    /// Creates a HosVersion from a raw packed value.
    ///
    /// The Atmosphere flag (bit 31) is stripped.
    #[inline]
    pub const fn from_u32(raw: u32) -> Self {
        Self(raw & !ATMOSPHERE_BIT)
    }

    /// Returns the raw packed version value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the major version component.
    #[inline]
    pub const fn major(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// Returns the minor version component.
    #[inline]
    pub const fn minor(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Returns the patch version component.
    #[inline]
    pub const fn patch(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl core::fmt::Display for HosVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_order_by_component() {
        assert!(HosVersion::new(3, 0, 0) > HosVersion::new(2, 3, 0));
        assert!(HosVersion::new(3, 0, 1) > HosVersion::new(3, 0, 0));
        assert_eq!(HosVersion::default(), HosVersion::new(0, 0, 0));
    }

    #[test]
    fn strips_atmosphere_flag() {
        let v = HosVersion::from_u32(ATMOSPHERE_BIT | 0x0A_00_02);
        assert_eq!(v, HosVersion::new(10, 0, 2));
        assert_eq!(format!("{v}"), "10.0.2");
    }
}
