//! Binder session configuration.

use nx_svc::version::HosVersion;

/// First firmware version with `TransactParcelAuto`.
pub const COMBINED_TRANSACT_MIN_VERSION: HosVersion = HosVersion::new(3, 0, 0);

/// Settings applied when a [`Binder`](crate::Binder) is initialized.
///
/// The default targets firmware 0.0.0, which only has the legacy transact
/// command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinderConfig {
    /// Firmware version of the running system.
    pub hos_version: HosVersion,
    /// Largest request + reply size carried in static buffers under combined
    /// mode. `None` uses the relay's pointer buffer size.
    pub static_threshold: Option<usize>,
    /// Use the legacy transact command even when combined mode is available.
    pub force_legacy: bool,
}

impl BinderConfig {
    /// Creates a configuration for the given firmware version.
    pub const fn new(hos_version: HosVersion) -> Self {
        Self {
            hos_version,
            static_threshold: None,
            force_legacy: false,
        }
    }

    /// Overrides the static carriage threshold.
    pub const fn with_static_threshold(mut self, threshold: usize) -> Self {
        self.static_threshold = Some(threshold);
        self
    }

    /// Forces the legacy transact command.
    pub const fn with_force_legacy(mut self, force_legacy: bool) -> Self {
        self.force_legacy = force_legacy;
        self
    }

    /// Whether `TransactParcelAuto` should be used.
    #[inline]
    pub fn supports_combined(&self) -> bool {
        !self.force_legacy && self.hos_version >= COMBINED_TRANSACT_MIN_VERSION
    }
}
