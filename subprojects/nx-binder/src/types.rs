//! Binder identifier and reference types.

/// Binder object ID, the session-scoped identifier of a remote binder object
/// (e.g. an `IGraphicBufferProducer`) on the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct BinderObjectId(i32);

impl BinderObjectId {
    /// Creates a new BinderObjectId from a raw value.
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw i32 value for IPC calls.
    #[inline]
    pub const fn to_raw(self) -> i32 {
        self.0
    }
}

impl From<BinderObjectId> for i32 {
    #[inline]
    fn from(id: BinderObjectId) -> Self {
        id.0
    }
}

/// Kind of reference adjusted by `AdjustRefcount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RefKind {
    /// Weak reference.
    Weak = 0,
    /// Strong reference.
    Strong = 1,
}

impl RefKind {
    /// Returns the wire value.
    #[inline]
    pub const fn to_raw(self) -> i32 {
        self as i32
    }
}
