//! SM protocol constants.

use nx_sf::ServiceName;

/// SM named port.
pub const SM_PORT_NAME: ServiceName = ServiceName::new_truncate("sm:");

/// Register client (sends PID).
pub const REGISTER_CLIENT: u32 = 0;

/// Get service handle by name.
pub const GET_SERVICE_HANDLE: u32 = 1;
