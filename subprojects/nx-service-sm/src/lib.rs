//! Service Manager Protocol Implementation.
//!
//! This crate provides stateless SM protocol operations over CMIF. All
//! operations are methods on [`SmService`], which wraps an SM session handle;
//! the transport is passed to every call.

#![cfg_attr(not(test), no_std)]

pub use nx_sf::ServiceName;
use nx_sf::{
    service::{CloseError, ControlError, Service},
    transport::Transport,
};
use nx_svc::{
    error::ToRawResultCode,
    ipc::{CloseHandleError, Handle as SessionHandle},
    result::ResultCode,
};

mod cmif;
mod proto;

pub use self::{
    cmif::{GetServiceError, RegisterClientError, get_service_handle, register_client},
    proto::SM_PORT_NAME,
};

/// Service Manager session wrapper.
///
/// Provides type safety to distinguish SM sessions from regular services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SmService(Service);

impl SmService {
    /// Wraps an open SM session.
    #[inline]
    pub const fn new(service: Service) -> Self {
        Self(service)
    }

    /// Returns the underlying session handle.
    #[inline]
    pub fn session(&self) -> SessionHandle {
        self.0.session
    }

    /// Consumes and closes the SM session.
    #[inline]
    pub fn close<T: Transport + ?Sized>(self, transport: &T) -> Result<(), CloseError> {
        self.0.close(transport)
    }

    /// Registers the calling process with SM.
    #[inline]
    pub fn register_client<T: Transport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<(), RegisterClientError> {
        cmif::register_client(transport, self.0.session)
    }

    /// Gets a service session handle by name.
    #[inline]
    pub fn get_service_handle<T: Transport + ?Sized>(
        &self,
        transport: &T,
        name: ServiceName,
    ) -> Result<SessionHandle, GetServiceError> {
        cmif::get_service_handle(transport, self.0.session, name)
    }

    /// Looks up a service and wraps the new session, probing its pointer
    /// buffer size.
    pub fn get_service<T: Transport + ?Sized>(
        &self,
        transport: &T,
        name: ServiceName,
    ) -> Result<Service, OpenServiceError> {
        let session = self
            .get_service_handle(transport, name)
            .map_err(OpenServiceError::GetHandle)?;

        Service::new(transport, session).map_err(|probe| {
            // The session is useless without its pointer buffer size.
            match transport.close_handle(session.to_raw()) {
                Ok(()) => OpenServiceError::Probe(probe),
                Err(close) => OpenServiceError::ProbeAndClose { probe, close },
            }
        })
    }
}

/// Error returned by [`SmService::get_service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OpenServiceError {
    /// The name lookup failed.
    #[error("failed to get service handle")]
    GetHandle(#[source] GetServiceError),
    /// The pointer buffer size probe failed.
    #[error("failed to query pointer buffer size")]
    Probe(#[source] ControlError),
    /// The probe failed and the new session handle could not be closed.
    #[error("failed to query pointer buffer size, then to close the session ({close})")]
    ProbeAndClose {
        #[source]
        probe: ControlError,
        close: CloseHandleError,
    },
}

impl ToRawResultCode for OpenServiceError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::GetHandle(err) => err.to_rc(),
            Self::Probe(probe) | Self::ProbeAndClose { probe, .. } => probe.to_rc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use nx_sf::{
        cmif::{self as sf_cmif, ReplySpec},
        hipc::MessageBuffer,
        mock::MockTransport,
        service as sf_service,
    };
    use nx_svc::{ipc::SendSyncError, result::Error};

    use super::*;

    fn sm() -> SmService {
        // SAFETY: test-only value, only ever handed to the mock.
        SmService::new(Service::from_parts(unsafe { SessionHandle::from_raw(1) }, 0))
    }

    fn sm_server(
        _: SessionHandle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError> {
        let request = sf_cmif::parse_request(msg).unwrap();
        match request.command_id {
            Some(proto::REGISTER_CLIENT) => {
                assert!(request.hipc.meta.send_pid);
                assert_eq!(&request.args[..8], &[0u8; 8]);
                sf_cmif::make_response(msg, &ReplySpec::default()).unwrap();
            }
            Some(proto::GET_SERVICE_HANDLE) => {
                let mut key = [0u8; 8];
                key.copy_from_slice(&request.args[..8]);
                let name = u64::from_le_bytes(key);
                if name == ServiceName::new("dispdrv").unwrap().to_u64() {
                    sf_cmif::make_response(
                        msg,
                        &ReplySpec {
                            move_handles: &[0x42],
                            ..Default::default()
                        },
                    )
                    .unwrap();
                } else {
                    sf_cmif::make_response(
                        msg,
                        &ReplySpec {
                            result: 0xE15,
                            ..Default::default()
                        },
                    )
                    .unwrap();
                }
            }
            Some(sf_service::CTRL_QUERY_POINTER_BUFFER_SIZE) => {
                sf_cmif::make_response(
                    msg,
                    &ReplySpec {
                        data: &0x500u16.to_le_bytes(),
                        ..Default::default()
                    },
                )
                .unwrap();
            }
            other => panic!("unexpected command {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn register_client_sends_pid() {
        let transport = MockTransport::new(sm_server);
        sm().register_client(&transport).unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn get_service_handle_returns_move_handle() {
        let transport = MockTransport::new(sm_server);
        let handle = sm()
            .get_service_handle(&transport, ServiceName::new("dispdrv").unwrap())
            .unwrap();
        assert_eq!(handle, 0x42);
    }

    #[test]
    fn unknown_service_reports_remote_status() {
        let transport = MockTransport::new(sm_server);
        let err = sm()
            .get_service_handle(&transport, ServiceName::new("nope").unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            GetServiceError::ParseResponse(sf_cmif::ParseResponseError::ServiceError(e))
                if e.to_raw() == 0xE15
        ));
    }

    #[test]
    fn get_service_probes_pointer_buffer() {
        let transport = MockTransport::new(sm_server);
        let service = sm()
            .get_service(&transport, ServiceName::new("dispdrv").unwrap())
            .unwrap();
        assert_eq!(service.session, 0x42);
        assert_eq!(service.pointer_buffer_size, 0x500);
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn failed_probe_closes_the_new_session() {
        let mut first = true;
        let transport = MockTransport::new(|session, msg: &mut MessageBuffer| {
            if !first {
                return Err(SendSyncError::SessionClosed);
            }
            first = false;
            sm_server(session, msg)
        });

        let err = sm()
            .get_service(&transport, ServiceName::new("dispdrv").unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            OpenServiceError::Probe(ControlError::SendRequest(SendSyncError::SessionClosed))
        );
        assert_eq!(err.to_rc(), SendSyncError::SessionClosed.to_rc());
        assert_eq!(transport.closed_handles().as_slice(), &[0x42]);
    }

    #[test]
    fn failed_close_after_failed_probe_is_reported() {
        let mut first = true;
        let transport = MockTransport::new(|session, msg: &mut MessageBuffer| {
            if !first {
                return Err(SendSyncError::SessionClosed);
            }
            first = false;
            sm_server(session, msg)
        });
        let close = CloseHandleError::Unknown(Error::from_raw(0xE401).unwrap());
        transport.fail_next_close(close);

        let err = sm()
            .get_service(&transport, ServiceName::new("dispdrv").unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            OpenServiceError::ProbeAndClose {
                probe: ControlError::SendRequest(SendSyncError::SessionClosed),
                close,
            }
        );
        // The probe failure stays the primary status.
        assert_eq!(err.to_rc(), SendSyncError::SessionClosed.to_rc());
        assert!(transport.closed_handles().is_empty());
    }

    #[test]
    fn lookup_failure_lowers_to_remote_status() {
        let transport = MockTransport::new(sm_server);
        let err = sm()
            .get_service(&transport, ServiceName::new("nope").unwrap())
            .unwrap_err();
        assert!(matches!(err, OpenServiceError::GetHandle(_)));
        assert_eq!(err.to_rc(), 0xE15);
    }

    #[test]
    fn missing_handle_is_reported() {
        let transport = MockTransport::new(|_, msg: &mut MessageBuffer| {
            sf_cmif::make_response(msg, &ReplySpec::default()).unwrap();
            Ok(())
        });
        let err = sm()
            .get_service_handle(&transport, ServiceName::new("dispdrv").unwrap())
            .unwrap_err();
        assert_eq!(err, GetServiceError::MissingHandle);
    }
}
