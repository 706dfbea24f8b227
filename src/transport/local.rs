use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::service::endpoint::Endpoint;
use crate::transport::entity::TransportEntity;
use crate::transport::{write_request, Transport};
use std::sync::Arc;
use tracing::trace;

/// In-process transport.
///
/// Requests still go through framing, compression and the codec on both
/// sides, so everything but the socket is exercised. The address is ignored.
#[derive(Clone)]
pub struct LoopbackTransport {
    endpoint: Arc<Endpoint>,
}

impl LoopbackTransport {
    pub fn new(endpoint: Arc<Endpoint>) -> Self {
        Self { endpoint }
    }
}

impl Transport for LoopbackTransport {
    fn post(&self, address: &str, path: &str, entity: TransportEntity) -> Result<Vec<u8>> {
        let limits = self.endpoint.limits();
        let mut wire = Vec::new();
        write_request(&mut wire, path, entity, limits)?;
        trace!(address, bytes = wire.len(), "Loopback request");

        let (request, _) = Packet::parse(&wire, limits)?.ok_or(ProtocolError::InvalidHeader)?;
        let response = self.endpoint.handle_packet(request).to_bytes()?;

        let (response, _) =
            Packet::parse(&response, limits)?.ok_or(ProtocolError::InvalidHeader)?;
        Ok(response.payload(limits)?.into_owned())
    }
}
