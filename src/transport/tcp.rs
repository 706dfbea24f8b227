use crate::config::{ClientConfig, CodecLimits};
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::transport::entity::TransportEntity;
use crate::transport::{write_request, Transport};
use std::io::{self, BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, instrument};

/// Blocking client transport: one connection per request.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    response_timeout: Duration,
    limits: CodecLimits,
}

impl TcpTransport {
    pub fn new(config: &ClientConfig, limits: CodecLimits) -> Self {
        Self {
            connect_timeout: config.connection_timeout,
            response_timeout: config.response_timeout,
            limits,
        }
    }

    fn connect(&self, address: &str) -> Result<TcpStream> {
        let mut last_error = None;
        for addr in address.to_socket_addrs().map_err(communication)? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => communication(e),
            None => ProtocolError::Communication(format!("no address resolved for {address}")),
        })
    }
}

impl Transport for TcpTransport {
    #[instrument(skip(self, entity), fields(address = %address, path = %path))]
    fn post(&self, address: &str, path: &str, entity: TransportEntity) -> Result<Vec<u8>> {
        let stream = self.connect(address)?;
        stream.set_nodelay(true).map_err(communication)?;
        stream
            .set_read_timeout(Some(self.response_timeout))
            .map_err(communication)?;
        stream
            .set_write_timeout(Some(self.response_timeout))
            .map_err(communication)?;

        let mut writer = BufWriter::new(&stream);
        write_request(&mut writer, path, entity, self.limits).map_err(lift_io)?;
        drop(writer);
        debug!("Request written, awaiting response");

        let mut reader = BufReader::new(&stream);
        let packet = Packet::read_from(&mut reader, self.limits).map_err(lift_io)?;
        Ok(packet.payload(self.limits)?.into_owned())
    }
}

fn communication(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProtocolError::Timeout,
        _ => ProtocolError::Communication(e.to_string()),
    }
}

/// Socket failures mid-call are communication errors; codec errors stay as
/// they are.
fn lift_io(e: ProtocolError) -> ProtocolError {
    match e {
        ProtocolError::Io(e) => communication(e),
        other => other,
    }
}
