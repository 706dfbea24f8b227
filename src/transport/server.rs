use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::codec::PacketCodec;
use crate::error::Result;
use crate::service::endpoint::Endpoint;
use crate::utils::metrics::global_metrics;

/// Async TCP server in front of an [`Endpoint`].
///
/// Sockets are driven by tokio; each decoded request runs on the blocking
/// pool because handlers are synchronous.
pub struct Server {
    listener: TcpListener,
    endpoint: Arc<Endpoint>,
    max_connections: usize,
    shutdown_timeout: Duration,
}

impl Server {
    #[instrument(skip(config, endpoint), fields(address = %config.address))]
    pub async fn bind(config: &ServerConfig, endpoint: Arc<Endpoint>) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!(address = %listener.local_addr()?, "Listening");
        Ok(Self {
            listener,
            endpoint,
            max_connections: config.max_connections,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until CTRL+C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until a message arrives on `shutdown_rx`, then wait up to the
    /// shutdown timeout for open connections to finish.
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let active_connections = Arc::new(Mutex::new(0usize));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");

                    let timeout = tokio::time::sleep(self.shutdown_timeout);
                    tokio::pin!(timeout);

                    loop {
                        tokio::select! {
                            _ = &mut timeout => {
                                warn!("Shutdown timeout reached, forcing exit");
                                break;
                            }
                            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                                let connections = *active_connections.lock().await;
                                if connections == 0 {
                                    info!("All connections closed, shutting down");
                                    break;
                                }
                                debug!(connections, "Waiting for connections to close");
                            }
                        }
                    }

                    global_metrics().log_metrics();
                    return Ok(());
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            {
                                let mut count = active_connections.lock().await;
                                if *count >= self.max_connections {
                                    warn!(
                                        peer = %peer,
                                        limit = self.max_connections,
                                        "Connection limit reached, refusing"
                                    );
                                    continue;
                                }
                                *count += 1;
                            }

                            let endpoint = self.endpoint.clone();
                            let active_connections = active_connections.clone();
                            tokio::spawn(async move {
                                serve_connection(stream, peer, endpoint).await;
                                let mut count = active_connections.lock().await;
                                *count -= 1;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, endpoint: Arc<Endpoint>) {
    debug!(peer = %peer, "Connection established");
    let mut framed = Framed::new(stream, PacketCodec::new(endpoint.limits()));

    while let Some(frame) = framed.next().await {
        let response = match frame {
            Ok(packet) => {
                debug!(peer = %peer, bytes = packet.body.len(), "Request received");
                let endpoint = endpoint.clone();
                match tokio::task::spawn_blocking(move || endpoint.handle_packet(packet)).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(peer = %peer, error = %e, "Request task failed");
                        break;
                    }
                }
            }
            Err(e) => {
                // The stream position is unknown after a bad frame; answer and close
                warn!(peer = %peer, error = %e, "Bad request frame");
                let _ = framed.send(endpoint.error_packet(&e)).await;
                break;
            }
        };

        if let Err(e) = framed.send(response).await {
            warn!(peer = %peer, error = %e, "Failed to send response");
            break;
        }
    }

    debug!(peer = %peer, "Connection closed");
}
