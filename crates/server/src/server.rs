//! Loopback TCP listener and per-connection request loops.

use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::log::bridge_log;
use ntbridge_core::TradingPlatform;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Bound on waiting for the accept loop during shutdown.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Pause after an accept failure that is not tied to a single connection.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Entry point for starting the bridge listener.
pub struct BridgeServer;

impl BridgeServer {
    /// Bind the listener and start accepting clients in the background.
    ///
    /// Each connection runs on its own task and shares the dispatcher's
    /// session. A request is whatever one read returns, trimmed; requests
    /// are never reassembled across reads.
    pub async fn bind<P: TradingPlatform>(
        config: &BridgeConfig,
        dispatcher: Dispatcher<P>,
    ) -> Result<ServerHandle, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;

        let session = dispatcher.session();
        session.heartbeat().reset(Instant::now());
        bridge_log!(session.log(), Info, "Listening on {}", local_addr);

        let running = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(Notify::new());
        let accept_task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            Arc::clone(&running),
            Arc::clone(&stop),
            config.read_buffer_size,
        ));

        Ok(ServerHandle {
            local_addr,
            running,
            stop,
            accept_task: Some(accept_task),
        })
    }
}

/// Control handle of a running listener.
pub struct ServerHandle {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    accept_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting and close the listener. Open connections are not
    /// cancelled; they end at their next read once the flag is seen or the
    /// peer goes away.
    pub async fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_one();

        if let Some(task) = self.accept_task.take() {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task).await.is_err() {
                tracing::warn!(target: "ntbridge", "Accept loop did not stop within {:?}", SHUTDOWN_JOIN_TIMEOUT);
            }
        }
    }
}

async fn accept_loop<P: TradingPlatform>(
    listener: TcpListener,
    dispatcher: Dispatcher<P>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    buffer_size: usize,
) {
    let session = Arc::clone(dispatcher.session());

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = stop.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    bridge_log!(session.log(), Debug, "Client connected: {}", peer);
                    tokio::spawn(handle_client(
                        stream,
                        dispatcher.clone(),
                        Arc::clone(&running),
                        buffer_size,
                    ));
                }
                Err(e) => {
                    let pause = accept_backoff(&e);
                    if pause.is_zero() {
                        bridge_log!(session.log(), Error, "Error accepting client: {}", e);
                        continue;
                    }
                    bridge_log!(
                        session.log(),
                        Error,
                        "Error accepting client: {}; pausing accepts for {:?}",
                        e,
                        pause
                    );
                    tokio::select! {
                        _ = stop.notified() => break,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }
    }

    bridge_log!(session.log(), Info, "Listener stopped");
}

/// Errors that only concern the connection being accepted are retried at
/// once. Anything else, such as descriptor exhaustion, gets a pause.
fn accept_backoff(error: &io::Error) -> Duration {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => Duration::ZERO,
        _ => ACCEPT_ERROR_BACKOFF,
    }
}

async fn handle_client<P: TradingPlatform>(
    mut stream: TcpStream,
    dispatcher: Dispatcher<P>,
    running: Arc<AtomicBool>,
    buffer_size: usize,
) {
    let session = Arc::clone(dispatcher.session());
    if let Err(e) = serve_connection(&mut stream, &dispatcher, &running, buffer_size).await {
        bridge_log!(session.log(), Error, "Error handling client: {}", e);
    }
    bridge_log!(session.log(), Debug, "Client disconnected");
}

async fn serve_connection<P: TradingPlatform>(
    stream: &mut TcpStream,
    dispatcher: &Dispatcher<P>,
    running: &AtomicBool,
    buffer_size: usize,
) -> std::io::Result<()> {
    let log = dispatcher.session().log();
    let mut buffer = vec![0u8; buffer_size];

    while running.load(Ordering::SeqCst) {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            break;
        }

        let request = String::from_utf8_lossy(&buffer[..n]).trim().to_string();
        bridge_log!(log, Trace, "<< {}", request);

        let mut response = dispatcher.dispatch(&request).await;
        bridge_log!(log, Trace, ">> {}", response);

        response.push('\n');
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_connection_accept_errors_retry_immediately() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert_eq!(accept_backoff(&io::Error::from(kind)), Duration::ZERO);
        }
    }

    #[test]
    fn test_resource_exhaustion_backs_off() {
        // EMFILE on Linux
        let exhausted = io::Error::from_raw_os_error(24);
        assert_eq!(accept_backoff(&exhausted), ACCEPT_ERROR_BACKOFF);
        assert_eq!(
            accept_backoff(&io::Error::from(io::ErrorKind::OutOfMemory)),
            ACCEPT_ERROR_BACKOFF
        );
    }
}
