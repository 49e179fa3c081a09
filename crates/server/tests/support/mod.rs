#![allow(dead_code)]

use ntbridge_server::{BridgeConfig, BridgeServer, Dispatcher, ServerHandle, Session};
use ntbridge_sim::SimulatedPlatform;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// A bridge on an ephemeral loopback port backed by the simulator.
pub struct TestBridge {
    pub handle: ServerHandle,
    pub platform: Arc<SimulatedPlatform>,
    pub session: Arc<Session<SimulatedPlatform>>,
}

impl TestBridge {
    pub async fn start() -> Self {
        Self::start_with(SimulatedPlatform::default(), BridgeConfig::default()).await
    }

    pub async fn start_with(platform: SimulatedPlatform, config: BridgeConfig) -> Self {
        let config = BridgeConfig { port: 0, ..config };
        let platform = Arc::new(platform);
        let session = Arc::new(Session::new(config.log_level, config.heartbeat_interval()));
        let dispatcher = Dispatcher::new(Arc::clone(&platform), Arc::clone(&session), &config);
        let handle = BridgeServer::bind(&config, dispatcher)
            .await
            .expect("bridge binds");
        Self {
            handle,
            platform,
            session,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr()).await
    }
}

/// One client connection speaking the line protocol.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("client connects");
        stream.set_nodelay(true).expect("nodelay");
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    /// Send one request and return the response line without its newline.
    pub async fn send(&mut self, request: &str) -> String {
        self.writer
            .write_all(request.as_bytes())
            .await
            .expect("request written");
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.expect("response read");
        assert!(n > 0, "bridge closed the connection on {request:?}");
        assert!(line.ends_with('\n'), "response not newline terminated: {line:?}");
        line.trim_end_matches('\n').to_string()
    }
}
