//! Minimal STOMP 1.2 client.
//!
//! Implements exactly the subset of the protocol the harness needs: the
//! CONNECT/CONNECTED handshake with credentials, SEND with a JSON body,
//! SUBSCRIBE plus MESSAGE delivery for the subscriber worker, and
//! DISCONNECT. Header value escaping and transactions are out of scope;
//! heart-beating is negotiated off.

use super::{topic_destination, ConnectionFactory, Envelope, FabricConfig, FabricConnection};
use super::FabricError;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

/// One parsed STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Look up the first header with the given name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire form: command line, header lines, blank line, body,
    /// NUL terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.push(b':');
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

/// Read one frame from the stream.
///
/// Leading empty lines (server heart-beats or frame separators) are skipped.
/// The body is read up to the NUL terminator; a `content-length` header, when
/// present, is trusted only as a sanity bound.
pub async fn read_frame<R>(reader: &mut R) -> Result<StompFrame, FabricError>
where
    R: AsyncBufReadExt + Unpin,
{
    // Command line
    let mut command = String::new();
    loop {
        command.clear();
        let n = reader.read_line(&mut command).await?;
        if n == 0 {
            return Err(FabricError::Protocol("connection closed".to_string()));
        }
        if !command.trim().is_empty() {
            break;
        }
    }
    let command = command.trim().to_string();

    // Headers until the blank separator line
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(FabricError::Protocol(
                "connection closed mid-headers".to_string(),
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) => headers.push((name.to_string(), value.to_string())),
            None => {
                return Err(FabricError::Protocol(format!(
                    "malformed header line {:?}",
                    line
                )))
            }
        }
    }

    // Body up to the NUL terminator. A stream that ends first delivered
    // only part of the body, which must not be handed on as a whole frame.
    let mut body = Vec::new();
    reader.read_until(0, &mut body).await?;
    if body.pop() != Some(0) {
        return Err(FabricError::Protocol(
            "connection closed mid-body".to_string(),
        ));
    }

    Ok(StompFrame {
        command,
        headers,
        body,
    })
}

/// A live STOMP session over TCP.
pub struct StompConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl StompConnection {
    /// Connect to the broker and complete the STOMP handshake.
    pub async fn connect(config: &FabricConfig) -> Result<Self, FabricError> {
        let addr = format!("{}:{}", config.address, config.port);
        debug!("connecting to fabric broker at {}", addr);
        let stream = TcpStream::connect(&addr).await?;

        // Tune the socket for small latency-sensitive frames.
        let std_stream = stream.into_std()?;
        let socket = socket2::Socket::from(std_stream.try_clone()?);
        socket.set_nodelay(true)?;
        let stream = TcpStream::from_std(std_stream)?;

        let (read_half, write_half) = stream.into_split();
        let mut conn = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        let connect = StompFrame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", &config.address)
            .header("login", &config.username)
            .header("passcode", &config.password)
            .header("heart-beat", "0,0");
        conn.write_frame(&connect).await?;

        let reply = conn.read_next_frame().await?;
        match reply.command.as_str() {
            "CONNECTED" => {
                debug!(
                    version = reply.header_value("version").unwrap_or("?"),
                    "fabric session established"
                );
                Ok(conn)
            }
            "ERROR" => Err(FabricError::Handshake(
                reply
                    .header_value("message")
                    .unwrap_or("broker sent ERROR")
                    .to_string(),
            )),
            other => Err(FabricError::Protocol(format!(
                "expected CONNECTED, got {}",
                other
            ))),
        }
    }

    pub async fn write_frame(&mut self, frame: &StompFrame) -> Result<(), FabricError> {
        self.writer.write_all(&frame.to_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn read_next_frame(&mut self) -> Result<StompFrame, FabricError> {
        read_frame(&mut self.reader).await
    }

    /// Subscribe to a topic; delivered messages arrive as MESSAGE frames.
    pub async fn subscribe(&mut self, topic: &str) -> Result<String, FabricError> {
        let id = Uuid::new_v4().to_string();
        let frame = StompFrame::new("SUBSCRIBE")
            .header("id", &id)
            .header("destination", &topic_destination(topic))
            .header("ack", "auto");
        self.write_frame(&frame).await?;
        Ok(id)
    }

    /// Block until the next MESSAGE frame, skipping unrelated server frames.
    pub async fn next_message(&mut self) -> Result<StompFrame, FabricError> {
        loop {
            let frame = self.read_next_frame().await?;
            match frame.command.as_str() {
                "MESSAGE" => return Ok(frame),
                "ERROR" => {
                    return Err(FabricError::Protocol(
                        frame
                            .header_value("message")
                            .unwrap_or("broker sent ERROR")
                            .to_string(),
                    ))
                }
                other => debug!("ignoring {} frame", other),
            }
        }
    }
}

#[async_trait]
impl FabricConnection for StompConnection {
    async fn send_envelope(&mut self, topic: &str, envelope: &Envelope) -> Result<(), FabricError> {
        let body = serde_json::to_vec(envelope)?;
        let frame = StompFrame::new("SEND")
            .header("destination", &topic_destination(topic))
            .header("content-type", "application/json")
            .header("content-length", &body.len().to_string())
            .body(body);
        self.write_frame(&frame).await
    }

    async fn close(&mut self) -> Result<(), FabricError> {
        let frame = StompFrame::new("DISCONNECT");
        // Best effort: the broker may already have dropped the session.
        let _ = self.write_frame(&frame).await;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Opens STOMP sessions for the publisher driver.
pub struct StompConnectionFactory {
    config: FabricConfig,
}

impl StompConnectionFactory {
    pub fn new(config: FabricConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for StompConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn FabricConnection>, FabricError> {
        let conn = StompConnection::connect(&self.config).await?;
        Ok(Box::new(conn))
    }
}
