use std::{io::ErrorKind, path::Path, time::Duration};

use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, info, warn};

use super::protocol::{ControlParser, ControlRequest, ControlResponse};
use crate::{
    config::TorLaunchOptions,
    control_port::{ControlPortAddress, wait_for_control_port, wait_for_file},
    error::{ControlError, Result},
};

pub const CONNECT_ATTEMPTS: u32 = 15;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);
pub const COOKIE_FILE_NAME: &str = "control_auth_cookie";
pub const SUBSCRIBED_EVENTS: [&str; 3] = ["NOTICE", "WARN", "ERR"];

pub(crate) const SAFECOOKIE_SERVER_KEY: &[u8] =
    b"Tor safe cookie authentication server-to-controller hash";
pub(crate) const SAFECOOKIE_CLIENT_KEY: &[u8] =
    b"Tor safe cookie authentication controller-to-server hash";
const CLIENT_NONCE_LENGTH: usize = 32;

type HmacSha256 = Hmac<Sha256>;

struct Exchange {
    writer: OwnedWriteHalf,
    replies: mpsc::UnboundedReceiver<ControlResponse>,
}

/// Client side of Tor's control protocol.
///
/// A reader task parses every reply; asynchronous events are forwarded to
/// the log and synchronous replies are matched, in order, to the command
/// that is waiting for them.
pub struct TorController {
    exchange: Mutex<Exchange>,
    reader: JoinHandle<()>,
}

impl Drop for TorController {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl TorController {
    /// Connects, retrying while the listener is not up yet.
    pub async fn connect(
        address: &ControlPortAddress,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self> {
        let mut remaining = attempts;
        loop {
            debug!(%address, "Connecting to Tor control port");
            match TcpStream::connect((address.socket_host(), address.port)).await {
                Ok(stream) => {
                    info!(%address, "Connected to Tor control port");
                    return Ok(Self::from_stream(stream));
                }
                Err(error) if error.kind() == ErrorKind::ConnectionRefused && remaining > 0 => {
                    debug!("Tor control port is not ready yet");
                    remaining -= 1;
                    sleep(retry_delay).await;
                }
                Err(error) => {
                    return Err(ControlError::ConnectionFailed {
                        address: address.to_string(),
                        reason: error.to_string(),
                    }
                    .into());
                }
            }
        }
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        let (sender, replies) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_replies(reader, sender));
        Self {
            exchange: Mutex::new(Exchange { writer, replies }),
            reader,
        }
    }

    /// Waits for a freshly started daemon's control port, connects,
    /// authenticates, takes ownership and subscribes to its log events.
    pub async fn attach(options: &TorLaunchOptions, timeout: Duration) -> Result<Self> {
        let address = wait_for_control_port(&options.control_port_file, timeout).await?;
        let controller = Self::connect(&address, CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY).await?;

        if options.cookie_authentication {
            let cookie_path = options.data_directory.join(COOKIE_FILE_NAME);
            let cookie = read_cookie(&cookie_path, timeout).await?;
            debug!(bytes = cookie.len(), "Read authentication cookie");
            controller.authenticate_safecookie(&cookie).await?;
        } else {
            controller.require(ControlRequest::new("AUTHENTICATE")).await?;
        }

        controller.take_ownership().await?;
        controller.set_events(&SUBSCRIBED_EVENTS).await?;
        Ok(controller)
    }

    /// Sends one command and waits for its synchronous reply.
    pub async fn send_command(&self, request: ControlRequest) -> Result<ControlResponse> {
        let mut exchange = self.exchange.lock().await;
        exchange
            .writer
            .write_all(request.to_protocol_string().as_bytes())
            .await?;
        exchange.writer.flush().await?;
        exchange
            .replies
            .recv()
            .await
            .ok_or_else(|| ControlError::Disconnected.into())
    }

    /// Like [`send_command`](Self::send_command), but an error status fails.
    pub async fn require(&self, request: ControlRequest) -> Result<ControlResponse> {
        let command = request.command.clone();
        let response = self.send_command(request).await?;
        if response.is_error() {
            return Err(ControlError::CommandFailed {
                command,
                status: response.status,
                reply: response.first_reply().to_string(),
            }
            .into());
        }
        debug!(%command, "Control command succeeded");
        Ok(response)
    }

    /// SAFECOOKIE handshake: AUTHCHALLENGE, server hash check, AUTHENTICATE.
    pub async fn authenticate_safecookie(&self, cookie: &[u8]) -> Result<()> {
        let mut client_nonce = [0u8; CLIENT_NONCE_LENGTH];
        OsRng.fill_bytes(&mut client_nonce);

        let response = self
            .require(ControlRequest::with_arguments(
                "AUTHCHALLENGE",
                &["SAFECOOKIE".to_string(), hex::encode_upper(client_nonce)],
            ))
            .await?;
        let reply = response
            .replies
            .first()
            .ok_or_else(|| ControlError::UnexpectedReply {
                reason: "empty AUTHCHALLENGE reply".to_string(),
            })?;
        let (command, values) = reply.command_and_values();
        if command != "AUTHCHALLENGE" {
            return Err(ControlError::UnexpectedReply {
                reason: format!("expected AUTHCHALLENGE, got {command}"),
            }
            .into());
        }
        let server_hash = decode_hex_value(&values, "SERVERHASH")?;
        let server_nonce = decode_hex_value(&values, "SERVERNONCE")?;

        let mut message = Vec::with_capacity(cookie.len() + client_nonce.len() + server_nonce.len());
        message.extend_from_slice(cookie);
        message.extend_from_slice(&client_nonce);
        message.extend_from_slice(&server_nonce);

        new_mac(SAFECOOKIE_SERVER_KEY, &message)?
            .verify_slice(&server_hash)
            .map_err(|_| ControlError::ServerHashMismatch)?;
        debug!("Tor server hash is valid");

        let client_hash = new_mac(SAFECOOKIE_CLIENT_KEY, &message)?
            .finalize()
            .into_bytes();
        self.require(ControlRequest::with_arguments(
            "AUTHENTICATE",
            &[hex::encode_upper(client_hash)],
        ))
        .await?;
        info!("Authenticated to Tor control port");
        Ok(())
    }

    /// Tor exits when this control connection closes.
    pub async fn take_ownership(&self) -> Result<()> {
        self.require(ControlRequest::new("TAKEOWNERSHIP")).await?;
        Ok(())
    }

    pub async fn set_events(&self, events: &[&str]) -> Result<()> {
        self.require(ControlRequest::with_arguments("SETEVENTS", events))
            .await?;
        Ok(())
    }

    /// Asks the daemon to shut down, which ends the launcher's run call.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Sending SIGNAL SHUTDOWN to Tor");
        self.require(ControlRequest::with_arguments("SIGNAL", &["SHUTDOWN"]))
            .await?;
        Ok(())
    }
}

async fn read_replies(reader: OwnedReadHalf, replies: mpsc::UnboundedSender<ControlResponse>) {
    let mut lines = BufReader::new(reader).lines();
    let mut parser = ControlParser::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parser.parse_line(&line) {
                Ok(Some(response)) if response.is_async() => log_event(&response),
                Ok(Some(response)) => {
                    if replies.send(response).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, "Discarding malformed control reply");
                    parser.reset();
                }
            },
            Ok(None) => {
                info!("Tor control socket disconnected");
                break;
            }
            Err(error) => {
                warn!(%error, "Tor control socket read failed");
                break;
            }
        }
    }
}

fn log_event(response: &ControlResponse) {
    let (event, message) = response
        .first_reply()
        .split_once(' ')
        .unwrap_or((response.first_reply(), ""));
    match event {
        "NOTICE" => info!(target: "tor", "{message}"),
        "WARN" => warn!(target: "tor", "{message}"),
        "ERR" => error!(target: "tor", "{message}"),
        _ => warn!(event, replies = ?response.replies, "Received unknown Tor event"),
    }
}

async fn read_cookie(path: &Path, timeout: Duration) -> Result<Vec<u8>> {
    wait_for_file(path, timeout).await?.ok_or_else(|| {
        ControlError::CookieUnavailable {
            path: path.display().to_string(),
            timeout,
        }
        .into()
    })
}

fn decode_hex_value(
    values: &std::collections::HashMap<String, String>,
    field: &str,
) -> Result<Vec<u8>> {
    let value = values.get(field).ok_or_else(|| ControlError::UnexpectedReply {
        reason: format!("AUTHCHALLENGE reply has no {field}"),
    })?;
    hex::decode(value).map_err(|error| {
        ControlError::InvalidHex {
            field: field.to_string(),
            reason: error.to_string(),
        }
        .into()
    })
}

pub(crate) fn new_mac(key: &[u8], message: &[u8]) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|error| {
        ControlError::InvalidKey {
            reason: error.to_string(),
        }
    })?;
    mac.update(message);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use super::*;
    use crate::error::Error;

    const COOKIE: [u8; 32] = [0x42; 32];
    const SERVER_NONCE: [u8; 32] = [0x07; 32];

    /// Minimal Tor control port: answers the commands the controller sends
    /// and returns every line it received once the client hangs up.
    async fn serve_control_port(listener: TcpListener, corrupt_server_hash: bool) -> Vec<String> {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut received = Vec::new();
        let mut expected_client_hash = String::new();

        while let Some(line) = lines.next_line().await.unwrap() {
            received.push(line.clone());
            let parts: Vec<&str> = line.split_whitespace().collect();
            let reply = match parts.first().copied() {
                Some("AUTHCHALLENGE") => {
                    let client_nonce = hex::decode(parts[2]).unwrap();
                    let message = [&COOKIE[..], &client_nonce[..], &SERVER_NONCE[..]].concat();
                    let mut server_hash = new_mac(SAFECOOKIE_SERVER_KEY, &message)
                        .unwrap()
                        .finalize()
                        .into_bytes()
                        .to_vec();
                    if corrupt_server_hash {
                        server_hash[0] ^= 0xff;
                    }
                    expected_client_hash = hex::encode_upper(
                        new_mac(SAFECOOKIE_CLIENT_KEY, &message)
                            .unwrap()
                            .finalize()
                            .into_bytes(),
                    );
                    format!(
                        "250 AUTHCHALLENGE SERVERHASH={} SERVERNONCE={}\r\n",
                        hex::encode_upper(&server_hash),
                        hex::encode_upper(SERVER_NONCE)
                    )
                }
                Some("AUTHENTICATE") if parts.get(1) == Some(&expected_client_hash.as_str()) => {
                    "250 OK\r\n".to_string()
                }
                Some("AUTHENTICATE") => "515 Authentication failed\r\n".to_string(),
                Some("TAKEOWNERSHIP") | Some("SIGNAL") => "250 OK\r\n".to_string(),
                Some("SETEVENTS") => {
                    "650 NOTICE Bootstrapped 100% (done): Done\r\n250 OK\r\n".to_string()
                }
                _ => "510 Unrecognized command\r\n".to_string(),
            };
            writer.write_all(reply.as_bytes()).await.unwrap();
        }
        received
    }

    async fn stub_control_port(corrupt_server_hash: bool) -> (ControlPortAddress, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ControlPortAddress {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        };
        let server = tokio::spawn(serve_control_port(listener, corrupt_server_hash));
        (address, server)
    }

    fn launch_options(directory: &Path) -> TorLaunchOptions {
        TorLaunchOptions::new(
            directory.join("tor_data"),
            directory.join("tor-control.port"),
        )
    }

    async fn write_port_file(path: &PathBuf, address: &ControlPortAddress) {
        tokio::fs::write(path, format!("PORT={address}\n")).await.unwrap();
    }

    #[tokio::test]
    async fn attach_authenticates_and_subscribes_then_shuts_down() {
        let directory = tempfile::tempdir().unwrap();
        let options = launch_options(directory.path());
        let (address, server) = stub_control_port(false).await;

        write_port_file(&options.control_port_file, &address).await;
        tokio::fs::create_dir_all(&options.data_directory).await.unwrap();
        tokio::fs::write(options.data_directory.join(COOKIE_FILE_NAME), COOKIE)
            .await
            .unwrap();

        let controller = TorController::attach(&options, Duration::from_secs(2))
            .await
            .unwrap();
        controller.shutdown().await.unwrap();
        drop(controller);

        let received = server.await.unwrap();
        let commands: Vec<&str> = received
            .iter()
            .map(|line| line.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(
            commands,
            ["AUTHCHALLENGE", "AUTHENTICATE", "TAKEOWNERSHIP", "SETEVENTS", "SIGNAL"]
        );
        assert!(received[0].starts_with("AUTHCHALLENGE SAFECOOKIE "));
        assert_eq!(received[3], "SETEVENTS NOTICE WARN ERR");
        assert_eq!(received[4], "SIGNAL SHUTDOWN");
    }

    #[tokio::test]
    async fn rejects_a_server_hash_that_does_not_match_the_cookie() {
        let (address, server) = stub_control_port(true).await;
        let controller = TorController::connect(&address, 0, CONNECT_RETRY_DELAY)
            .await
            .unwrap();

        let result = controller.authenticate_safecookie(&COOKIE).await;
        assert!(matches!(
            result,
            Err(Error::Control(ControlError::ServerHashMismatch))
        ));
        drop(controller);

        let received = server.await.unwrap();
        assert_eq!(received.len(), 1, "AUTHENTICATE must not be sent");
    }

    #[tokio::test]
    async fn error_status_fails_required_commands() {
        let (address, server) = stub_control_port(false).await;
        let controller = TorController::connect(&address, 0, CONNECT_RETRY_DELAY)
            .await
            .unwrap();

        let response = controller
            .send_command(ControlRequest::new("GETINFO"))
            .await
            .unwrap();
        assert_eq!(response.status, 510);

        match controller.require(ControlRequest::new("GETINFO")).await {
            Err(Error::Control(ControlError::CommandFailed { command, status, reply })) => {
                assert_eq!(command, "GETINFO");
                assert_eq!(status, 510);
                assert_eq!(reply, "Unrecognized command");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        drop(controller);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn events_are_not_mistaken_for_replies() {
        let (address, server) = stub_control_port(false).await;
        let controller = TorController::connect(&address, 0, CONNECT_RETRY_DELAY)
            .await
            .unwrap();

        controller.set_events(&SUBSCRIBED_EVENTS).await.unwrap();
        let response = controller
            .send_command(ControlRequest::new("TAKEOWNERSHIP"))
            .await
            .unwrap();
        assert_eq!(response.status, 250);
        assert_eq!(response.first_reply(), "OK");

        drop(controller);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn gives_up_after_the_retry_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let address = ControlPortAddress {
            host: "127.0.0.1".to_string(),
            port,
        };
        let result = TorController::connect(&address, 2, Duration::from_millis(10)).await;
        assert!(matches!(
            result,
            Err(Error::Control(ControlError::ConnectionFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn closed_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ControlPortAddress {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        };
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let controller = TorController::connect(&address, 0, CONNECT_RETRY_DELAY)
            .await
            .unwrap();
        server.await.unwrap();

        let result = controller.send_command(ControlRequest::new("GETINFO")).await;
        assert!(matches!(
            result,
            Err(Error::Control(ControlError::Disconnected)) | Err(Error::InputOutput(_))
        ));
    }

    #[tokio::test]
    async fn missing_cookie_times_out() {
        let directory = tempfile::tempdir().unwrap();
        let options = launch_options(directory.path());
        let (address, server) = stub_control_port(false).await;
        write_port_file(&options.control_port_file, &address).await;

        let result = TorController::attach(&options, Duration::from_millis(200)).await;
        match result {
            Err(Error::Control(ControlError::CookieUnavailable { timeout, .. })) => {
                assert_eq!(timeout, Duration::from_millis(200));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("attach succeeded without a cookie"),
        }
        server.await.unwrap();
    }
}
