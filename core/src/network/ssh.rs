//! SSH transport.
//!
//! `ssh2` is a blocking library, so connecting and every command run on tokio's
//! blocking pool. The TCP connect is bounded by the caller's timeout; once the
//! session is up, each blocking call is bounded by the command timeout.

use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use infrasync_common::config::Credentials;
use ssh2::Session;
use tracing::debug;

use super::{CommandOutput, RemoteShell, ShellSession};
use crate::error::TransportError;

const DEFAULT_PORT: u16 = 22;

pub struct SshShell {
    port: u16,
    command_timeout: Duration,
}

impl SshShell {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            port: DEFAULT_PORT,
            command_timeout,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn ShellSession>, TransportError> {
        let address = address.to_string();
        let credentials = credentials.clone();
        let port = self.port;
        let command_timeout = self.command_timeout;

        let session = tokio::task::spawn_blocking(move || {
            open_session(&address, port, &credentials, timeout, command_timeout)
        })
        .await
        .map_err(|e| TransportError::Task(e.to_string()))??;

        Ok(Box::new(SshSession { session }))
    }
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr, TransportError> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    (address, port)
        .to_socket_addrs()
        .map_err(|_| TransportError::Resolve(address.to_string()))?
        .next()
        .ok_or_else(|| TransportError::Resolve(address.to_string()))
}

fn open_session(
    address: &str,
    port: u16,
    credentials: &Credentials,
    connect_timeout: Duration,
    command_timeout: Duration,
) -> Result<Session, TransportError> {
    let addr = resolve(address, port)?;
    let connect_err = |reason: String| TransportError::Connect {
        address: addr.to_string(),
        reason,
    };

    let tcp = TcpStream::connect_timeout(&addr, connect_timeout)
        .map_err(|e| connect_err(e.to_string()))?;

    let mut session = Session::new().map_err(|e| connect_err(e.to_string()))?;
    session.set_tcp_stream(tcp);
    // Handshake and authentication get the connect budget, commands their own.
    session.set_timeout(millis(connect_timeout));
    session.handshake().map_err(|e| connect_err(e.to_string()))?;

    session
        .userauth_password(&credentials.username, &credentials.password)
        .map_err(|_| TransportError::Auth {
            user: credentials.username.clone(),
        })?;
    if !session.authenticated() {
        return Err(TransportError::Auth {
            user: credentials.username.clone(),
        });
    }

    session.set_timeout(millis(command_timeout));
    debug!("SSH session established with {addr}");
    Ok(session)
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

struct SshSession {
    session: Session,
}

#[async_trait]
impl ShellSession for SshSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        let session = self.session.clone();
        let command = command.to_string();

        tokio::task::spawn_blocking(move || run_command(&session, &command))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?
    }
}

fn run_command(session: &Session, command: &str) -> Result<CommandOutput, TransportError> {
    let mut channel = session.channel_session()?;
    channel.exec(command)?;

    let mut stdout = Vec::new();
    channel
        .read_to_end(&mut stdout)
        .map_err(|e| TransportError::Exec(e.to_string()))?;

    let mut stderr = Vec::new();
    channel
        .stderr()
        .read_to_end(&mut stderr)
        .map_err(|e| TransportError::Exec(e.to_string()))?;

    channel.wait_close()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status: channel.exit_status().ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_accepts_explicit_socket_address() {
        let addr = resolve("192.168.178.10:2222", DEFAULT_PORT).unwrap();
        assert_eq!(addr.port(), 2222);
    }

    #[test]
    fn resolve_applies_default_port() {
        let addr = resolve("127.0.0.1", DEFAULT_PORT).unwrap();
        assert_eq!(addr.port(), 22);
    }

    #[tokio::test]
    async fn closed_port_is_reported_as_connect_error() {
        let shell = SshShell::new(Duration::from_secs(1)).with_port(1);
        let credentials = Credentials {
            username: "nobody".into(),
            password: "nothing".into(),
        };
        let result = shell
            .connect("127.0.0.1", &credentials, Duration::from_millis(500))
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
