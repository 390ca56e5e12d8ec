//! Transport ports used by the prober and the subnet sweep.
//!
//! The prober only needs two things from the outside world: a remote shell that runs
//! a command and hands back decoded text, and an HTTP client that fetches one URL.
//! The sweep runs one local program. All are traits so they can be driven by
//! scripted fakes in tests.
//!
//! * [`ssh`]: [`RemoteShell`] over SSH password authentication.
//! * [`http`]: [`HttpFetcher`] backed by `reqwest`.
//! * [`local`]: [`CommandRunner`] backed by `tokio::process`.

use std::time::Duration;

use async_trait::async_trait;
use infrasync_common::config::Credentials;

use crate::error::TransportError;

pub mod http;
pub mod local;
pub mod ssh;

/// Decoded output of one remote command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
}

impl CommandOutput {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            stderr: String::new(),
            exit_status: Some(0),
        }
    }
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Opens a session, failing with [`TransportError`] on timeout, refusal or bad credentials.
    async fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn ShellSession>, TransportError>;
}

#[async_trait]
pub trait ShellSession: Send {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub allow_insecure_tls: bool,
    pub follow_redirects: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            allow_insecure_tls: true,
            follow_redirects: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str, options: &FetchOptions) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` on this machine. A non-zero exit is not an error; the
    /// status is returned with the output.
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, TransportError>;
}
