// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SSH transport built on russh.
//!
//! One [`SshTransport`] wraps one authenticated russh session. Commands run
//! on fresh session channels, so a pooled transport can serve many commands
//! in sequence. File transfer uses the SFTP subsystem.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use russh::client::{Config, Handle};
use russh_sftp::{client::SftpSession, protocol::OpenFlags};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{CommandOutput, Transport, TransportFactory, TunnelHandle};
use crate::shared::error::TransportError;
use crate::target::TargetConfig;

mod auth;
mod handler;
mod tunnel;

pub use handler::{ClientHandler, HostKeyCheck};

/// Buffer size for command stdout
const SSH_CMD_BUFFER_SIZE: usize = 8192;

/// Buffer size for command stderr
const SSH_RESPONSE_BUFFER_SIZE: usize = 1024;

/// Connection options shared by every session a factory creates.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host_key_check: HostKeyCheck,
    /// Keepalive interval; `None` disables keepalives.
    pub keepalive_interval: Option<Duration>,
    pub keepalive_max: usize,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            host_key_check: HostKeyCheck::default(),
            keepalive_interval: Some(Duration::from_secs(60)),
            keepalive_max: 3,
        }
    }
}

/// Creates [`SshTransport`]s with shared options.
#[derive(Debug, Clone, Default)]
pub struct SshTransportFactory {
    options: Arc<SshOptions>,
}

impl SshTransportFactory {
    pub fn new(options: SshOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

impl TransportFactory for SshTransportFactory {
    fn create(&self, target: &TargetConfig) -> Arc<dyn Transport> {
        Arc::new(SshTransport::new(target.clone(), Arc::clone(&self.options)))
    }
}

/// An SSH session to a single target.
pub struct SshTransport {
    target: TargetConfig,
    options: Arc<SshOptions>,
    handle: RwLock<Option<Arc<Handle<ClientHandler>>>>,
    last_activity: Mutex<Option<DateTime<Utc>>>,
    tunnels: Mutex<Vec<CancellationToken>>,
}

impl SshTransport {
    pub fn new(target: TargetConfig, options: Arc<SshOptions>) -> Self {
        Self {
            target,
            options,
            handle: RwLock::new(None),
            last_activity: Mutex::new(None),
            tunnels: Mutex::new(Vec::new()),
        }
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Some(Utc::now());
        }
    }

    fn current_handle(&self) -> Result<Arc<Handle<ClientHandler>>, TransportError> {
        let guard = self
            .handle
            .read()
            .map_err(|e| TransportError::Other(format!("handle lock poisoned: {e}")))?;
        match guard.as_ref() {
            Some(handle) if !handle.is_closed() => Ok(Arc::clone(handle)),
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Host as russh expects it, with IPv6 brackets removed.
    fn dial_host(&self) -> &str {
        self.target
            .host
            .trim_start_matches('[')
            .trim_end_matches(']')
    }

    async fn establish(&self) -> Result<Handle<ClientHandler>, TransportError> {
        let config = Arc::new(Config {
            keepalive_interval: self.options.keepalive_interval,
            keepalive_max: self.options.keepalive_max,
            ..Default::default()
        });
        let handler = ClientHandler::new(
            self.dial_host().to_string(),
            self.target.port,
            self.options.host_key_check.clone(),
        );

        let mut handle =
            russh::client::connect(config, (self.dial_host(), self.target.port), handler).await?;
        auth::authenticate(&mut handle, &self.target.username, &self.target.auth).await?;
        Ok(handle)
    }

    async fn open_sftp(&self) -> Result<SftpSession, TransportError> {
        let handle = self.current_handle()?;
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        Ok(SftpSession::new(channel.into_stream()).await?)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, timeout: Duration) -> Result<(), TransportError> {
        debug!("Opening SSH session to {}", self.target.key());
        let handle = tokio::time::timeout(timeout, self.establish())
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        let mut slot = self
            .handle
            .write()
            .map_err(|e| TransportError::Other(format!("handle lock poisoned: {e}")))?;
        *slot = Some(Arc::new(handle));
        drop(slot);

        self.touch();
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let handle = self.current_handle()?;
        let mut stdout = Vec::with_capacity(SSH_CMD_BUFFER_SIZE);
        let mut stderr = Vec::with_capacity(SSH_RESPONSE_BUFFER_SIZE);

        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut exit_code: Option<i32> = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    stderr.extend_from_slice(data)
                }
                // The exit status may arrive before the last data packet
                russh::ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(i32::try_from(exit_status).unwrap_or(i32::MAX))
                }
                russh::ChannelMsg::ExitSignal {
                    signal_name,
                    core_dumped,
                    error_message,
                    ..
                } => {
                    let (code, name) = signal_exit(&signal_name);
                    debug!("Command on {} killed by SIG{}", self.target.key(), name);
                    if !stderr.is_empty() && !stderr.ends_with(b"\n") {
                        stderr.push(b'\n');
                    }
                    let core = if core_dumped { " (core dumped)" } else { "" };
                    stderr.extend_from_slice(format!("killed by SIG{name}{core}").as_bytes());
                    if !error_message.is_empty() {
                        stderr.extend_from_slice(format!(": {error_message}").as_bytes());
                    }
                    exit_code = Some(code);
                }
                _ => {}
            }
        }

        self.touch();
        let exit_code = exit_code.ok_or(TransportError::CommandDidNotExit)?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<(), TransportError> {
        let sftp = self.open_sftp().await?;
        let contents = tokio::fs::read(local_path).await?;

        let mut file = sftp
            .open_with_flags(
                remote_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;
        file.write_all(&contents).await?;
        file.flush().await?;
        file.shutdown().await?;

        trace!("Uploaded {} bytes to {}:{}", contents.len(), self.target.name, remote_path);
        self.touch();
        Ok(())
    }

    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), TransportError> {
        let sftp = self.open_sftp().await?;
        let mut remote_file = sftp.open_with_flags(remote_path, OpenFlags::READ).await?;

        let mut contents = Vec::new();
        remote_file.read_to_end(&mut contents).await?;
        tokio::fs::write(local_path, &contents).await?;

        trace!("Downloaded {} bytes from {}:{}", contents.len(), self.target.name, remote_path);
        self.touch();
        Ok(())
    }

    async fn create_tunnel(
        &self,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<TunnelHandle, TransportError> {
        let handle = self.current_handle()?;
        let listener = TcpListener::bind(("127.0.0.1", local_port)).await?;
        let local_addr = listener.local_addr()?;

        let cancel_token = CancellationToken::new();
        if let Ok(mut tunnels) = self.tunnels.lock() {
            tunnels.retain(|token| !token.is_cancelled());
            tunnels.push(cancel_token.clone());
        }

        let task = tokio::spawn(tunnel::run_listener(
            listener,
            handle,
            remote_host.to_string(),
            remote_port,
            cancel_token.clone(),
        ));

        debug!(
            "Tunnel {} -> {}:{} via {}",
            local_addr, remote_host, remote_port, self.target.name
        );
        self.touch();
        Ok(TunnelHandle::new(
            local_addr,
            remote_host,
            remote_port,
            cancel_token,
            Some(task),
        ))
    }

    fn is_connected(&self) -> bool {
        self.current_handle().is_ok()
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity.lock().ok().and_then(|last| *last)
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Tunnels go first so their channels are not torn down mid-copy by the disconnect
        if let Ok(mut tunnels) = self.tunnels.lock() {
            for token in tunnels.drain(..) {
                token.cancel();
            }
        }

        let handle = self
            .handle
            .write()
            .map_err(|e| TransportError::Other(format!("handle lock poisoned: {e}")))?
            .take();

        if let Some(handle) = handle {
            if !handle.is_closed() {
                handle
                    .disconnect(russh::Disconnect::ByApplication, "", "")
                    .await?;
            }
            debug!("Closed SSH session to {}", self.target.key());
        }
        Ok(())
    }
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("target", &self.target.key())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Shell-style exit code (128 + signal number) and name for a signal that
/// terminated a remote command.
fn signal_exit(signal: &russh::Sig) -> (i32, String) {
    use russh::Sig;
    let number = match signal {
        Sig::HUP => 1,
        Sig::INT => 2,
        Sig::QUIT => 3,
        Sig::ILL => 4,
        Sig::ABRT => 6,
        Sig::FPE => 8,
        Sig::KILL => 9,
        Sig::USR1 => 10,
        Sig::SEGV => 11,
        Sig::PIPE => 13,
        Sig::ALRM => 14,
        Sig::TERM => 15,
        Sig::Custom(name) => return (128, name.clone()),
        #[allow(unreachable_patterns)]
        _ => return (128, format!("{signal:?}")),
    };
    (128 + number, format!("{signal:?}"))
}
