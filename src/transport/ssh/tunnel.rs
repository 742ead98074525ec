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

//! Local port tunnels over `direct-tcpip` channels.

use std::net::SocketAddr;
use std::sync::Arc;

use russh::client::Handle;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::handler::ClientHandler;

/// Accept loop for one tunnel. Exits when `cancel_token` fires.
pub(super) async fn run_listener(
    listener: TcpListener,
    handle: Arc<Handle<ClientHandler>>,
    remote_host: String,
    remote_port: u16,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let handle = Arc::clone(&handle);
                        let remote_host = remote_host.clone();
                        let token = cancel_token.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = forward_connection(stream, peer_addr, &handle, &remote_host, remote_port, token).await {
                                warn!("Tunnel connection from {} failed: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept tunnel connection: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                debug!("Tunnel to {}:{} cancelled", remote_host, remote_port);
                break;
            }
        }
    }
}

async fn forward_connection(
    mut tcp_stream: TcpStream,
    peer_addr: SocketAddr,
    handle: &Handle<ClientHandler>,
    remote_host: &str,
    remote_port: u16,
    cancel_token: CancellationToken,
) -> Result<(), crate::shared::error::TransportError> {
    let channel = handle
        .channel_open_direct_tcpip(
            remote_host,
            u32::from(remote_port),
            peer_addr.ip().to_string(),
            u32::from(peer_addr.port()),
        )
        .await?;
    let mut channel_stream = channel.into_stream();

    tokio::select! {
        copied = tokio::io::copy_bidirectional(&mut tcp_stream, &mut channel_stream) => {
            let (to_remote, to_local) = copied?;
            trace!("Tunnel connection from {} done: {} bytes out, {} bytes in", peer_addr, to_remote, to_local);
        }
        _ = cancel_token.cancelled() => {
            trace!("Tunnel connection from {} cancelled", peer_addr);
        }
    }
    Ok(())
}
