//! Tokio TCP transport.
//!
//! The driver is a single-threaded actor: one task owns the
//! [`ServerDriver`] and every write half, per-connection reader tasks feed
//! it bytes over a channel, and a 1 s interval drives ticks. Reads and
//! writes tolerate arbitrary chunking: the framer reassembles on the way
//! in, `write_all` finishes partial writes on the way out.
//!
//! TLS (`hackvrs://`, `https+hackvr://`) is an external collaborator: put
//! a terminating proxy in front and run the listener in raw or upgrade
//! mode. The transport only decides which establishment path new
//! connections start in.

use std::collections::HashMap;

use hackvr_core::IdentityLookup;
use hackvr_proto::Command;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, tcp::OwnedWriteHalf},
    sync::mpsc,
};

use crate::{
    ServerError,
    driver::{ConnId, HostEvent, ServerAction, ServerConfig, ServerDriver, ServerEvent, TransportKind},
    system_env::SystemEnv,
};

/// Commands the world application sends into the transport loop.
#[derive(Debug)]
pub enum HostCommand {
    /// Author a command on one connection.
    Author {
        /// Target connection.
        conn: ConnId,
        /// The command.
        command: Command,
    },
    /// Mint and announce a fresh session token on one connection.
    AnnounceSession {
        /// Target connection.
        conn: ConnId,
    },
}

/// A running server's handle for the world application.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<HostCommand>,
}

impl ServerHandle {
    /// Author a command on one connection.
    pub fn author(&self, conn: ConnId, command: Command) {
        let _ = self.commands.send(HostCommand::Author { conn, command });
    }

    /// Mint and announce a session token on one connection.
    pub fn announce_session(&self, conn: ConnId) {
        let _ = self.commands.send(HostCommand::AnnounceSession { conn });
    }
}

/// The production server loop.
pub struct Server<K> {
    listener: TcpListener,
    transport_kind: TransportKind,
    driver: ServerDriver<SystemEnv, K>,
    host_events: mpsc::UnboundedSender<HostEvent>,
    host_commands: mpsc::UnboundedReceiver<HostCommand>,
    handle_seed: mpsc::UnboundedSender<HostCommand>,
    writers: HashMap<ConnId, OwnedWriteHalf>,
    next_conn: ConnId,
}

impl<K: IdentityLookup + Send + 'static> Server<K> {
    /// Bind a server.
    ///
    /// `upgrade` selects the HTTP Upgrade establishment path for all
    /// connections on this listener; raw listeners expect `hackvr-hello`.
    pub async fn bind(
        address: &str,
        upgrade: bool,
        keys: K,
        config: ServerConfig,
        host_events: mpsc::UnboundedSender<HostEvent>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Bind { address: address.to_owned(), source: e })?;
        tracing::info!(%address, upgrade, "listening");

        let (handle_seed, host_commands) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            transport_kind: if upgrade { TransportKind::HttpUpgrade } else { TransportKind::Raw },
            driver: ServerDriver::new(SystemEnv::new(), keys, config),
            host_events,
            host_commands,
            handle_seed,
            writers: HashMap::new(),
            next_conn: 1,
        })
    }

    /// The local address actually bound.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Io)
    }

    /// Handle for the world application.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { commands: self.handle_seed.clone() }
    }

    /// Run until the listener fails. The driver processes one event at a
    /// time, so the per-connection command stream stays strictly ordered.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let (bytes_tx, mut bytes_rx) = mpsc::unbounded_channel::<ServerEvent<std::time::Instant>>();
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(ServerError::Io)?;
                    let conn = self.next_conn;
                    self.next_conn += 1;
                    tracing::info!(conn, %peer, "accepted");

                    let (mut read_half, write_half) = stream.into_split();
                    self.writers.insert(conn, write_half);
                    let actions = self.driver.handle(ServerEvent::Accepted {
                        conn,
                        transport: self.transport_kind,
                    });
                    self.execute(actions).await;

                    let tx = bytes_tx.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 16 * 1024];
                        loop {
                            match read_half.read(&mut buf).await {
                                Ok(0) | Err(_) => {
                                    let _ = tx.send(ServerEvent::Closed { conn });
                                    return;
                                }
                                Ok(n) => {
                                    let event = ServerEvent::Bytes {
                                        conn,
                                        bytes: buf[..n].to_vec(),
                                        now: std::time::Instant::now(),
                                    };
                                    if tx.send(event).is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    });
                }

                Some(event) = bytes_rx.recv() => {
                    if let ServerEvent::Closed { conn } = &event {
                        self.writers.remove(conn);
                    }
                    let actions = self.driver.handle(event);
                    self.execute(actions).await;
                }

                Some(command) = self.host_commands.recv() => {
                    let now = std::time::Instant::now();
                    let actions = match command {
                        HostCommand::Author { conn, command } => {
                            self.driver.author(conn, &command, now)
                        }
                        HostCommand::AnnounceSession { conn } => {
                            self.driver.announce_new_session(conn, now)
                        }
                    };
                    self.execute(actions).await;
                }

                _ = tick.tick() => {
                    let actions = self.driver.handle(ServerEvent::Tick {
                        now: std::time::Instant::now(),
                    });
                    self.execute(actions).await;
                }
            }
        }
    }

    async fn execute(&mut self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::Send { conn, bytes } => {
                    let failed = match self.writers.get_mut(&conn) {
                        Some(writer) => writer.write_all(&bytes).await.is_err(),
                        None => false,
                    };
                    if failed {
                        tracing::debug!(conn, "write failed, dropping connection");
                        self.writers.remove(&conn);
                        // Closing a connection only ever yields host events,
                        // so the cascade stays flat.
                        for extra in self.driver.handle(ServerEvent::Closed { conn }) {
                            if let ServerAction::Host(event) = extra {
                                let _ = self.host_events.send(event);
                            }
                        }
                    }
                }
                ServerAction::Close { conn, reason } => {
                    tracing::info!(conn, reason, "closing");
                    if let Some(mut writer) = self.writers.remove(&conn) {
                        let _ = writer.shutdown().await;
                    }
                }
                ServerAction::Host(event) => {
                    let _ = self.host_events.send(event);
                }
            }
        }
    }
}
