//! HackVR server binary.
//!
//! Serves a small demo world so a viewer pointed at the address has
//! something to stand in. Real deployments embed [`hackvr_server::Server`]
//! and drive their own world from the host-event channel.
//!
//! ```bash
//! # Raw hackvr:// listener with anonymous access only
//! hackvr-server --bind 0.0.0.0:7777
//!
//! # HTTP upgrade listener with registered identities
//! hackvr-server --bind 0.0.0.0:8080 --upgrade --identities users.tsv
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use glam::Vec3;
use hackvr_proto::{Color, Command, Ident, ListedTriangle, Selector};
use hackvr_server::{
    HostEvent, IdentityStore, Server, ServerConfig, ServerError, ServerHandle,
};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// HackVR protocol server.
#[derive(Parser, Debug)]
#[command(name = "hackvr-server")]
#[command(about = "HackVR protocol server with a demo world")]
#[command(version)]
struct Args {
    /// Address to bind to.
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: String,

    /// Serve the HTTP/1.1 Upgrade establishment path instead of raw
    /// hackvr-hello.
    #[arg(long)]
    upgrade: bool,

    /// Identity file (userid<TAB>hex-ed25519-pubkey per line).
    #[arg(long)]
    identities: Option<PathBuf>,

    /// Maximum concurrent connections.
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let keys = match &args.identities {
        Some(path) => IdentityStore::load(path)?,
        None => {
            tracing::warn!("no identity file; only $anonymous users can authenticate");
            IdentityStore::new()
        }
    };
    tracing::info!(identities = keys.len(), "identity store ready");

    let config = ServerConfig { max_connections: args.max_connections, ..ServerConfig::default() };
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let server = Server::bind(&args.bind, args.upgrade, Arc::new(keys), config, events_tx).await?;
    let handle = server.handle();

    tokio::spawn(demo_world(handle, events_rx));
    server.run().await?;
    Ok(())
}

/// The demo world: a grey floor, a clickable cube pedestal, and an echoing
/// chat line, enough to exercise picking end to end.
async fn demo_world(
    handle: ServerHandle,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
) -> Result<(), ServerError> {
    while let Some(event) = events.recv().await {
        match event {
            HostEvent::Established { conn } => {
                tracing::info!(conn, "sending demo world");
                for command in demo_scene() {
                    handle.author(conn, command);
                }
                handle.announce_session(conn);
            }
            HostEvent::Chat { conn, message } => {
                handle.author(conn, Command::Chat { message: format!("echo: {message}") });
            }
            HostEvent::Tap { conn, object, tag, .. } => {
                handle.author(
                    conn,
                    Command::Chat { message: format!("you tapped {object} ({tag})") },
                );
            }
            HostEvent::Tell { conn, object, text } => {
                handle
                    .author(conn, Command::Chat { message: format!("{object} heard: {text}") });
            }
            HostEvent::Intent { conn, intent } => {
                tracing::info!(conn, %intent, "intent");
            }
            other => {
                tracing::debug!(?other, "host event");
            }
        }
    }
    Ok(())
}

fn demo_scene() -> Vec<Command> {
    #[allow(clippy::unwrap_used)]
    fn ident(s: &str) -> Ident {
        Ident::parse(s).unwrap()
    }
    #[allow(clippy::unwrap_used)]
    fn selector(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }
    fn grey(level: u8) -> Color {
        Color { r: level, g: level, b: level }
    }

    let floor = ListedTriangle {
        color: grey(0x80),
        vertices: [Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0)],
    };
    let floor2 = ListedTriangle {
        color: grey(0x80),
        vertices: [Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 0.0, 5.0), Vec3::new(-5.0, 0.0, 5.0)],
    };

    vec![
        Command::Chat { message: "welcome to the demo world".into() },
        Command::AddTriangleList {
            geometry: ident("$global"),
            tag: hackvr_proto::Tag::parse("floor").ok(),
            triangles: vec![floor, floor2],
        },
        Command::CreateObject { object: selector("pedestal"), parent: None },
        Command::CreateGeometry { geometry: selector("pedestal-mesh") },
        Command::AddTriangleFan {
            geometry: ident("pedestal-mesh"),
            tag: hackvr_proto::Tag::parse("top").ok(),
            color: grey(0xc0),
            vertices: vec![
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.5, 0.0, 0.5),
                Vec3::new(0.5, 0.0, -0.5),
                Vec3::new(-0.5, 0.0, -0.5),
                Vec3::new(-0.5, 0.0, 0.5),
            ],
        },
        Command::AttachGeometry {
            object: selector("pedestal"),
            geometry: Some(ident("pedestal-mesh")),
        },
        Command::SetObjectTransform {
            object: selector("pedestal"),
            pos: Some(Vec3::new(0.0, 0.0, -3.0)),
            rot: None,
            scale: None,
            duration: 0.0,
        },
        Command::SetObjectProperty {
            object: selector("pedestal"),
            key: ident("clickable"),
            value: "true".into(),
        },
        Command::SetObjectProperty {
            object: selector("$global"),
            key: ident("clickable"),
            value: "true".into(),
        },
    ]
}
