//! vb-relay — WebSocket relay between a mobile streaming controller and
//! browser clients, with PIN-gated HTTP state endpoints.

mod rate_limit;
mod relay;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::relay::Relay;
use crate::services::auth::AuthService;
use crate::services::matchday::MatchdayStore;
use crate::services::scout::ScoutStore;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "vb-relay", about = "WebSocket relay and match-state server")]
struct Cli {
    /// Listen port.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// WS-level shared secret; empty disables the frame-auth handshake.
    #[arg(long, default_value = "")]
    password: String,

    /// Data directory for sessions, state files, and archives.
    #[arg(long, default_value = "./data")]
    data: PathBuf,

    /// 6-digit login PIN. Falls back to a compiled-in default.
    #[arg(long, env = "AUTH_PIN")]
    pin: Option<String>,

    /// Static files directory served behind the session gate.
    #[arg(long, default_value = "./web")]
    web: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let scout = ScoutStore::open(&cli.data).expect("scout store init failed");
    let matchday = MatchdayStore::open(&cli.data).expect("matchday store init failed");
    let auth = AuthService::new(&cli.data, cli.pin);

    let _limit_sweeper = auth.limiter.spawn_sweeper();
    let _session_sweeper = auth.sessions.spawn_sweeper();

    let (relay, events) = Relay::new(cli.password);
    let _hub = tokio::spawn(relay.clone().run(events));

    let state = AppState::new(auth, relay, scout, matchday, cli.web);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cli.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = cli.port, "relay listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
