//! Voxify — avatar chat core.
//!
//! Communicates with the UI shell via JSON-line IPC on stdin/stdout.
//! This is the entry point that resolves the avatar's model, connects to
//! the chat server, and runs the session loop.

mod audio;
mod avatar;
mod chat;
mod config;
mod ipc;
mod recording;
mod reply;
mod transport;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat::ChatSession;
use ipc::bridge::{emit_event, spawn_stdin_reader};
use ipc::UiEvent;

#[tokio::main]
async fn main() {
    // Settings come first so show_debug can raise the default log level.
    let settings = config::read_settings();
    let user = config::read_user_session();

    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // Logs go to stderr; stdout is reserved for IPC events.
    let default_filter = if settings.show_debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Emit starting event immediately so the shell knows we're alive.
    emit_event(&UiEvent::Starting {});

    let mut args = std::env::args().skip(1);
    let (Some(avatar_id), Some(avatar_name)) = (args.next(), args.next()) else {
        error!("Usage: voxify-core <avatar-id> <avatar-name>");
        emit_event(&UiEvent::Error {
            message: "Missing avatar id/name arguments".to_string(),
        });
        std::process::exit(2);
    };

    info!(server = %settings.server_url, avatar = %avatar_name, "Configuration loaded");

    // Spawn stdin reader (blocking thread -> async channel).
    let cmd_rx = spawn_stdin_reader();

    // The model must be on disk before the shell can show the avatar.
    emit_event(&UiEvent::Loading {
        step: "Preparing avatar model...".to_string(),
    });
    match avatar::assets::ensure_avatar_model(&settings, &user, &avatar_name).await {
        Ok(path) => emit_event(&UiEvent::ModelReady {
            path: path.display().to_string(),
            channels: avatar::shapes::SHAPE_CHANNEL_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }),
        Err(e) => {
            error!("Avatar model unavailable: {e:#}");
            emit_event(&UiEvent::Error {
                message: format!("Avatar model unavailable: {e:#}"),
            });
            emit_event(&UiEvent::Stopping {});
            std::process::exit(1);
        }
    }

    emit_event(&UiEvent::Loading {
        step: "Connecting to server...".to_string(),
    });
    let (session, event_rx) = match transport::connect(&settings, &user, &avatar_id).await {
        Ok(conn) => conn,
        Err(e) => {
            let message = format!("{e:#}");
            error!("Connect failed: {message}");
            if transport::is_auth_rejection(&message) {
                emit_event(&UiEvent::AuthExpired {});
            } else {
                emit_event(&UiEvent::ConnectError { message });
            }
            emit_event(&UiEvent::Stopping {});
            std::process::exit(1);
        }
    };
    emit_event(&UiEvent::Connected {});

    ChatSession::new(session).run(cmd_rx, event_rx).await;
}
