use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Opens the file provided as the first CLI argument (or starts with an
/// empty document) and reports its shape. Mostly a smoke check for the
/// editor core; set `RUST_LOG` to raise the log level.
pub fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match std::env::args().nth(1) {
        Some(path) => match editor_core::Editor::open(&path) {
            Ok(editor) => {
                tracing::info!(
                    path = %path,
                    bytes = editor.len(),
                    pieces = editor.piece_count(),
                    modified = editor.is_modified(),
                    "document opened"
                );
            }
            Err(err) => {
                tracing::error!(path = %path, %err, "could not open document");
                std::process::exit(1);
            }
        },
        None => {
            let editor = editor_core::Editor::new();
            tracing::info!(bytes = editor.len(), "started with an empty document");
        }
    }
}
