//! Diagnostic output.
//!
//! Every event goes to stdout and is also appended, without colour codes,
//! to a per-node log file (`log_node<id>.txt` unless overridden). The
//! level comes from `RUST_LOG` and defaults to `info`.

use std::{
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use lamport_proto::NodeId;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// Log file used when none is given on the command line.
pub fn default_log_file(id: NodeId) -> PathBuf {
    PathBuf::from(format!("log_node{id}.txt"))
}

/// Formatting layer that appends plain-text events to `path`.
///
/// # Errors
///
/// The file cannot be opened for appending.
pub fn file_layer<S>(path: &Path) -> io::Result<impl Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
}

/// Install the global subscriber: stdout plus `log_file`.
///
/// # Errors
///
/// The log file cannot be opened.
pub fn init(log_file: &Path) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer(log_file)?)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing::info;

    use super::*;

    #[test]
    fn default_file_is_named_after_node() {
        assert_eq!(default_log_file(NodeId::new(3)), PathBuf::from("log_node3.txt"));
    }

    #[test]
    fn file_layer_appends_plain_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_node1.txt");
        std::fs::write(&path, "earlier run\n").unwrap();

        let subscriber = tracing_subscriber::registry().with(file_layer(&path).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            info!(node = 1, "sending REPLY to node 2");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "earlier run");
        assert!(lines[1].contains("sending REPLY to node 2"), "{}", lines[1]);
        assert!(lines[1].contains("node=1"));
        assert!(!lines[1].contains('\u{1b}'));
    }
}
