//! Shared ledger file.
//!
//! Every node of a cluster appends one line per entry and one per exit to
//! the same file:
//!
//! ```text
//! Node 1 ENTERED CS at 1718000000123
//! Node 1 EXITING CS at 1718000002125
//! ```
//!
//! The timestamp is wall-clock Unix milliseconds. Lines are written with a
//! single append, so concurrent writers on one host do not interleave.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, UNIX_EPOCH},
};

use lamport_core::event::{EventKind, EventRecord, EventSink};
use lamport_proto::{NodeId, Timestamp};
use tracing::warn;

/// [`EventSink`] appending to a ledger file.
#[derive(Debug)]
pub struct FileEventSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileEventSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Ledger file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileEventSink {
    // Runs inline on the calling tokio worker. Two short appends per
    // critical section; ordering with the section boundary matters more
    // than the worker time.
    fn record(&self, record: EventRecord) {
        let line = format_line(&record);
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(error) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
            warn!(node = %record.node, path = %self.path.display(), %error, "ledger write failed");
        }
    }
}

/// One ledger line, newline included.
pub fn format_line(record: &EventRecord) -> String {
    let millis = record.at.duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis());
    format!("Node {} {} CS at {}\n", record.node, record.kind, millis)
}

/// Parse one ledger line. The clock is not stored and comes back as zero.
pub fn parse_line(line: &str) -> Option<EventRecord> {
    let mut words = line.split_whitespace();
    if words.next()? != "Node" {
        return None;
    }
    let node: NodeId = words.next()?.parse().ok()?;
    let kind = match words.next()? {
        "ENTERED" => EventKind::Entered,
        "EXITING" => EventKind::Exited,
        _ => return None,
    };
    if words.next()? != "CS" || words.next()? != "at" {
        return None;
    }
    let millis: u64 = words.next()?.parse().ok()?;

    Some(EventRecord {
        node,
        kind,
        clock: Timestamp::ZERO,
        at: UNIX_EPOCH + Duration::from_millis(millis),
    })
}

/// Read a whole ledger file, skipping lines that do not parse.
pub fn read_ledger(path: impl AsRef<Path>) -> io::Result<Vec<EventRecord>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.lines().filter_map(parse_line).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(node: u64, kind: EventKind, millis: u64) -> EventRecord {
        EventRecord {
            node: NodeId::new(node),
            kind,
            clock: Timestamp::new(9),
            at: UNIX_EPOCH + Duration::from_millis(millis),
        }
    }

    #[test]
    fn line_format() {
        assert_eq!(
            format_line(&record(2, EventKind::Entered, 1_718_000_000_123)),
            "Node 2 ENTERED CS at 1718000000123\n"
        );
        assert_eq!(format_line(&record(2, EventKind::Exited, 5)), "Node 2 EXITING CS at 5\n");
    }

    #[test]
    fn parse_reads_back_everything_but_the_clock() {
        let original = record(3, EventKind::Exited, 42);
        let parsed = parse_line(&format_line(&original)).unwrap();
        assert_eq!(parsed.node, original.node);
        assert_eq!(parsed.kind, original.kind);
        assert_eq!(parsed.at, original.at);
        assert_eq!(parsed.clock, Timestamp::ZERO);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_line("").is_none());
        assert!(parse_line("Node x ENTERED CS at 1").is_none());
        assert!(parse_line("Node 1 LEFT CS at 1").is_none());
        assert!(parse_line("Node 1 ENTERED CS at").is_none());
    }

    #[test]
    fn sink_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        std::fs::write(&path, "Node 9 ENTERED CS at 1\n").unwrap();

        let sink = FileEventSink::open(&path).unwrap();
        sink.record(record(1, EventKind::Entered, 10));
        sink.record(record(1, EventKind::Exited, 20));

        let records = read_ledger(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].node, NodeId::new(9));
        assert_eq!(records[2].kind, EventKind::Exited);
    }
}
