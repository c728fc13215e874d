//! Durable-on-shutdown spill for pulled-but-unloaded envelopes.
//!
//! One envelope per line, canonical JSON. Written when the loop stops
//! with a non-empty accumulator, read (and then superseded) on the next
//! startup. A corrupt line is logged and skipped; it would never load
//! anyway.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use ugc_core::envelope::Envelope;

/// Line-delimited JSON spill file.
#[derive(Debug, Clone)]
pub struct SpillStorage {
    path: PathBuf,
}

impl SpillStorage {
    /// A spill at `path`; the file is created lazily on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The spill file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every decodable envelope; a missing file is an empty spill.
    #[must_use]
    pub fn read(&self) -> Vec<Envelope> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(_) => return Vec::new(),
        };
        let mut envelopes = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match Envelope::from_wire(line.as_bytes()) {
                Ok(envelope) => envelopes.push(envelope),
                Err(err) => {
                    tracing::warn!(line = index + 1, error = %err, "corrupt spill line skipped");
                }
            }
        }
        envelopes
    }

    /// Replace the spill contents with `envelopes`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; the caller logs and carries on
    /// (the bus still holds the uncommitted batch).
    pub fn write(&self, envelopes: &[Envelope]) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for envelope in envelopes {
            let line = envelope
                .to_wire()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
            writer.write_all(&line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        tracing::info!(count = envelopes.len(), path = %self.path.display(), "spill written");
        Ok(())
    }

    /// Truncate the spill after its contents have been loaded.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn clear(&self) -> std::io::Result<()> {
        if self.path.exists() {
            File::create(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;
    use ugc_core::envelope::EventType;
    use url::Url;
    use uuid::Uuid;

    fn envelope() -> Envelope {
        Envelope {
            event_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            server_ts: DateTime::from_timestamp(1_700_000_001, 0).unwrap(),
            eventbus_ts: DateTime::from_timestamp(1_700_000_002, 0).unwrap(),
            url: Url::parse("https://practix.example/").unwrap(),
            event_type: EventType::Visit,
            event_subtype: None,
            payload: Some(json!({})),
        }
    }

    #[test]
    fn write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillStorage::new(dir.path().join("spill.jsonl"));

        let envelopes = vec![envelope(), envelope(), envelope()];
        spill.write(&envelopes).unwrap();
        assert_eq!(spill.read(), envelopes);

        spill.clear().unwrap();
        assert!(spill.read().is_empty());
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let spill = SpillStorage::new(dir.path().join("absent.jsonl"));
        assert!(spill.read().is_empty());
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill.jsonl");
        let spill = SpillStorage::new(path.clone());

        let good = envelope();
        let mut contents = String::from_utf8(good.to_wire().unwrap()).unwrap();
        contents.push_str("\nnot json at all\n");
        std::fs::write(&path, contents).unwrap();

        let read = spill.read();
        assert_eq!(read, vec![good]);
    }
}
