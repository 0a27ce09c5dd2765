//! JSONL transcript writer.
//!
//! Each [`ConversationEvent`] becomes one JSON line carrying its `type`,
//! a `timestamp` and a per-run `seq` number alongside the payload. Runs
//! append to the same file; `seq` restarts at 0 for each run.

use serde_json::{Value, json};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use wrp_application::ports::conversation_logger::{ConversationEvent, ConversationLogger};

/// Thread-safe via `Mutex<BufWriter<File>>`. Every line is flushed so the
/// transcript survives a crash.
pub struct JsonlConversationLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    seq: AtomicU64,
}

impl JsonlConversationLogger {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
            seq: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, event: ConversationEvent) -> Value {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        match event.payload {
            Value::Object(mut map) => {
                map.insert("type".into(), Value::String(event.event_type.to_string()));
                map.insert("timestamp".into(), Value::String(timestamp));
                map.insert("seq".into(), json!(seq));
                Value::Object(map)
            }
            other => json!({
                "type": event.event_type,
                "timestamp": timestamp,
                "seq": seq,
                "data": other,
            }),
        }
    }
}

impl ConversationLogger for JsonlConversationLogger {
    fn log(&self, event: ConversationEvent) {
        let Ok(line) = serde_json::to_string(&self.record(event)) else {
            return;
        };
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if writeln!(writer, "{line}").and_then(|_| writer.flush()).is_err() {
            tracing::debug!(path = %self.path.display(), "Conversation log write failed");
        }
    }
}
