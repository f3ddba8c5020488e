use crate::value::MetricValue;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("summary log {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode summary event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One recorded metric value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub step: u64,
    pub wall_time: f64,
    pub tag: String,
    pub value: MetricValue,
}

/// Sink for per-step metric values.
pub trait SummaryWriter {
    fn write(&mut self, step: u64, tag: &str, value: MetricValue) -> Result<(), WriterError>;

    fn flush(&mut self) -> Result<(), WriterError> {
        Ok(())
    }

    fn scalar(&mut self, step: u64, tag: &str, value: f64) -> Result<(), WriterError> {
        self.write(step, tag, MetricValue::Scalar(value))
    }
}

fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Appends events as JSON lines to a single file.
#[derive(Debug)]
pub struct JsonlSummaryWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonlSummaryWriter {
    /// Creates `<log_dir>/<unix-seconds>/train/events.jsonl`.
    pub fn create_in(log_dir: impl AsRef<Path>) -> Result<Self, WriterError> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = log_dir
            .as_ref()
            .join(stamp.to_string())
            .join("train")
            .join("events.jsonl");
        Self::open(path)
    }

    /// Opens `path` for appending, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WriterError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| WriterError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WriterError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "opened summary log");
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SummaryWriter for JsonlSummaryWriter {
    fn write(&mut self, step: u64, tag: &str, value: MetricValue) -> Result<(), WriterError> {
        let event = SummaryEvent {
            step,
            wall_time: wall_time(),
            tag: tag.to_string(),
            value,
        };
        serde_json::to_writer(&mut self.out, &event)?;
        self.out
            .write_all(b"\n")
            .map_err(|source| WriterError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn flush(&mut self) -> Result<(), WriterError> {
        self.out.flush().map_err(|source| WriterError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for JsonlSummaryWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

/// Keeps events in memory; used by tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemorySummaryWriter {
    events: Vec<SummaryEvent>,
}

impl MemorySummaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SummaryEvent] {
        &self.events
    }

    /// Events recorded under `tag`, in write order.
    pub fn tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a SummaryEvent> + 'a {
        self.events.iter().filter(move |event| event.tag == tag)
    }
}

impl SummaryWriter for MemorySummaryWriter {
    fn write(&mut self, step: u64, tag: &str, value: MetricValue) -> Result<(), WriterError> {
        self.events.push(SummaryEvent {
            step,
            wall_time: wall_time(),
            tag: tag.to_string(),
            value,
        });
        Ok(())
    }
}
