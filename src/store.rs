//! Server records and their log streams on disk.

use std::{
    collections::HashMap,
    fmt::Debug,
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
};

use async_trait::async_trait;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};
use tracing::warn;

use crate::{config::LogRecord, error::StoreError, server::ServerRecord};

/// Bytes read per step when tailing a log file from its end.
const TAIL_CHUNK: u64 = 64 * 1024;

/// Record store consumed by the registry and the supervisors. Each call is
/// atomic with respect to the others.
#[async_trait]
pub trait Store: Send + Sync + Debug {
    async fn load_all(&self) -> Result<Vec<ServerRecord>, StoreError>;

    async fn upsert(&self, record: &ServerRecord) -> Result<(), StoreError>;

    async fn delete(&self, port: u16) -> Result<(), StoreError>;

    async fn append_log(&self, port: u16, record: &LogRecord) -> Result<(), StoreError>;

    /// The last `limit` records of `port`, oldest first.
    async fn read_logs(&self, port: u16, limit: usize) -> Result<Vec<LogRecord>, StoreError>;

    async fn delete_logs(&self, port: u16) -> Result<(), StoreError>;
}

fn io_err(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Last `limit` non-empty lines of `path`, read backwards from the end in
/// bounded chunks. A missing file has no lines.
async fn tail_lines(path: &Path, limit: usize) -> std::io::Result<Vec<String>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut file = match fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut pos = file.metadata().await?.len();
    let mut buf: Vec<u8> = Vec::new();
    while pos > 0 {
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos)).await?;

        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&buf);
        buf = chunk;

        if buf.iter().filter(|b| **b == b'\n').count() > limit {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.lines();
    // Reading stopped mid-file, so the first line may be cut.
    if pos > 0 {
        lines.next();
    }
    let lines: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(limit);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}

/// JSON documents under `<root>/servers/<port>.json` and JSON lines under
/// `<root>/logs/<port>.jsonl`. Writes for one port are serialized; ports do
/// not wait on each other.
#[derive(Debug)]
pub struct JsonStore {
    root: PathBuf,
    locks: StdMutex<HashMap<u16, Arc<Mutex<()>>>>,
}

impl JsonStore {
    pub async fn open(root: PathBuf) -> Result<Self, StoreError> {
        for dir in [root.join("servers"), root.join("logs")] {
            fs::create_dir_all(&dir).await.map_err(|e| io_err(&dir, e))?;
        }
        Ok(Self {
            root,
            locks: StdMutex::new(HashMap::new()),
        })
    }

    fn lock_for(&self, port: u16) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(port)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn record_path(&self, port: u16) -> PathBuf {
        self.root.join("servers").join(format!("{port}.json"))
    }

    fn log_path(&self, port: u16) -> PathBuf {
        self.root.join("logs").join(format!("{port}.jsonl"))
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn load_all(&self) -> Result<Vec<ServerRecord>, StoreError> {
        let dir = self.root.join("servers");

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&dir).await.map_err(|e| io_err(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let data = fs::read(&path).await.map_err(|e| io_err(&path, e))?;
            let record: ServerRecord =
                serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            records.push(record);
        }

        records.sort_by_key(|r| r.port);
        Ok(records)
    }

    async fn upsert(&self, record: &ServerRecord) -> Result<(), StoreError> {
        let lock = self.lock_for(record.port);
        let _guard = lock.lock().await;
        let path = self.record_path(record.port);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut out = fs::File::create(&tmp).await.map_err(|e| io_err(&tmp, e))?;
        out.write_all(&json).await.map_err(|e| io_err(&tmp, e))?;
        out.sync_all().await.map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_err(&path, e))
    }

    async fn delete(&self, port: u16) -> Result<(), StoreError> {
        let lock = self.lock_for(port);
        let _guard = lock.lock().await;
        remove_if_exists(&self.record_path(port)).await
    }

    async fn append_log(&self, port: u16, record: &LogRecord) -> Result<(), StoreError> {
        let lock = self.lock_for(port);
        let _guard = lock.lock().await;
        let path = self.log_path(port);

        let mut line = serde_json::to_vec(record).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_err(&path, e))?;
        out.write_all(&line).await.map_err(|e| io_err(&path, e))
    }

    async fn read_logs(&self, port: u16, limit: usize) -> Result<Vec<LogRecord>, StoreError> {
        let path = self.log_path(port);
        let lines = {
            let lock = self.lock_for(port);
            let _guard = lock.lock().await;
            tail_lines(&path, limit).await.map_err(|e| io_err(&path, e))?
        };

        let mut out = Vec::with_capacity(lines.len());
        for line in &lines {
            match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => out.push(record),
                Err(e) => warn!(port, error = %e, "skipping unreadable log line"),
            }
        }
        Ok(out)
    }

    async fn delete_logs(&self, port: u16) -> Result<(), StoreError> {
        let lock = self.lock_for(port);
        let _guard = lock.lock().await;
        remove_if_exists(&self.log_path(port)).await
    }
}
