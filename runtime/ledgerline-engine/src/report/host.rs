use super::{PostingMode, ReportKind};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Supplies the byte sink behind each report.
pub trait ReportHost: Send + Sync {
    fn open(&self, title: &str, kind: ReportKind, mode: PostingMode) -> io::Result<Box<dyn Write + Send>>;
}

/// Writes each report to `<dir>/<title>.xml` or `<dir>/<title>.txt`.
///
/// Files are created fresh: an existing file is never truncated, and two
/// titles that sanitize to the same file name are rejected.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    dir: PathBuf,
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl DirectoryHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            claimed: Arc::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, title: &str, kind: ReportKind) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sanitize_title(title), kind.extension()))
    }
}

impl ReportHost for DirectoryHost {
    fn open(&self, title: &str, kind: ReportKind, mode: PostingMode) -> io::Result<Box<dyn Write + Send>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(title, kind);
        let mut claimed = self.claimed.lock().unwrap();
        if claimed.contains(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("report file {} is already used by another title", path.display()),
            ));
        }
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        claimed.insert(path.clone());
        tracing::debug!(path = %path.display(), %mode, "report file created");
        Ok(Box::new(file))
    }
}

/// File-name-safe form of a report title.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "report".to_string()
    } else {
        cleaned
    }
}

/// Keeps every report in memory; contents stay readable after close.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    buffers: Arc<Mutex<HashMap<String, SharedBuffer>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, title: &str) -> Option<String> {
        let buffers = self.buffers.lock().unwrap();
        buffers.get(title).map(SharedBuffer::to_string_lossy)
    }

    pub fn titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.buffers.lock().unwrap().keys().cloned().collect();
        titles.sort();
        titles
    }
}

impl ReportHost for MemoryHost {
    fn open(&self, title: &str, _kind: ReportKind, _mode: PostingMode) -> io::Result<Box<dyn Write + Send>> {
        let buffer = SharedBuffer::default();
        self.buffers
            .lock()
            .unwrap()
            .insert(title.to_string(), buffer.clone());
        Ok(Box::new(buffer))
    }
}

#[derive(Debug, Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
