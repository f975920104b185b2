use std::collections::HashMap;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread;

/// The error type for [`Storage`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key cannot be mapped onto the backing store.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    /// The backing store failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// A string-keyed store of string values, in the manner of a browser's
/// local storage.
pub trait Storage: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A [`Storage`] that keeps one file per key inside a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash never leaves a half-written value behind. They are applied in
/// order on a background thread, so `set` and `remove` never wait for the
/// disk. Reads see pending writes. Dropping the last clone waits until every
/// pending write has landed.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
    writer: Arc<Writer>,
}

impl FileStorage {
    /// Creates a storage rooted at `dir`. The directory is created on the
    /// first write.
    #[inline]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            writer: Arc::default(),
        }
    }

    /// Returns the root directory.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let is_key_char =
            |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
        let is_valid = !key.is_empty()
            && !key.starts_with('.')
            && key.chars().all(is_key_char);
        if !is_valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(key))
    }

    fn enqueue(
        &self,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), StorageError> {
        self.path_for(key)?;
        let value = value.map(str::to_owned);

        let mut guard = lock(&self.writer.queue);
        let mut queue = match guard.take() {
            Some(queue) => queue,
            None => self.start_writer()?,
        };

        let seq = queue.next_seq;
        queue.next_seq += 1;
        lock(&self.writer.pending).insert(
            key.to_owned(),
            PendingWrite {
                seq,
                value: value.clone(),
            },
        );
        let op = WriteOp {
            seq,
            key: key.to_owned(),
            value,
        };
        if queue.tx.send(op).is_err() {
            lock(&self.writer.pending).remove(key);
            return Err(io::Error::other("storage writer has stopped").into());
        }
        *guard = Some(queue);
        Ok(())
    }

    fn start_writer(&self) -> io::Result<WriteQueue> {
        let (tx, rx) = mpsc::channel();
        let dir = self.dir.clone();
        let pending = Arc::clone(&self.writer.pending);
        let handle = thread::Builder::new()
            .name("bhaiya-storage".to_owned())
            .spawn(move || run_writer(&dir, &pending, rx))?;
        Ok(WriteQueue {
            tx,
            handle,
            next_seq: 0,
        })
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        if let Some(write) = lock(&self.writer.pending).get(key) {
            return Ok(write.value.clone());
        }
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[inline]
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.enqueue(key, Some(value))
    }

    #[inline]
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.enqueue(key, None)
    }
}

#[derive(Debug, Default)]
struct Writer {
    // Writes not yet on disk. A `None` value is a pending removal.
    pending: Arc<Mutex<HashMap<String, PendingWrite>>>,
    queue: Mutex<Option<WriteQueue>>,
}

impl Drop for Writer {
    fn drop(&mut self) {
        let queue = self
            .queue
            .get_mut()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(WriteQueue { tx, handle, .. }) = queue {
            drop(tx);
            if handle.join().is_err() {
                error!("storage writer panicked");
            }
        }
    }
}

#[derive(Debug)]
struct WriteQueue {
    tx: mpsc::Sender<WriteOp>,
    handle: thread::JoinHandle<()>,
    next_seq: u64,
}

#[derive(Debug)]
struct PendingWrite {
    seq: u64,
    value: Option<String>,
}

#[derive(Debug)]
struct WriteOp {
    seq: u64,
    key: String,
    value: Option<String>,
}

fn run_writer(
    dir: &Path,
    pending: &Mutex<HashMap<String, PendingWrite>>,
    rx: mpsc::Receiver<WriteOp>,
) {
    for op in rx {
        let result = match &op.value {
            Some(value) => write_file(dir, &op.key, value),
            None => remove_file(&dir.join(&op.key)),
        };
        if let Err(err) = result {
            warn!(key = op.key, "cannot write storage key: {err}");
        }

        let mut pending = lock(pending);
        if pending.get(&op.key).is_some_and(|write| write.seq == op.seq) {
            pending.remove(&op.key);
        }
    }
    trace!("storage writer finished");
}

fn write_file(dir: &Path, key: &str, value: &str) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(key);
    let tmp_path = dir.join(format!(".{key}.tmp"));
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp_path, &path)?;
    trace!(?path, len = value.len(), "wrote storage key");
    Ok(())
}

fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// A [`Storage`] that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[inline]
    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        lock(&self.entries)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
