//! Append-only JSON-lines document store.
//!
//! Each collection is one file, `{dir}/{collection}.jsonl`, holding one
//! serialized [`StoredDocument`] per line in insertion order. Writes are
//! appends synced to disk before they are acknowledged. Reads walk the file
//! backwards in fixed-size chunks and stop once enough documents are found,
//! so startup cost does not grow with the journal.
//!
//! A process killed mid-write can leave a truncated last line. Lines that
//! fail to parse are skipped on read. The first append after reopening such
//! a file starts a fresh line so the new document stays readable.

use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::application::ports::{DocumentStore, StoreError, StoredDocument};

const FILE_EXTENSION: &str = "jsonl";

/// Bytes read per step when scanning a journal from its end.
const READ_CHUNK: u64 = 64 * 1024;

/// File-backed implementation of `DocumentStore`.
#[derive(Debug)]
pub struct JournalDocumentStore {
    dir: PathBuf,
    // One append handle per collection, opened lazily. The lock also
    // serializes reads against in-flight appends.
    files: Mutex<HashMap<String, File>>,
}

impl JournalDocumentStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "Opened journal document store");

        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Directory the store writes to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, collection: &str) -> Result<PathBuf, StoreError> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidCollection(collection.to_string()));
        }
        Ok(self.dir.join(format!("{collection}.{FILE_EXTENSION}")))
    }
}

/// Open a journal for appending, terminating a truncated last line.
async fn open_for_append(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await?;

    let len = file.metadata().await?.len();
    if len > 0 {
        file.seek(SeekFrom::Start(len - 1)).await?;
        let mut last = [0_u8; 1];
        file.read_exact(&mut last).await?;
        if last[0] != b'\n' {
            tracing::warn!(path = %path.display(), "Journal ends mid-line, starting a new line");
            file.write_all(b"\n").await?;
        }
    }

    Ok(file)
}

/// A file's lines, last to first.
struct ReverseLines {
    file: File,
    // Bytes before this offset have not been read yet.
    pos: u64,
    // Read but not yet returned; starts at `pos`.
    buf: Vec<u8>,
}

impl ReverseLines {
    async fn new(file: File) -> io::Result<Self> {
        let pos = file.metadata().await?.len();
        Ok(Self {
            file,
            pos,
            buf: Vec::new(),
        })
    }

    /// The next line towards the start of the file, without its newline.
    /// Empty lines are skipped.
    async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(i) = self.buf.iter().rposition(|&b| b == b'\n') {
                let line = self.buf.split_off(i + 1);
                self.buf.truncate(i);
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }

            if self.pos == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buf)));
            }

            let chunk = self.pos.min(READ_CHUNK);
            self.pos -= chunk;
            self.file.seek(SeekFrom::Start(self.pos)).await?;
            let mut bytes = vec![0; usize::try_from(chunk).map_err(io::Error::other)?];
            self.file.read_exact(&mut bytes).await?;
            bytes.extend_from_slice(&self.buf);
            self.buf = bytes;
        }
    }
}

#[async_trait]
impl DocumentStore for JournalDocumentStore {
    async fn insert(&self, collection: &str, document: StoredDocument) -> Result<(), StoreError> {
        let path = self.path_for(collection)?;
        let mut line = serde_json::to_vec(&document)?;
        line.push(b'\n');

        let mut files = self.files.lock().await;
        let file = match files.entry(collection.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(open_for_append(&path).await?)
            }
        };

        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn find_recent(
        &self,
        collection: &str,
        exchange: &str,
        pair: &str,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let path = self.path_for(collection)?;

        let _files = self.files.lock().await;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = ReverseLines::new(file).await?;
        let mut found = Vec::new();
        let mut skipped = 0_usize;
        while found.len() < limit {
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<StoredDocument>(&line) {
                Ok(d) if d.exchange == exchange && d.pair == pair => found.push(d),
                Ok(_) => {}
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(
                path = %path.display(),
                skipped,
                "Skipped corrupt journal lines"
            );
        }

        Ok(found)
    }
}
