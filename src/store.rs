//! Document storage: the in-memory text store of record and the on-disk upload archive.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Opaque identifier assigned to a document at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Interpret client-supplied text; anything that is not a UUID cannot name a document.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Storage for extracted document text.
///
/// Documents are immutable once stored and live for the lifetime of the process.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store text under a newly generated identifier.
    async fn put(&self, text: String) -> DocumentId;

    /// Fetch the text stored under `id`.
    async fn get(&self, id: &DocumentId) -> Option<Arc<str>>;

    /// Enumerate every stored identifier.
    async fn list(&self) -> Vec<DocumentId>;
}

#[derive(Default)]
struct StoreInner {
    texts: HashMap<DocumentId, Arc<str>>,
    order: Vec<DocumentId>,
}

/// Process-lifetime store guarded by a read-write lock.
///
/// `list` returns identifiers in upload order.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Whether no document has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, text: String) -> DocumentId {
        let text: Arc<str> = Arc::from(text);
        let mut inner = self.inner.write().await;
        let mut id = DocumentId::new();
        while inner.texts.contains_key(&id) {
            id = DocumentId::new();
        }
        inner.texts.insert(id, text);
        inner.order.push(id);
        tracing::debug!(document_id = %id, total = inner.order.len(), "Stored document text");
        id
    }

    async fn get(&self, id: &DocumentId) -> Option<Arc<str>> {
        self.inner.read().await.texts.get(id).cloned()
    }

    async fn list(&self) -> Vec<DocumentId> {
        self.inner.read().await.order.clone()
    }
}

/// Directory holding one `<document_id>.pdf` file per upload.
///
/// The archive is redundant storage for audit and recovery; answers are served from the
/// in-memory store.
#[derive(Debug, Clone)]
pub struct UploadArchive {
    dir: PathBuf,
}

impl UploadArchive {
    /// Create the archive directory if needed.
    pub async fn prepare(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory receiving uploads.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the upload for `id` is written to.
    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{id}.pdf"))
    }

    /// Write the raw upload bytes; the file handle is closed before returning on every path.
    pub async fn write(&self, id: &DocumentId, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.path_for(id);
        {
            let mut file = tokio::fs::File::create(&path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
        }
        Ok(path)
    }
}
