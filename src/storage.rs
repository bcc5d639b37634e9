use bytes::Bytes;
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::instrument;

/// Scratch directory inside the upload root. Being a directory, it is never
/// picked up by the flat scan of the root.
const PARTIAL_DIR: &str = ".partial";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Flat directory of uploaded files with an in-memory manifest of its entries.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    manifest: RwLock<BTreeMap<String, PathBuf>>,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(io_error(&root))?;
        let entries = scan_dir(&root).await?;

        tracing::info!("Opened upload directory {:?} with {} files", root, entries.len());

        Ok(Self {
            root,
            manifest: RwLock::new(entries),
            write_lock: Mutex::new(()),
        })
    }

    /// Writes `content` to `<root>/<filename>`, replacing any previous file of
    /// the same name. The bytes land in a scratch file first and are renamed
    /// into place, so a reader sees either the old or the new content.
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub async fn save(&self, filename: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        validate_filename(filename)?;

        let _guard = self.write_lock.lock().await;

        let partial_dir = self.root.join(PARTIAL_DIR);
        fs::create_dir_all(&partial_dir)
            .await
            .map_err(io_error(&partial_dir))?;

        // Fixed-length scratch name: `filename` may already sit at NAME_MAX.
        let partial = partial_dir.join(format!("{:016x}.part", rand::random::<u64>()));
        fs::write(&partial, content)
            .await
            .map_err(io_error(&partial))?;

        let target = self.root.join(filename);
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(StorageError::Io {
                path: target,
                source: e,
            });
        }

        self.manifest
            .write()
            .insert(filename.to_string(), target.clone());

        tracing::debug!("Stored {:?}", target);
        Ok(target)
    }

    /// Resolves an image id to a stored file. A file named exactly `id` wins,
    /// otherwise the first filename in lexicographic order containing `id`.
    /// Candidates are checked against the disk: entries whose file is gone
    /// are dropped, and on a miss the directory is rescanned once so that
    /// files copied in from outside the service are found too.
    #[instrument(skip(self))]
    pub async fn find_by_substring(&self, id: &str) -> Result<Option<PathBuf>, StorageError> {
        if id.is_empty() {
            return Ok(None);
        }

        if validate_filename(id).is_ok() {
            let exact = self.root.join(id);
            if is_file(&exact).await {
                self.manifest.write().insert(id.to_string(), exact.clone());
                return Ok(Some(exact));
            }
        }

        if let Some(path) = self.first_live_match(id).await {
            return Ok(Some(path));
        }

        self.refresh().await?;
        Ok(self.first_live_match(id).await)
    }

    pub async fn read(&self, path: &Path) -> Result<Bytes, StorageError> {
        let content = fs::read(path).await.map_err(io_error(path))?;
        Ok(Bytes::from(content))
    }

    pub async fn refresh(&self) -> Result<(), StorageError> {
        let entries = scan_dir(&self.root).await?;
        *self.manifest.write() = entries;
        Ok(())
    }

    /// First manifest entry containing `id` whose file still exists. Stale
    /// entries met on the way are removed.
    async fn first_live_match(&self, id: &str) -> Option<PathBuf> {
        let candidates: Vec<(String, PathBuf)> = self
            .manifest
            .read()
            .iter()
            .filter(|(name, _)| name.contains(id))
            .map(|(name, path)| (name.clone(), path.clone()))
            .collect();

        for (name, path) in candidates {
            if is_file(&path).await {
                return Some(path);
            }
            tracing::debug!("Dropping stale manifest entry {:?}", name);
            self.manifest.write().remove(&name);
        }
        None
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Rejects names that would resolve outside the upload root or collide with
/// the scratch directory.
pub fn validate_filename(filename: &str) -> Result<(), StorageError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename == PARTIAL_DIR
        || filename.contains(['/', '\\', '\0'])
        || Path::new(filename).is_absolute();

    if invalid {
        return Err(StorageError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

async fn scan_dir(root: &Path) -> Result<BTreeMap<String, PathBuf>, StorageError> {
    let mut entries = BTreeMap::new();

    let mut dir = match fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(io_error(root)(e)),
    };

    while let Some(entry) = dir.next_entry().await.map_err(io_error(root))? {
        let file_type = entry.file_type().await.map_err(io_error(root))?;
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                entries.insert(name, entry.path());
            }
            Err(name) => tracing::warn!("Skipping non UTF-8 filename {:?}", name),
        }
    }

    Ok(entries)
}
