use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{AppError, AppResult};

pub const DATA_DIR_ENV: &str = "FACEGATE_DATA_DIR";
pub const TEMPLATE_FILE: &str = "templates.json";
pub const ADMIN_SECRET_FILE: &str = "admin_secret";
pub const AUDIT_LOG_FILE: &str = "auth.log";

/// One embedding produced by the external embedder for a single face crop.
pub type EmbeddingVector = Vec<f64>;

/// Enrolled templates keyed by identity.
///
/// Identities iterate in lexicographic order and never map to an empty
/// sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateStore {
    identities: BTreeMap<String, Vec<EmbeddingVector>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub identity: String,
    pub templates: usize,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a template and returns the identity's new template count.
    pub fn push(&mut self, identity: &str, vector: EmbeddingVector) -> usize {
        let templates = self.identities.entry(identity.to_string()).or_default();
        templates.push(vector);
        templates.len()
    }

    pub fn templates(&self, identity: &str) -> &[EmbeddingVector] {
        self.identities
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[EmbeddingVector])> {
        self.identities
            .iter()
            .map(|(identity, templates)| (identity.as_str(), templates.as_slice()))
    }

    pub fn contains(&self, identity: &str) -> bool {
        !self.templates(identity).is_empty()
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn template_count(&self) -> usize {
        self.identities.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn summaries(&self) -> Vec<IdentitySummary> {
        self.iter()
            .map(|(identity, templates)| IdentitySummary {
                identity: identity.to_string(),
                templates: templates.len(),
            })
            .collect()
    }

    fn prune_empty(mut self) -> Self {
        self.identities.retain(|_, templates| !templates.is_empty());
        self
    }
}

impl FromIterator<(String, EmbeddingVector)> for TemplateStore {
    fn from_iter<I: IntoIterator<Item = (String, EmbeddingVector)>>(iter: I) -> Self {
        let mut store = TemplateStore::new();
        for (identity, vector) in iter {
            store.push(&identity, vector);
        }
        store
    }
}

pub trait FaceStore {
    fn load(&self) -> AppResult<TemplateStore>;
    fn save(&self, store: &TemplateStore) -> AppResult<()>;
    /// Appends one template and persists it, returning the identity's new
    /// template count.
    fn add_template(&self, identity: &str, vector: EmbeddingVector) -> AppResult<usize>;
}

impl<T: FaceStore + ?Sized> FaceStore for &T {
    fn load(&self) -> AppResult<TemplateStore> {
        (**self).load()
    }

    fn save(&self, store: &TemplateStore) -> AppResult<()> {
        (**self).save(store)
    }

    fn add_template(&self, identity: &str, vector: EmbeddingVector) -> AppResult<usize> {
        (**self).add_template(identity, vector)
    }
}

/// JSON template file replaced atomically on every write.
///
/// Writers inside one process are serialized, so two enrollment flows cannot
/// drop each other's templates.
#[derive(Debug)]
pub struct FilesystemFaceStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl FilesystemFaceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(TEMPLATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FaceStore for FilesystemFaceStore {
    fn load(&self) -> AppResult<TemplateStore> {
        read_template_store(&self.path)
    }

    fn save(&self, store: &TemplateStore) -> AppResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        write_template_store(&self.path, store)
    }

    fn add_template(&self, identity: &str, vector: EmbeddingVector) -> AppResult<usize> {
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut store = read_template_store(&self.path)?;
        let count = store.push(identity, vector);
        write_template_store(&self.path, &store)?;
        debug!(identity, templates = count, "template persisted");
        Ok(count)
    }
}

pub trait DataDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf;
}

/// Resolves the data directory from an explicit override, then
/// `$FACEGATE_DATA_DIR`, then the configured default.
#[derive(Debug, Clone)]
pub struct EnvDataDirResolver {
    fallback: PathBuf,
}

impl EnvDataDirResolver {
    pub fn new(fallback: impl Into<PathBuf>) -> Self {
        Self {
            fallback: fallback.into(),
        }
    }
}

impl Default for EnvDataDirResolver {
    fn default() -> Self {
        Self::new(facegate_config::DEFAULT_DATA_DIR)
    }
}

impl DataDirResolver for EnvDataDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            dir.to_path_buf()
        } else if let Ok(env_value) = env::var(DATA_DIR_ENV) {
            PathBuf::from(env_value)
        } else {
            self.fallback.clone()
        }
    }
}

pub fn read_template_store(path: &Path) -> AppResult<TemplateStore> {
    if !path.exists() {
        return Ok(TemplateStore::new());
    }

    let data = fs::read(path).map_err(|source| AppError::StorageRead {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice::<TemplateStore>(&data)
        .map(TemplateStore::prune_empty)
        .map_err(|err| AppError::InvalidStoreFile {
            path: path.to_path_buf(),
            message: format!("invalid template store contents: {err}"),
        })
}

pub fn write_template_store(path: &Path, store: &TemplateStore) -> AppResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| AppError::StorageWrite {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| AppError::StorageWrite {
        path: path.to_path_buf(),
        source,
    })?;

    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            serde_json::to_writer(&mut writer, store)?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|source| AppError::StorageWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        file.sync_all().map_err(|source| AppError::StorageWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let file = tmp.persist(path).map_err(|err| AppError::StorageWrite {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file
            .metadata()
            .map_err(|source| AppError::StorageWrite {
                path: path.to_path_buf(),
                source,
            })?
            .permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)
            .map_err(|source| AppError::StorageWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }
    #[cfg(not(unix))]
    drop(file);

    Ok(())
}
