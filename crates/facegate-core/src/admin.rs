use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::store::ADMIN_SECRET_FILE;

/// Accepted only while no credential has been stored.
pub const BOOTSTRAP_SECRET: &str = "admin";

/// The single admin secret gating enrollment, kept as an Argon2id PHC string.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    path: PathBuf,
}

impl AdminCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(ADMIN_SECRET_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_set(&self) -> bool {
        self.path.is_file()
    }

    pub fn set(&self, secret: &str) -> AppResult<()> {
        if secret.is_empty() {
            return Err(AppError::validation("admin secret must not be empty"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|err| AppError::validation(format!("failed to hash admin secret: {err}")))?
            .to_string();

        write_secret_file(&self.path, &hash)?;
        info!(path = %self.path.display(), "admin credential stored");
        Ok(())
    }

    pub fn verify(&self, candidate: &str) -> AppResult<bool> {
        let stored = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(candidate == BOOTSTRAP_SECRET);
            }
            Err(source) => {
                return Err(AppError::StorageRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let parsed = PasswordHash::new(stored.trim()).map_err(|err| AppError::InvalidStoreFile {
            path: self.path.clone(),
            message: format!("admin secret is not a valid password hash: {err}"),
        })?;
        let matches = Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok();
        if !matches {
            warn!("admin secret mismatch");
        }
        Ok(matches)
    }
}

fn write_secret_file(path: &Path, contents: &str) -> AppResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let to_write_error = |source: io::Error| AppError::StorageWrite {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(parent).map_err(|source| AppError::StorageWrite {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(to_write_error)?;
    writeln!(tmp, "{contents}").map_err(to_write_error)?;
    tmp.as_file().sync_all().map_err(to_write_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(to_write_error)?;
    }

    tmp.persist(path)
        .map_err(|err| to_write_error(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bootstrap_default_applies_until_first_setup() {
        let tmp = TempDir::new().unwrap();
        let creds = AdminCredentials::in_dir(tmp.path());
        assert!(!creds.is_set());
        assert!(creds.verify(BOOTSTRAP_SECRET).unwrap());
        assert!(!creds.verify("s3cret").unwrap());
    }

    #[test]
    fn stored_secret_replaces_bootstrap_default() {
        let tmp = TempDir::new().unwrap();
        let creds = AdminCredentials::in_dir(tmp.path());
        creds.set("s3cret").unwrap();

        assert!(creds.is_set());
        assert!(creds.verify("s3cret").unwrap());
        assert!(!creds.verify(BOOTSTRAP_SECRET).unwrap());
        assert!(!creds.verify("wrong").unwrap());
    }

    #[test]
    fn secret_file_holds_a_hash_not_the_secret() {
        let tmp = TempDir::new().unwrap();
        let creds = AdminCredentials::in_dir(tmp.path());
        creds.set("s3cret").unwrap();

        let contents = fs::read_to_string(creds.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.starts_with("$argon2id$"));
        assert!(!contents.contains("s3cret"));
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let creds = AdminCredentials::in_dir(tmp.path());
        creds.set("s3cret").unwrap();
        let mode = fs::metadata(creds.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn empty_secret_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let creds = AdminCredentials::in_dir(tmp.path());
        let err = creds.set("").unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(!creds.is_set());
    }

    #[test]
    fn corrupt_secret_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let creds = AdminCredentials::in_dir(tmp.path());
        fs::write(creds.path(), "plaintext\n").unwrap();
        let err = creds.verify("plaintext").unwrap_err();
        assert!(matches!(err, AppError::InvalidStoreFile { .. }));
    }
}
