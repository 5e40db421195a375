use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard, PoisonError};

use crate::{ErrorKind, Result};
use log::info;
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

/// Cookie store shared by every request of a client.
///
/// The jar is either purely in memory or backed by a JSON file, which is
/// read on [`CookieJar::load`] and written on [`CookieJar::save`].
#[derive(Debug, Clone)]
pub struct CookieJar {
    path: Option<PathBuf>,
    inner: Arc<CookieStoreMutex>,
}

impl CookieJar {
    /// An empty jar that is never persisted
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Arc::new(CookieStoreMutex::new(CookieStore::default())),
        }
    }

    /// Load a cookie store from a JSON file.
    ///
    /// A missing file yields an empty jar, which is created on the first save.
    ///
    /// # Errors
    ///
    /// This function will return an error if
    /// - the file exists but cannot be opened or
    /// - the file is not a valid cookie store
    pub fn load(path: PathBuf) -> Result<Self> {
        match std::fs::File::open(&path).map(std::io::BufReader::new) {
            Ok(reader) => {
                info!("Loading cookies from {}", path.display());
                let store = cookie_store::serde::json::load(reader)
                    .map_err(|e| ErrorKind::Cookies(format!("Failed to load cookies: {e}")))?;
                Ok(Self {
                    path: Some(path),
                    inner: Arc::new(CookieStoreMutex::new(store)),
                })
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(Self {
                path: Some(path),
                inner: Arc::new(CookieStoreMutex::new(CookieStore::default())),
            }),
            Err(e) => Err(ErrorKind::IoError(Some(path), e)),
        }
    }

    /// The file backing this jar, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the jar to its file, overwriting it. In-memory jars are not saved.
    ///
    /// # Errors
    ///
    /// This function will return an error if
    /// - the file cannot be created or
    /// - the store cannot be serialized
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file =
            std::fs::File::create(path).map_err(|e| ErrorKind::IoError(Some(path.clone()), e))?;
        cookie_store::serde::json::save(&self.store(), &mut file)
            .map_err(|e| ErrorKind::Cookies(format!("Failed to save cookies: {e}")))
    }

    /// Remove every cookie
    pub fn clear(&self) {
        self.store().clear();
    }

    /// Number of cookies in the jar, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.store().iter_any().count()
    }

    /// Whether the jar holds no cookies at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The store handed to the HTTP client as its cookie provider
    pub(crate) fn provider(&self) -> Arc<CookieStoreMutex> {
        Arc::clone(&self.inner)
    }

    fn store(&self) -> MutexGuard<'_, CookieStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PartialEq for CookieJar {
    fn eq(&self, other: &Self) -> bool {
        // The stores themselves are not comparable
        self.path == other.path && Arc::ptr_eq(&self.inner, &other.inner)
    }
}
