// Error taxonomy shared by both store adapters and the session.
// Adapters classify raw I/O and HTTP failures into one of these variants
// before returning, so the UI only ever matches on `CatalogError`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the catalog core.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A field value (or field name) supplied by the caller is not acceptable.
    #[error("invalid value: {0}")]
    Validation(String),

    /// The remote id or the selected local row no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote service could not be reached (refused, timed out, ...).
    #[error("remote catalog unavailable: {0}")]
    Unavailable(String),

    /// The remote service answered with a 5xx or an unreadable body.
    #[error("server error: {0}")]
    Server(String),

    /// The backing file could not be read or written.
    #[error("cannot access {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An operation was issued before any source was selected.
    #[error("no data source selected")]
    NoSource,
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller can simply re-prompt and try again in the same menu.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CatalogError::Validation(_) | CatalogError::NotFound(_) | CatalogError::Server(_)
        )
    }

    /// Whether the session has to go back to source selection.
    pub fn requires_reselection(&self) -> bool {
        matches!(
            self,
            CatalogError::Unavailable(_) | CatalogError::Persistence { .. } | CatalogError::NoSource
        )
    }
}
