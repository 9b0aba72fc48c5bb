//! Store error type shared by the repository and service layers.
//!
//! # Responsibility
//! - Carry semantic failures (`NotFound`, `MalformedImport`, ...) separately
//!   from storage transport errors.
//! - Classify every failure into an [`ErrorKind`] a UI can act on.

use crate::db::DbError;
use crate::model::block::BlockId;
use crate::model::page::PageId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by store and engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse failure class reported to callers.
///
/// `StorageUnavailable` is the only class worth retrying, and only when
/// [`StoreError::is_retryable`] agrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidOperation,
    StorageUnavailable,
    MalformedImport,
    InvalidData,
}

/// Errors from block store and tree engine operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Referenced page does not exist.
    PageNotFound(PageId),
    /// Referenced block does not exist (or lives on another page).
    BlockNotFound(BlockId),
    /// A block passed to a sibling-group operation belongs to another group.
    NotInSiblingGroup {
        block_id: BlockId,
        page_id: PageId,
        parent_id: Option<BlockId>,
    },
    /// Request is well-formed but not allowed in the current tree state.
    InvalidOperation(String),
    /// Snapshot cannot be imported as a consistent page.
    MalformedImport(String),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl StoreError {
    /// Classifies this error for callers that only care about the kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Db(_) | Self::UninitializedConnection { .. } | Self::MissingRequiredTable(_) => {
                ErrorKind::StorageUnavailable
            }
            Self::PageNotFound(_) | Self::BlockNotFound(_) => ErrorKind::NotFound,
            Self::NotInSiblingGroup { .. } | Self::InvalidOperation(_) => {
                ErrorKind::InvalidOperation
            }
            Self::MalformedImport(_) => ErrorKind::MalformedImport,
            Self::InvalidData(_) => ErrorKind::InvalidData,
        }
    }

    /// Returns whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Db(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "storage unavailable: {err}"),
            Self::PageNotFound(id) => write!(f, "page not found: {id}"),
            Self::BlockNotFound(id) => write!(f, "block not found: {id}"),
            Self::NotInSiblingGroup {
                block_id,
                page_id,
                parent_id,
            } => match parent_id {
                Some(parent_id) => write!(
                    f,
                    "block {block_id} is not a child of {parent_id} on page {page_id}"
                ),
                None => write!(
                    f,
                    "block {block_id} is not a root block of page {page_id}"
                ),
            },
            Self::InvalidOperation(message) => write!(f, "invalid operation: {message}"),
            Self::MalformedImport(message) => write!(f, "malformed page import: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted block data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "block store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "block store requires table `{table}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
