use fedimedia_core::MediaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),

    #[cfg(feature = "postgres")]
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid row data: {0}")]
    Decode(String),
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}

impl From<DbError> for MediaError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => MediaError::NotFound(what),
            other => MediaError::Database(other.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;
