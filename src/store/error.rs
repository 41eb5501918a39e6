use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error `{0}`")]
    SQLiteError(tokio_rusqlite::Error),
    #[error("could not prepare database directory `{0}`")]
    IoError(#[from] std::io::Error),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(value: tokio_rusqlite::Error) -> Self {
        Self::SQLiteError(value)
    }
}
