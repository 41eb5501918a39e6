use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("http error `{0}`")]
    HttpError(#[from] reqwest::Error),
    #[error("`{url}` answered with status {status}")]
    BadStatus { url: String, status: u16 },
    #[error("could not load certificate `{0}`")]
    CertificateError(String),
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("fetch task failed `{0}`")]
    TaskError(String),
    #[error("unknown block {rid}/{lvl}/{bid} for sensor `{sid}`")]
    UnknownBlock {
        sid: String,
        rid: i64,
        lvl: i32,
        bid: i64,
    },
}
