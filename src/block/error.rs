use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported block encoding `{0}`")]
    UnsupportedEncoding(String),
    #[error("corrupt block payload: {0}")]
    CorruptPayload(String),
}

impl CodecError {
    pub(crate) fn corrupt(reason: impl std::fmt::Display) -> Self {
        Self::CorruptPayload(reason.to_string())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(value: serde_json::Error) -> Self {
        Self::corrupt(format!("json `{value}`"))
    }
}
