use thiserror::Error;

/// Errors from parsing the shared wire types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unknown channel kind: {0}")]
    UnknownChannelKind(String),
}

pub type Result<T> = std::result::Result<T, Error>;
