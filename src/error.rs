use quick_xml::Error as XMLError;
use std::{str::Utf8Error, string::FromUtf8Error};
use thiserror::Error;

/// Wrapper around `std::Result`
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Error, Debug)]
pub enum Error {
    /// [`std::io`] related error.
    /// Reading the source file, or writing on save / autosave.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// The content is not well-formed XML. This includes bytes that can't be decoded
    /// in the encoding the BOM or the declaration names, and unknown encoding names.
    #[error("Malformed XML: {0}")]
    Parse(String),
    /// The path expression is invalid, or uses something the engine doesn't support.
    #[error("Invalid expression: {0}")]
    Query(String),
    /// The operation would break the tree, e.g. detaching the document node
    /// or giving a node a second parent.
    #[error("Tree invariant violated: {0}")]
    Invariant(String),
}

impl From<XMLError> for Error {
    fn from(err: XMLError) -> Error {
        match err {
            XMLError::EndEventMismatch { expected, found } => Error::Parse(format!(
                "Closing tag mismatch. Expected {}, found {}",
                expected, found,
            )),
            XMLError::Io(err) => Error::Io(err),
            XMLError::Utf8(err) => Error::Parse(format!("Invalid UTF-8: {}", err)),
            err => Error::Parse(err.to_string()),
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::Parse(format!("Invalid UTF-8: {}", err.utf8_error()))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Error {
        Error::Parse(format!("Invalid UTF-8: {}", err))
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Error {
        Error::Io(err.error)
    }
}
