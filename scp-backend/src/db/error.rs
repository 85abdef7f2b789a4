use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use valuable::Valuable;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(thiserror::Error, Debug, Serialize, Valuable, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error("{entity} with {} = {} already exists", field.clone().unwrap_or_default(), value.clone().unwrap_or_default())]
    DuplicateRecord {
        entity: String,
        field: Option<String>,
        value: Option<String>,
    },
    #[error("record not found")]
    RecordNotFound,
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    pub(super) fn from_other_error(err: impl std::error::Error) -> Self {
        Self::Other {
            message: format!("{err:?}"),
        }
    }
}

static DUP_KEY_REGEX: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"collection: \S+\.(\w+) index: \S+ dup key: \{ ([^:]+): "?([^"}]*)"? \}"#));

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref() else {
            return Self::from_other_error(err);
        };

        if write_error.code != DUPLICATE_KEY_CODE {
            return Self::from_other_error(err);
        }

        let captures = DUP_KEY_REGEX
            .as_ref()
            .ok()
            .and_then(|re| re.captures(&write_error.message));
        let capture = |i| captures.as_ref().and_then(|c| c.get(i)).map(|m| m.as_str().trim().to_string());

        Self::DuplicateRecord {
            entity: capture(1).unwrap_or_default(),
            field: capture(2),
            value: capture(3),
        }
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Self::from_other_error(err)
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Self::from_other_error(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
