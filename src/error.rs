//! Error types for every stage of a run.
//!
//! Per-race failures ([`FetchError`], [`ParseError`]) are recovered by the
//! pipeline: the race is skipped and recorded. [`DateError`] is raised before
//! any network I/O and ends the run.

use thiserror::Error;

/// Failure to retrieve one page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("page not found: {0}")]
    NotFound(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected content type {content_type:?} from {url}")]
    Malformed { url: String, content_type: String },

    #[error("HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::NotFound(_) | FetchError::Malformed { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            FetchError::Timeout(url)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::Transport(format!("invalid url: {err}"))
    }
}

/// Failure to turn one race page into finisher records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized markup: {0}")]
    UnrecognizedMarkup(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Failure of one candidate race, either stage.
#[derive(Debug, Clone, Error)]
pub enum RaceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Invalid date selection. Fatal to the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid period token {0:?}")]
    InvalidPeriod(String),

    #[error("invalid month {0}")]
    InvalidMonth(u32),

    #[error("invalid day range {0:?}")]
    InvalidDayRange(String),
}

/// Problems reading the membership roster.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("could not read membership list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("membership list {0} has no usable rows")]
    Empty(String),
}

/// Problems reading a race list.
#[derive(Debug, Error)]
pub enum RaceListError {
    #[error("could not read race list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("race list {0} names no pages")]
    Empty(String),

    #[error("cannot address {0} as a local page")]
    BadPath(String),
}

/// Problems reading the YAML settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(FetchError::Timeout("u".into()).is_transient());
        assert!(FetchError::Transport("reset".into()).is_transient());
        assert!(
            FetchError::Status {
                url: "u".into(),
                status: 503
            }
            .is_transient()
        );
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!FetchError::NotFound("u".into()).is_transient());
        assert!(
            !FetchError::Malformed {
                url: "u".into(),
                content_type: "image/png".into()
            }
            .is_transient()
        );
        assert!(
            !FetchError::Status {
                url: "u".into(),
                status: 403
            }
            .is_transient()
        );
    }
}
