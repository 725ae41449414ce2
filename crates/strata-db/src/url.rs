//! Database URL parsing.
//!
//! URLs follow the `dialect[+driver]://…` shape used by most database
//! toolkits. Only the `sqlite` dialect is backed by this crate:
//!
//! | URL | Database |
//! |-----|----------|
//! | `sqlite://` | in-memory |
//! | `sqlite:///:memory:` | in-memory |
//! | `sqlite:///app.db` | `app.db`, relative to the working directory |
//! | `sqlite:////var/lib/app.db` | `/var/lib/app.db` |
//! | `sqlite+pysqlite:///app.db` | driver suffix is ignored |
//! | `app.db` | bare paths are accepted as files |

use std::fmt;
use std::path::{Path, PathBuf};

const MEMORY: &str = ":memory:";

/// Errors that can occur while parsing a database URL.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlError {
    /// The URL names a dialect other than SQLite.
    #[error("unsupported database dialect '{dialect}' (only sqlite is supported)")]
    UnsupportedDialect {
        /// The dialect part of the URL scheme.
        dialect: String,
    },

    /// The URL is syntactically invalid.
    #[error("invalid database URL '{url}': {reason}")]
    Invalid {
        /// The URL as given.
        url: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// A parsed SQLite database location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// A private in-memory database.
    Memory,
    /// A database file on disk.
    File(PathBuf),
}

impl DatabaseUrl {
    /// Parses a database URL or a bare file path.
    ///
    /// # Errors
    ///
    /// Returns `UrlError::UnsupportedDialect` for non-SQLite URLs and
    /// `UrlError::Invalid` for URLs carrying a host or no content at all.
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(UrlError::Invalid {
                url: url.to_string(),
                reason: "empty URL",
            });
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            if url == MEMORY {
                return Ok(Self::Memory);
            }
            return Ok(Self::File(PathBuf::from(url)));
        };

        let dialect = dialect_of_scheme(scheme);
        if dialect != "sqlite" {
            return Err(UrlError::UnsupportedDialect {
                dialect: dialect.to_string(),
            });
        }

        if rest.is_empty() {
            return Ok(Self::Memory);
        }

        let Some(path) = rest.strip_prefix('/') else {
            return Err(UrlError::Invalid {
                url: url.to_string(),
                reason: "sqlite URLs must not carry a host",
            });
        };
        let path = path.split_once('?').map_or(path, |(path, _query)| path);

        if path.is_empty() || path == MEMORY {
            Ok(Self::Memory)
        } else {
            Ok(Self::File(PathBuf::from(path)))
        }
    }

    /// Returns the file path, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::File(path) => Some(path),
        }
    }

    /// Whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("sqlite://"),
            Self::File(path) => write!(f, "sqlite:///{}", path.display()),
        }
    }
}

/// Returns the dialect named by a URL, without any `+driver` suffix.
///
/// Bare paths report `sqlite`, since that is how [`DatabaseUrl::parse`]
/// treats them.
pub fn dialect(url: &str) -> &str {
    match url.trim().split_once("://") {
        Some((scheme, _)) => dialect_of_scheme(scheme),
        None => "sqlite",
    }
}

fn dialect_of_scheme(scheme: &str) -> &str {
    scheme
        .split_once('+')
        .map_or(scheme, |(dialect, _driver)| dialect)
}
