//! Schema-state classification.
//!
//! Everything here is a pure function of two revision identifiers: the one
//! recorded in the database and the newest one the script directory knows
//! about. Revisions are compared for equality only.

use std::fmt;

use serde::Serialize;

/// Where a database's schema stands relative to the available migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    /// The database records no revision: it was never set up by this tool.
    NoInfo,
    /// The recorded revision is the newest one.
    UpToDate,
    /// The recorded revision differs from the newest one.
    UpgradeAvailable,
}

impl DatabaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoInfo => "no_info",
            Self::UpToDate => "up_to_date",
            Self::UpgradeAvailable => "upgrade_available",
        }
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoInfo => "Database has no revision information.",
            Self::UpToDate => "Database is up-to-date.",
            Self::UpgradeAvailable => "Database upgrade available.",
        })
    }
}

/// What a `sync()` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResult {
    /// The schema was created from the model definitions and stamped.
    Created,
    /// Pending migrations were applied.
    Upgraded,
    /// Nothing to do.
    AlreadyUpToDate,
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "Database created.",
            Self::Upgraded => "Database upgraded.",
            Self::AlreadyUpToDate => "Database already up-to-date.",
        })
    }
}

/// The action `sync()` takes for a given schema state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create every model table in one go, then record the newest revision
    /// without replaying any script.
    CreateAndStamp,
    /// Run the migration engine up to the newest revision.
    RunUpgrade,
    NoOp,
}

impl Action {
    /// The result reported once this action has run.
    pub fn outcome(self) -> SyncResult {
        match self {
            Self::CreateAndStamp => SyncResult::Created,
            Self::RunUpgrade => SyncResult::Upgraded,
            Self::NoOp => SyncResult::AlreadyUpToDate,
        }
    }
}

/// Classifies a database from its recorded and newest available revisions.
pub fn classify(current: Option<&str>, latest: Option<&str>) -> DatabaseStatus {
    match current {
        None => DatabaseStatus::NoInfo,
        Some(current) if Some(current) != latest => DatabaseStatus::UpgradeAvailable,
        Some(_) => DatabaseStatus::UpToDate,
    }
}

/// Picks the action that brings a database to the newest revision.
pub fn reconcile(current: Option<&str>, latest: Option<&str>) -> Action {
    match current {
        None => Action::CreateAndStamp,
        Some(current) if Some(current) == latest => Action::NoOp,
        Some(_) => Action::RunUpgrade,
    }
}
