//! Migration scripts and the revision graph they form.
//!
//! A script is a `.sql` file whose leading comment block declares its place
//! in the history:
//!
//! ```sql
//! -- revision: 1975ea83b712
//! -- down_revision: 27c6a30d7c24
//! -- message: add users table
//!
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//! ```
//!
//! `down_revision: None` (or an empty value) marks the root. The whole file
//! is executed as one batch when the revision is applied.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::MigrationError;

/// A parsed migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    revision: String,
    down_revision: Option<String>,
    message: Option<String>,
    path: PathBuf,
    sql: String,
}

impl Script {
    /// Parses a script from its file contents.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MalformedScript` if the header has no
    /// usable `revision` line.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, MigrationError> {
        let mut revision = None;
        let mut down_revision = None;
        let mut message = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(comment) = line.strip_prefix("--") else {
                break;
            };
            let Some((key, value)) = comment.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "revision" => revision = Some(value.to_string()),
                "down_revision" => down_revision = parse_down_revision(value),
                "message" if !value.is_empty() => message = Some(value.to_string()),
                _ => {}
            }
        }

        let malformed = |reason: &str| MigrationError::MalformedScript {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let revision = revision.ok_or_else(|| malformed("missing 'revision' header"))?;
        if revision.is_empty() || revision.contains(char::is_whitespace) {
            return Err(malformed("revision id must be a single non-empty word"));
        }
        if down_revision.as_deref() == Some(revision.as_str()) {
            return Err(malformed("script names itself as its down_revision"));
        }

        Ok(Self {
            revision,
            down_revision,
            message,
            path: path.to_path_buf(),
            sql: contents.to_string(),
        })
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn down_revision(&self) -> Option<&str> {
        self.down_revision.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Whether the script contains anything besides comments and whitespace.
    pub fn has_statements(&self) -> bool {
        self.sql
            .lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with("--"))
    }
}

fn parse_down_revision(value: &str) -> Option<String> {
    match value {
        "" | "None" | "none" | "null" => None,
        other => Some(other.to_string()),
    }
}

/// All scripts found in a migration directory, validated as a single chain.
#[derive(Debug, Clone)]
pub struct ScriptDirectory {
    location: PathBuf,
    scripts: BTreeMap<String, Script>,
}

impl ScriptDirectory {
    /// Reads and validates every `.sql` file in `location`.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the directory or a script cannot be read,
    /// a script is malformed, two scripts share a revision id, a
    /// `down_revision` points nowhere, the history has more than one root,
    /// or the links form a cycle.
    pub fn load(location: &Path) -> Result<Self, MigrationError> {
        let entries = fs::read_dir(location).map_err(|source| MigrationError::ScriptDirectory {
            path: location.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MigrationError::ScriptDirectory {
                path: location.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut scripts = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = fs::read_to_string(&path).map_err(|source| {
                MigrationError::ScriptRead {
                    path: path.clone(),
                    source,
                }
            })?;
            scripts.push(Script::parse(&path, &contents)?);
        }

        Self::from_scripts(location, scripts)
    }

    /// Builds a directory from already-parsed scripts.
    pub fn from_scripts(location: &Path, scripts: Vec<Script>) -> Result<Self, MigrationError> {
        let mut by_revision: BTreeMap<String, Script> = BTreeMap::new();
        for script in scripts {
            if let Some(existing) = by_revision.get(&script.revision) {
                return Err(MigrationError::DuplicateRevision {
                    revision: script.revision.clone(),
                    first: existing.path.clone(),
                    second: script.path.clone(),
                });
            }
            by_revision.insert(script.revision.clone(), script);
        }

        let directory = Self {
            location: location.to_path_buf(),
            scripts: by_revision,
        };
        directory.validate()?;
        Ok(directory)
    }

    fn validate(&self) -> Result<(), MigrationError> {
        for script in self.scripts.values() {
            if let Some(down) = script.down_revision() {
                if !self.scripts.contains_key(down) {
                    return Err(MigrationError::UnknownRevision {
                        revision: down.to_string(),
                    });
                }
            }
        }

        let roots: Vec<String> = self
            .scripts
            .values()
            .filter(|s| s.down_revision.is_none())
            .map(|s| s.revision.clone())
            .collect();
        if roots.len() > 1 {
            return Err(MigrationError::MultipleRoots(roots));
        }

        // Every chain must reach the root within as many steps as there are
        // scripts.
        for script in self.scripts.values() {
            let mut cursor = Some(script);
            let mut steps = 0;
            while let Some(current) = cursor {
                steps += 1;
                if steps > self.scripts.len() {
                    return Err(MigrationError::CyclicRevisions {
                        revision: script.revision.clone(),
                    });
                }
                cursor = current.down_revision().and_then(|d| self.scripts.get(d));
            }
        }
        Ok(())
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn get(&self, revision: &str) -> Option<&Script> {
        self.scripts.get(revision)
    }

    pub fn scripts(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }

    /// Revisions that no other script builds on, sorted.
    pub fn heads(&self) -> Vec<&str> {
        self.scripts
            .keys()
            .filter(|rev| {
                !self
                    .scripts
                    .values()
                    .any(|s| s.down_revision() == Some(rev.as_str()))
            })
            .map(String::as_str)
            .collect()
    }

    /// The single newest revision, or `None` when there are no scripts.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MultipleHeads` if the history branches.
    pub fn current_head(&self) -> Result<Option<&str>, MigrationError> {
        let heads = self.heads();
        match heads.as_slice() {
            [] => Ok(None),
            [head] => Ok(Some(head)),
            _ => Err(MigrationError::MultipleHeads(
                heads.iter().map(|h| h.to_string()).collect(),
            )),
        }
    }

    /// Resolves a target to a concrete revision.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::UnknownRevision` for a revision no script
    /// declares, or `MultipleHeads` when resolving `head` on a branched
    /// history.
    pub fn resolve(&self, target: &super::Target) -> Result<Option<&str>, MigrationError> {
        match target {
            super::Target::Head => self.current_head(),
            super::Target::Revision(revision) => self
                .scripts
                .get_key_value(revision.as_str())
                .map(|(key, _)| Some(key.as_str()))
                .ok_or_else(|| MigrationError::UnknownRevision {
                    revision: revision.clone(),
                }),
        }
    }

    /// The scripts to apply, in order, to move from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::UnknownRevision` if `from` is not a known
    /// revision and `MigrationError::NotAnAncestor` if `to` does not build on
    /// `from` (this engine never downgrades).
    pub fn upgrade_path(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<&Script>, MigrationError> {
        if let Some(from) = from {
            if !self.scripts.contains_key(from) {
                return Err(MigrationError::UnknownRevision {
                    revision: from.to_string(),
                });
            }
        }

        let mut path = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let Some(revision) = cursor else {
                return Err(MigrationError::NotAnAncestor {
                    from: from.map(str::to_string),
                    to: to.map(str::to_string),
                });
            };
            let script = self
                .scripts
                .get(revision)
                .ok_or_else(|| MigrationError::UnknownRevision {
                    revision: revision.to_string(),
                })?;
            path.push(script);
            cursor = script.down_revision();
        }
        path.reverse();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::Target;

    fn script(rev: &str, down: Option<&str>) -> Script {
        let contents = format!(
            "-- revision: {rev}\n-- down_revision: {}\n\nSELECT 1;\n",
            down.unwrap_or("None")
        );
        Script::parse(Path::new(&format!("{rev}.sql")), &contents).expect("script should parse")
    }

    fn chain() -> ScriptDirectory {
        ScriptDirectory::from_scripts(
            Path::new("migrations"),
            vec![
                script("r1", None),
                script("r2", Some("r1")),
                script("r3", Some("r2")),
            ],
        )
        .expect("chain should validate")
    }

    #[test]
    fn parse_reads_header() {
        let parsed = Script::parse(
            Path::new("a.sql"),
            "-- revision: abc\n-- down_revision: def\n-- message: add users\n-- create_date: now\nCREATE TABLE t (id INTEGER);\n-- revision: ignored\n",
        )
        .expect("script should parse");
        assert_eq!(parsed.revision(), "abc");
        assert_eq!(parsed.down_revision(), Some("def"));
        assert_eq!(parsed.message(), Some("add users"));
        assert!(parsed.has_statements());
    }

    #[test]
    fn parse_rejects_missing_revision() {
        let err = Script::parse(Path::new("a.sql"), "CREATE TABLE t (id INTEGER);")
            .expect_err("missing header should fail");
        assert!(matches!(err, MigrationError::MalformedScript { .. }));

        let err = Script::parse(Path::new("a.sql"), "-- revision: a\n-- down_revision: a\n")
            .expect_err("self reference should fail");
        assert!(matches!(err, MigrationError::MalformedScript { .. }));
    }

    #[test]
    fn comment_only_script_has_no_statements() {
        let parsed = script("r1", None);
        assert!(parsed.has_statements());
        let empty = Script::parse(Path::new("e.sql"), "-- revision: e\n-- down_revision: None\n\n")
            .expect("script should parse");
        assert!(!empty.has_statements());
    }

    #[test]
    fn head_and_paths() {
        let dir = chain();
        assert_eq!(dir.heads(), vec!["r3"]);
        assert_eq!(dir.current_head().unwrap(), Some("r3"));

        let revs = |path: Vec<&Script>| path.iter().map(|s| s.revision().to_string()).collect::<Vec<_>>();
        assert_eq!(revs(dir.upgrade_path(None, Some("r3")).unwrap()), ["r1", "r2", "r3"]);
        assert_eq!(revs(dir.upgrade_path(Some("r1"), Some("r3")).unwrap()), ["r2", "r3"]);
        assert!(dir.upgrade_path(Some("r3"), Some("r3")).unwrap().is_empty());

        assert!(matches!(
            dir.upgrade_path(Some("r3"), Some("r1")),
            Err(MigrationError::NotAnAncestor { .. })
        ));
        assert!(matches!(
            dir.upgrade_path(Some("zzz"), Some("r3")),
            Err(MigrationError::UnknownRevision { .. })
        ));
    }

    #[test]
    fn resolve_targets() {
        let dir = chain();
        assert_eq!(dir.resolve(&Target::Head).unwrap(), Some("r3"));
        assert_eq!(dir.resolve(&Target::Revision("r2".into())).unwrap(), Some("r2"));
        assert!(matches!(
            dir.resolve(&Target::Revision("nope".into())),
            Err(MigrationError::UnknownRevision { .. })
        ));
    }

    #[test]
    fn empty_directory_has_no_head() {
        let dir = ScriptDirectory::from_scripts(Path::new("m"), Vec::new()).unwrap();
        assert!(dir.is_empty());
        assert_eq!(dir.current_head().unwrap(), None);
        assert!(dir.upgrade_path(None, None).unwrap().is_empty());
    }

    #[test]
    fn graph_errors() {
        let branched = ScriptDirectory::from_scripts(
            Path::new("m"),
            vec![script("r1", None), script("a", Some("r1")), script("b", Some("r1"))],
        )
        .unwrap();
        assert!(matches!(
            branched.current_head(),
            Err(MigrationError::MultipleHeads(heads)) if heads == ["a", "b"]
        ));

        assert!(matches!(
            ScriptDirectory::from_scripts(Path::new("m"), vec![script("r2", Some("r1"))]),
            Err(MigrationError::UnknownRevision { revision }) if revision == "r1"
        ));
        assert!(matches!(
            ScriptDirectory::from_scripts(Path::new("m"), vec![script("a", None), script("b", None)]),
            Err(MigrationError::MultipleRoots(_))
        ));
        assert!(matches!(
            ScriptDirectory::from_scripts(Path::new("m"), vec![script("a", None), script("a", None)]),
            Err(MigrationError::DuplicateRevision { .. })
        ));
        assert!(matches!(
            ScriptDirectory::from_scripts(
                Path::new("m"),
                vec![script("x", Some("y")), script("y", Some("x"))]
            ),
            Err(MigrationError::CyclicRevisions { .. })
        ));
    }

    #[test]
    fn load_reads_sql_files_only() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        fs::write(dir.path().join("r1_init.sql"), "-- revision: r1\n-- down_revision: None\n")
            .unwrap();
        fs::write(dir.path().join("README.md"), "not a script").unwrap();

        let loaded = ScriptDirectory::load(dir.path()).expect("directory should load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.current_head().unwrap(), Some("r1"));

        assert!(matches!(
            ScriptDirectory::load(&dir.path().join("missing")),
            Err(MigrationError::ScriptDirectory { .. })
        ));
    }
}
