use std::fs;
use std::path::Path;

use anyhow::{bail, Result};

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

#[derive(Debug, PartialEq, Eq)]
pub enum SqliteTarget<'a> {
    Memory,
    File(&'a Path),
}

pub fn parse_sqlite_url(url: &str) -> Result<SqliteTarget<'_>> {
    if url.starts_with(MEMORY_PREFIX) {
        return Ok(SqliteTarget::Memory);
    }
    let Some(rest) = url.strip_prefix(URL_PREFIX) else {
        bail!("sqlite path must start with `sqlite://` or use `sqlite::memory:`");
    };
    let file = rest.split_once('?').map(|(file, _)| file).unwrap_or(rest);
    if file.is_empty() {
        bail!("sqlite path is missing a filesystem component after `sqlite://`");
    }
    Ok(SqliteTarget::File(Path::new(file)))
}

/// Validate the URL and create the database file's parent directory.
pub fn prepare_sqlite_url(url: &str) -> Result<()> {
    if let SqliteTarget::File(path) = parse_sqlite_url(url)? {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_memory_and_file_urls() {
        assert_eq!(
            parse_sqlite_url("sqlite::memory:?cache=shared").unwrap(),
            SqliteTarget::Memory
        );
        assert_eq!(
            parse_sqlite_url("sqlite://data/leaderboard.db?mode=rwc").unwrap(),
            SqliteTarget::File(Path::new("data/leaderboard.db"))
        );
    }

    #[test]
    fn rejects_bad_urls() {
        let err = parse_sqlite_url("leaderboard.db").unwrap_err();
        assert!(err.to_string().contains("must start with `sqlite://`"));
        let err = parse_sqlite_url("sqlite://").unwrap_err();
        assert!(err.to_string().contains("missing a filesystem component"));
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = dir.path().join("nested").join("deeper").join("lb.db");
        let url = format!("sqlite://{}", db.display());

        prepare_sqlite_url(&url).expect("prepare");

        assert!(db.parent().unwrap().is_dir());
        assert!(!db.exists());
    }
}
