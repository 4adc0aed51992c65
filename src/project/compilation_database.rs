//! compile_commands.json validation
//!
//! rdm parses the database itself; we only check that the directory we are
//! about to hand to `--load-compile-commands` holds a usable one, so a bad
//! setting fails fast with a message naming the folder.

use json_compilation_db::Entry;
use std::path::{Path, PathBuf};

use crate::config::COMPILATION_DATABASE_FILE;
use crate::error::ConfigError;

/// A parsed compilation database
#[derive(Debug)]
pub struct CompilationDatabase {
    /// Path to compile_commands.json
    pub path: PathBuf,
    entries: Vec<Entry>,
}

impl CompilationDatabase {
    /// Load compile_commands.json from `dir`
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(COMPILATION_DATABASE_FILE);
        if !path.is_file() {
            return Err(ConfigError::MissingCompilationDatabase {
                dir: dir.to_path_buf(),
            });
        }

        let file = std::fs::File::open(&path).map_err(|e| {
            ConfigError::InvalidCompilationDatabase {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        let entries: Vec<Entry> = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| ConfigError::InvalidCompilationDatabase {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if entries.is_empty() {
            return Err(ConfigError::InvalidCompilationDatabase {
                path,
                reason: "database has no entries".to_string(),
            });
        }

        Ok(Self { path, entries })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_database(dir: &Path, content: &str) {
        std::fs::write(dir.join(COMPILATION_DATABASE_FILE), content).unwrap();
    }

    #[test]
    fn test_load_valid_database() {
        let dir = tempfile::tempdir().unwrap();
        write_database(
            dir.path(),
            r#"[
                {
                    "directory": "/home/user/project",
                    "file": "src/main.cpp",
                    "arguments": ["clang++", "-c", "src/main.cpp"]
                },
                {
                    "directory": "/home/user/project",
                    "file": "src/lib.cpp",
                    "command": "clang++ -c src/lib.cpp"
                }
            ]"#,
        );

        let db = CompilationDatabase::load(dir.path()).unwrap();
        assert_eq!(db.entry_count(), 2);
        assert_eq!(db.path, dir.path().join("compile_commands.json"));
    }

    #[test]
    fn test_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CompilationDatabase::load(dir.path()),
            Err(ConfigError::MissingCompilationDatabase { .. })
        ));
    }

    #[test]
    fn test_malformed_and_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        write_database(dir.path(), "{ not json");
        assert!(matches!(
            CompilationDatabase::load(dir.path()),
            Err(ConfigError::InvalidCompilationDatabase { .. })
        ));

        write_database(dir.path(), "[]");
        assert!(matches!(
            CompilationDatabase::load(dir.path()),
            Err(ConfigError::InvalidCompilationDatabase { .. })
        ));
    }
}
