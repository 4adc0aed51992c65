//! Test utilities and global setup
//!
//! Test logging configuration and workspace fixtures shared by unit tests.

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects `RUST_LOG`; defaults to debug for this crate. Enable with:
    ///
    /// ```bash
    /// RUST_LOG=rtags_bridge=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .compact()
                .try_init()
                .ok(); // Ignore errors if already initialized by another test
        });
    }

    #[ctor::ctor]
    fn init_test_logging() {
        init();
    }
}

/// rc binary for integration tests
///
/// Checks `RC_PATH` and falls back to `rc` on the PATH.
#[cfg(all(test, feature = "rtags-integration-tests"))]
pub fn get_test_rc_path() -> String {
    std::env::var("RC_PATH").unwrap_or_else(|_| "rc".to_string())
}

/// Workspace folders with a compilation database
#[cfg(test)]
pub mod fixtures {
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    pub const COMPILE_COMMANDS: &str = r#"[
        {"directory": "/ws", "file": "a.cpp", "command": "c++ -c a.cpp"}
    ]"#;

    /// Temporary workspace folder, removed on drop
    pub struct TestFolder {
        _temp_dir: TempDir, // Underscore prefix keeps it alive until drop
        pub root: PathBuf,
    }

    impl TestFolder {
        /// Folder with compile_commands.json at its root
        pub fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path().to_path_buf();
            fs::write(root.join("compile_commands.json"), COMPILE_COMMANDS).unwrap();
            Self {
                _temp_dir: temp_dir,
                root,
            }
        }

        /// Folder without any compilation database
        pub fn empty() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path().to_path_buf();
            Self {
                _temp_dir: temp_dir,
                root,
            }
        }

        /// Create `name` under the folder with its own compile_commands.json
        pub fn database_dir(&self, name: &str) -> PathBuf {
            let dir = self.root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("compile_commands.json"), COMPILE_COMMANDS).unwrap();
            dir
        }

        pub fn path(&self) -> &Path {
            &self.root
        }
    }
}
