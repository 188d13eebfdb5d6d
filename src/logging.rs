use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive
pub const LOG_ENV: &str = "PROMPTGRID_LOG";

/// Route `tracing` output away from the terminal, which the split screen
/// owns. Logs go to `path` (or the default log file); if it cannot be opened
/// they are dropped. Returns the file actually in use.
pub fn init(path: Option<PathBuf>) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let path = path.or_else(default_log_path);

    match path.as_deref().and_then(open_log) {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            path
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
            None
        }
    }
}

fn open_log(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// `<state dir>/promptgrid/promptgrid.log`, or the cache dir where there is no
/// state dir
pub fn default_log_path() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|dir| dir.join("promptgrid").join("promptgrid.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("run.log");
        assert!(open_log(&path).is_some());
        assert!(path.exists());
    }

    #[test]
    fn test_default_log_path_names_the_app() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with("promptgrid/promptgrid.log"));
        }
    }
}
