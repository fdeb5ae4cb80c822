//! Platform-specific directory management
//!
//! cdu only keeps throwaway state: ephemeral clones and virtual environments.
//! Both live under the cache directory, which follows XDG on Linux and
//! `~/Library/Caches` on macOS.
//!
//! `CDU_CACHE_DIR` overrides the default location.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "CDU_CACHE_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "cdu";

const WORKSPACES_SUBDIR: &str = "workspaces";
const ENVS_SUBDIR: &str = "envs";

/// Directory provider for cdu
#[derive(Debug, Clone)]
pub struct CduDirs {
    cache_dir: PathBuf,
}

impl CduDirs {
    /// Resolve directories from the environment, then platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve_cache_dir(),
        }
    }

    /// Use an explicit cache directory
    #[must_use]
    pub fn with_cache_dir(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Root cache directory
    ///
    /// - Linux: `$XDG_CACHE_HOME/cdu` or `~/.cache/cdu`
    /// - macOS: `~/Library/Caches/cdu`
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Parent of ephemeral clones made for `cdu run --repo`
    #[must_use]
    pub fn workspaces_dir(&self) -> PathBuf {
        self.cache_dir.join(WORKSPACES_SUBDIR)
    }

    /// Parent of per-run virtual environments
    #[must_use]
    pub fn envs_dir(&self) -> PathBuf {
        self.cache_dir.join(ENVS_SUBDIR)
    }

    fn resolve_cache_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CACHE_DIR) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        dirs::cache_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".cache").join(APP_NAME))
                    .unwrap_or_else(|| env::temp_dir().join(APP_NAME))
            })
    }
}

impl Default for CduDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_is_not_empty() {
        let dirs = CduDirs::new();
        assert!(!dirs.cache_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_subdirs_are_under_cache_dir() {
        let dirs = CduDirs::with_cache_dir(Path::new("/var/cache/cdu"));
        assert_eq!(dirs.workspaces_dir(), PathBuf::from("/var/cache/cdu/workspaces"));
        assert_eq!(dirs.envs_dir(), PathBuf::from("/var/cache/cdu/envs"));
    }
}
