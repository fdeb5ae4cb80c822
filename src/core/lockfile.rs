//! Lockfile handling
//!
//! The lockfile (`requirements.txt` by default) pins every installed package
//! as one `name==version` line. It is produced by `pip freeze` and written
//! back verbatim; parsing exists so runs can be compared and reported.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::LockfileError;

/// One line of a lockfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// `name==version`
    Pinned { name: String, version: String },
    /// Anything pip may emit that is not a plain pin, e.g. `pkg @ file:///...`
    /// or `-e git+https://...`. Kept verbatim.
    Other(String),
}

/// Parsed lockfile, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    entries: Vec<Entry>,
}

fn pin_regex() -> &'static Regex {
    static PIN: OnceLock<Regex> = OnceLock::new();
    PIN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)(?:\[[^\]]*\])?\s*==\s*([^\s;#]+)")
            .expect("Invalid pin pattern")
    })
}

/// Normalize a package name the way the package index compares them
///
/// Case-insensitive, with runs of `-`, `_` and `.` equivalent.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

impl Lockfile {
    /// Parse lockfile or freeze output
    ///
    /// Blank lines and `#` comments are dropped; every other line becomes an
    /// [`Entry`].
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| match pin_regex().captures(line) {
                Some(caps) => Entry::Pinned {
                    name: caps[1].to_string(),
                    version: caps[2].to_string(),
                },
                None => Entry::Other(line.to_string()),
            })
            .collect();
        Self { entries }
    }

    /// Pinned `(name, version)` pairs in file order
    pub fn pins(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Pinned { name, version } => Some((name.as_str(), version.as_str())),
            Entry::Other(_) => None,
        })
    }

    /// Names of all pinned packages, as written
    pub fn package_names(&self) -> Vec<String> {
        self.pins().map(|(name, _)| name.to_string()).collect()
    }

    /// Pinned version of `name`, compared by normalized name
    pub fn version_of(&self, name: &str) -> Option<&str> {
        let wanted = normalize_name(name);
        self.pins()
            .find(|(n, _)| normalize_name(n) == wanted)
            .map(|(_, v)| v)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back to lockfile text, one entry per line
    #[cfg(test)]
    fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            match entry {
                Entry::Pinned { name, version } => {
                    out.push_str(name);
                    out.push_str("==");
                    out.push_str(version);
                }
                Entry::Other(line) => out.push_str(line),
            }
            out.push('\n');
        }
        out
    }

    /// Compare this (older) lockfile against `newer`
    pub fn diff(&self, newer: &Lockfile) -> LockfileDiff {
        let old: BTreeMap<String, (&str, &str)> = self
            .pins()
            .map(|(n, v)| (normalize_name(n), (n, v)))
            .collect();
        let new: BTreeMap<String, (&str, &str)> = newer
            .pins()
            .map(|(n, v)| (normalize_name(n), (n, v)))
            .collect();

        let mut diff = LockfileDiff::default();
        for (key, (name, new_version)) in &new {
            match old.get(key) {
                Some((_, old_version)) if old_version == new_version => diff.unchanged += 1,
                Some((_, old_version)) => diff.upgraded.push(VersionChange {
                    name: (*name).to_string(),
                    from: (*old_version).to_string(),
                    to: (*new_version).to_string(),
                }),
                None => diff.added.push(PinnedPackage {
                    name: (*name).to_string(),
                    version: (*new_version).to_string(),
                }),
            }
        }
        for (key, (name, version)) in &old {
            if !new.contains_key(key) {
                diff.removed.push(PinnedPackage {
                    name: (*name).to_string(),
                    version: (*version).to_string(),
                });
            }
        }
        diff
    }
}

/// A package whose pinned version changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// A package pinned on only one side of a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedPackage {
    pub name: String,
    pub version: String,
}

/// Differences between two lockfiles, ordered by normalized name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockfileDiff {
    /// Version changed (usually an upgrade, occasionally a downgrade)
    pub upgraded: Vec<VersionChange>,
    /// Newly pinned packages
    pub added: Vec<PinnedPackage>,
    /// Packages no longer installed
    pub removed: Vec<PinnedPackage>,
    /// Number of packages pinned at the same version on both sides
    pub unchanged: usize,
}

impl LockfileDiff {
    /// Whether both sides pin the same versions
    pub fn is_empty(&self) -> bool {
        self.upgraded.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// SHA-256 hex digest of lockfile contents
pub fn digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Read a lockfile, `None` if it does not exist yet
pub fn read(path: &Path) -> Result<Option<String>, LockfileError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LockfileError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Overwrite (or create) a lockfile with `content`, byte for byte
pub fn write(path: &Path, content: &str) -> Result<(), LockfileError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| LockfileError::Write {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
        }
    }
    std::fs::write(path, content).map_err(|e| LockfileError::Write {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write back the contents a lockfile had before, deleting it if it had none
pub fn restore(path: &Path, original: Option<&str>) -> Result<(), LockfileError> {
    match original {
        Some(content) => write(path, content),
        None => match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(LockfileError::Write {
                path: path.to_path_buf(),
                error: e.to_string(),
            }),
            _ => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators::{package_name, pep440_version};
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_pins_and_other_lines() {
        let lock = Lockfile::parse(
            "# generated\nrequests==2.31.0\n\nmypkg @ file:///tmp/mypkg\n-e git+https://x/y.git#egg=y\nurllib3 == 2.0.7\n",
        );
        assert_eq!(lock.len(), 4);
        assert_eq!(lock.version_of("requests"), Some("2.31.0"));
        assert_eq!(lock.version_of("urllib3"), Some("2.0.7"));
        assert_eq!(
            lock.entries[1],
            Entry::Other("mypkg @ file:///tmp/mypkg".to_string())
        );
        assert_eq!(lock.package_names(), vec!["requests", "urllib3"]);
    }

    #[test]
    fn test_parse_extras_and_markers() {
        let lock = Lockfile::parse("uvicorn[standard]==0.23.2\nfoo==1.0 ; python_version < \"3.10\"\n");
        assert_eq!(lock.version_of("uvicorn"), Some("0.23.2"));
        assert_eq!(lock.version_of("foo"), Some("1.0"));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Django"), "django");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("typing__extensions"), "typing-extensions");
        assert_eq!(normalize_name("a-_.b"), "a-b");
    }

    #[test]
    fn test_version_of_uses_normalized_names() {
        let lock = Lockfile::parse("Typing_Extensions==4.8.0\n");
        assert_eq!(lock.version_of("typing-extensions"), Some("4.8.0"));
    }

    #[test]
    fn test_restore_previous_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("requirements.txt");
        write(&path, "A==2.0\n").unwrap();

        restore(&path, Some("A==1.0\n")).unwrap();
        assert_eq!(read(&path).unwrap().as_deref(), Some("A==1.0\n"));

        restore(&path, None).unwrap();
        assert_eq!(read(&path).unwrap(), None);
        restore(&path, None).unwrap();
    }

    #[test]
    fn test_render() {
        let lock = Lockfile::parse("a==1.0\nb @ file:///b\n");
        assert_eq!(lock.render(), "a==1.0\nb @ file:///b\n");
        assert_eq!(Lockfile::default().render(), "");
    }

    #[test]
    fn test_diff_upgrade_keeps_unchanged_entries() {
        let before = Lockfile::parse("A==1.0\nB==2.0\n");
        let after = Lockfile::parse("A==1.1\nB==2.0\n");

        let diff = before.diff(&after);
        assert_eq!(
            diff.upgraded,
            vec![VersionChange {
                name: "A".to_string(),
                from: "1.0".to_string(),
                to: "1.1".to_string(),
            }]
        );
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.unchanged, 1);
        assert!(!diff.is_empty());

        assert_eq!(after.version_of("A"), Some("1.1"));
        assert_eq!(after.version_of("B"), Some("2.0"));
        assert_eq!(after.pins().count(), 2);
    }

    #[test]
    fn test_diff_added_and_removed() {
        let before = Lockfile::parse("old==1\nshared==2\n");
        let after = Lockfile::parse("shared==2\nnew==3\n");
        let diff = before.diff(&after);
        assert_eq!(diff.added[0].name, "new");
        assert_eq!(diff.removed[0].name, "old");
        assert!(diff.upgraded.is_empty());
    }

    #[test]
    fn test_diff_from_missing_lockfile() {
        let diff = Lockfile::default().diff(&Lockfile::parse("a==1\nb==2\n"));
        assert_eq!(diff.added.len(), 2);
        assert_eq!(diff.unchanged, 0);
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        assert_eq!(
            digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(digest("a==1\n"), digest("a==2\n"));
    }

    #[test]
    fn test_read_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        assert_eq!(read(&temp.path().join("requirements.txt")).unwrap(), None);
    }

    #[test]
    fn test_write_overwrites_byte_for_byte() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("requirements.txt");
        std::fs::write(&path, "stale==0.1\nother==9\n").unwrap();

        let freeze = "fresh==1.0\r\nweird @ file:///x\n";
        write(&path, freeze).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), freeze);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deps").join("requirements.txt");
        write(&path, "a==1\n").unwrap();
        assert_eq!(read(&path).unwrap().as_deref(), Some("a==1\n"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(crate::config::defaults::MIN_PROPTEST_ITERATIONS))]

        /// A lockfile never differs from itself
        #[test]
        fn prop_diff_with_self_is_empty(
            pins in proptest::collection::btree_map(package_name(), pep440_version(), 0..20)
        ) {
            let text: String = pins.iter().map(|(n, v)| format!("{n}=={v}\n")).collect();
            let lock = Lockfile::parse(&text);
            let diff = lock.diff(&lock);
            prop_assert!(diff.is_empty());
            prop_assert_eq!(diff.unchanged, lock.pins().count());
        }

        /// Every pin of freeze output is recoverable by name
        #[test]
        fn prop_parse_recovers_every_pin(
            pins in proptest::collection::btree_map(package_name(), pep440_version(), 0..20)
        ) {
            let text: String = pins.iter().map(|(n, v)| format!("{n}=={v}\n")).collect();
            let lock = Lockfile::parse(&text);
            for (name, version) in &pins {
                prop_assert_eq!(lock.version_of(name), Some(version.as_str()));
            }
            prop_assert_eq!(lock.render(), text);
        }

        /// Bumping one pin shows up as exactly one upgrade
        #[test]
        fn prop_single_bump_is_single_upgrade(
            pins in proptest::collection::btree_map(package_name(), pep440_version(), 1..20),
            pick in any::<prop::sample::Index>()
        ) {
            let names: Vec<&String> = pins.keys().collect();
            let bumped = names[pick.index(names.len())].clone();
            let before: String = pins.iter().map(|(n, v)| format!("{n}=={v}\n")).collect();
            let after: String = pins
                .iter()
                .map(|(n, v)| if *n == bumped { format!("{n}=={v}.post1\n") } else { format!("{n}=={v}\n") })
                .collect();

            let diff = Lockfile::parse(&before).diff(&Lockfile::parse(&after));
            prop_assert_eq!(diff.upgraded.len(), 1);
            prop_assert_eq!(&diff.upgraded[0].name, &bumped);
            prop_assert!(diff.added.is_empty() && diff.removed.is_empty());
        }
    }
}
