//! Distributed filesystem paths.
//!
//! A [`Path`] names a file or directory in the global namespace as a finite
//! sequence of components. Paths are immutable values: every operation that
//! would change a path returns a new one. The string representation is a
//! forward-slash-delimited sequence of components, with the root directory
//! written as a single `/`.
//!
//! The forward slash is the delimiter and the colon is reserved for
//! application use, so neither may appear inside a component.

use crate::error::{DfsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::instrument;

/// An immutable, hierarchical path in the distributed filesystem.
///
/// Two paths are equal if and only if their component sequences are equal,
/// and equal paths hash equal. The ordering is lexicographic over the
/// component sequence, so paths can key ordered maps.
///
/// On the wire a path travels as its canonical string form; parsing that
/// form back yields an equal path.
///
/// # Examples
/// ```rust
/// use dfs::Path;
///
/// let path: Path = "/usr/bin".parse().unwrap();
/// assert_eq!(path.to_string(), "/usr/bin");
/// assert_eq!(path.parent().unwrap().to_string(), "/usr");
/// assert_eq!(path.last().unwrap(), "bin");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// creates the path representing the root directory
    pub fn root() -> Path {
        Path {
            components: Vec::new(),
        }
    }

    /// Returns a new path equal to this one with `component` appended.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] if `component` is empty or
    /// contains a separator or a colon
    pub fn append(&self, component: &str) -> Result<Path> {
        if !valid_component(component) {
            return Err(DfsError::InvalidArgument(format!(
                "invalid path component {:?}",
                component
            )));
        }

        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Path { components })
    }

    /// determines whether this path represents the root directory
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the path to the parent of this path.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] for the root directory, which
    /// has no parent
    pub fn parent(&self) -> Result<Path> {
        if self.is_root() {
            return Err(DfsError::InvalidArgument(
                "the root directory has no parent".to_string(),
            ));
        }

        Ok(Path {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Returns the last component of this path.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] for the root directory, which
    /// has no components
    pub fn last(&self) -> Result<&str> {
        self.components
            .last()
            .map(String::as_str)
            .ok_or_else(|| {
                DfsError::InvalidArgument("the root directory has no last component".to_string())
            })
    }

    /// Determines whether `other` is a subpath of this path, that is,
    /// whether `other`'s component sequence is a prefix of this path's.
    ///
    /// Every path is a subpath of itself. Components are compared whole:
    /// `/foo` is not a subpath prefix of `/foobar`.
    pub fn is_subpath(&self, other: &Path) -> bool {
        other.components.len() <= self.components.len()
            && self.components[..other.components.len()] == other.components[..]
    }

    /// returns an iterator over the components of this path, outermost first
    pub fn components(&self) -> Components<'_> {
        Components(self.components.iter())
    }

    /// Lists the relative paths of all regular files in the local directory
    /// tree rooted at `directory`.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if `directory` does not exist and
    /// [`DfsError::InvalidArgument`] if it exists but is not a directory, or
    /// if a file name in the tree is not expressible as a path component
    #[instrument]
    pub fn list(directory: &std::path::Path) -> Result<Vec<Path>> {
        let metadata = fs::metadata(directory).map_err(|_| {
            DfsError::NotFound(format!("directory {} does not exist", directory.display()))
        })?;
        if !metadata.is_dir() {
            return Err(DfsError::InvalidArgument(format!(
                "{} is not a directory",
                directory.display()
            )));
        }

        let mut found = Vec::new();
        let mut pending = VecDeque::new();
        pending.push_back((directory.to_path_buf(), Path::root()));

        while let Some((local, at)) = pending.pop_front() {
            for entry in fs::read_dir(&local)? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_str().ok_or_else(|| {
                    DfsError::InvalidArgument(format!(
                        "file name {:?} is not valid UTF-8",
                        entry.file_name()
                    ))
                })?;
                let below = at.append(name)?;

                let kind = entry.file_type()?;
                if kind.is_dir() {
                    pending.push_back((entry.path(), below));
                } else if kind.is_file() {
                    found.push(below);
                }
            }
        }

        Ok(found)
    }

    /// returns the local filesystem location of this path under `root`,
    /// joined component-wise
    pub fn to_local(&self, root: &std::path::Path) -> PathBuf {
        let mut local = root.to_path_buf();
        for component in &self.components {
            local.push(component);
        }
        local
    }
}

/// checks whether a string is usable as a single path component
fn valid_component(component: &str) -> bool {
    !component.is_empty() && !component.contains('/') && !component.contains(':')
}

impl FromStr for Path {
    type Err = DfsError;

    /// Parses a path from its string form.
    ///
    /// The string must begin with a forward slash and must not contain a
    /// colon. Empty components produced by repeated slashes are dropped.
    fn from_str(s: &str) -> Result<Path> {
        if !s.starts_with('/') {
            return Err(DfsError::InvalidArgument(format!(
                "path {:?} does not begin with '/'",
                s
            )));
        }
        if s.contains(':') {
            return Err(DfsError::InvalidArgument(format!(
                "path {:?} contains a colon",
                s
            )));
        }

        let components = s
            .split('/')
            .filter(|component| !component.is_empty())
            .map(String::from)
            .collect();
        Ok(Path { components })
    }
}

impl TryFrom<String> for Path {
    type Error = DfsError;

    fn try_from(s: String) -> Result<Path> {
        s.parse()
    }
}

impl From<Path> for String {
    fn from(path: Path) -> String {
        path.to_string()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// iterator over the components of a [`Path`], outermost first
pub struct Components<'a>(std::slice::Iter<'a, String>);

impl<'a> Iterator for Components<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.0.next().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a str;
    type IntoIter = Components<'a>;

    fn into_iter(self) -> Components<'a> {
        self.components()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn path(s: &str) -> Path {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_format_round_trip() {
        assert_eq!(path("/a/b/c").to_string(), "/a/b/c");
        assert_eq!(path("/").to_string(), "/");
        assert_eq!(path("//a///b").to_string(), "/a/b");
        assert_eq!(path("/a/b/").to_string(), "/a/b");

        for s in &["/", "/a", "/a/b/c"] {
            let p = path(s);
            assert_eq!(p.to_string().parse::<Path>().unwrap(), p);
        }
    }

    #[test]
    fn parse_rejects_malformed_strings() {
        assert!("a/b".parse::<Path>().is_err());
        assert!("".parse::<Path>().is_err());
        assert!("/a:b".parse::<Path>().is_err());
    }

    #[test]
    fn root_has_no_parent_or_last() {
        assert!(path("/").is_root());
        assert!(path("/").parent().is_err());
        assert!(path("/").last().is_err());
    }

    #[test]
    fn append_and_parent_are_inverse() {
        let p = path("/a/b/c");
        let parent = p.parent().unwrap();
        let rebuilt = parent.append(p.last().unwrap()).unwrap();
        assert_eq!(rebuilt, p);
        assert_eq!(rebuilt.parent().unwrap(), parent);
        assert_eq!(rebuilt.last().unwrap(), "c");
    }

    #[test]
    fn append_rejects_invalid_components() {
        assert!(path("/a").append("").is_err());
        assert!(path("/a").append("b/c").is_err());
        assert!(path("/a").append("b:c").is_err());
    }

    #[test]
    fn subpath_compares_components_not_prefixes() {
        let p = path("/foo/bar");
        assert!(p.is_subpath(&p));
        assert!(p.is_subpath(&path("/foo")));
        assert!(p.is_subpath(&path("/")));
        assert!(p.append("baz").unwrap().is_subpath(&p));

        assert!(!path("/foobar").is_subpath(&path("/foo")));
        assert!(!path("/foo").is_subpath(&path("/foo/bar")));
    }

    #[test]
    fn components_iterate_outermost_first() {
        let p = path("/a/b/c");
        let collected: Vec<&str> = p.components().collect();
        assert_eq!(collected, vec!["a", "b", "c"]);
        assert_eq!(path("/").components().next(), None);
    }

    #[test]
    fn serde_round_trips_the_canonical_form() {
        let p = path("/a/b");
        let encoded = serde_json::to_string(&p).unwrap();
        assert_eq!(encoded, "\"/a/b\"");
        assert_eq!(serde_json::from_str::<Path>(&encoded).unwrap(), p);
        assert!(serde_json::from_str::<Path>("\"a/b\"").is_err());
    }

    #[test]
    fn to_local_joins_component_wise() {
        let root = std::path::Path::new("/tmp/store");
        assert_eq!(path("/a/b").to_local(root), root.join("a").join("b"));
        assert_eq!(path("/").to_local(root), root.to_path_buf());
    }

    #[test]
    fn list_walks_the_local_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
        File::create(dir.path().join("top")).unwrap();
        File::create(dir.path().join("sub/inner/leaf")).unwrap();

        let mut listed = Path::list(dir.path()).unwrap();
        listed.sort();
        assert_eq!(listed, vec![path("/sub/inner/leaf"), path("/top")]);
    }

    #[test]
    fn list_rejects_missing_or_non_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Path::list(&dir.path().join("absent")),
            Err(DfsError::NotFound(_))
        ));

        let file = dir.path().join("plain");
        File::create(&file).unwrap();
        assert!(matches!(
            Path::list(&file),
            Err(DfsError::InvalidArgument(_))
        ));
    }
}
