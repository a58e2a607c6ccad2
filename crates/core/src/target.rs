//! Target model: turns user-supplied strings into disambiguated references.
//!
//! A target is either a working-copy path or a repository URL, optionally
//! carrying a peg revision (`url@123`, `path@HEAD`). The last `@` always
//! separates the peg, so a path that itself contains `@` is written with a
//! trailing `@` (`foo@bar@` names `foo@bar` with no peg). Normalisation
//! makes equal references compare and hash equal.
//!
//! The module also holds the relative-path helpers used throughout the
//! crate. Working-copy paths are stored relative to the root, `/`-separated,
//! with the root itself as the empty string.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::TargetError;
use crate::models::Revnum;

const URL_SCHEMES: &[&str] = &["http://", "https://", "svn://", "svn+ssh://", "file://"];

/// A peg revision: the revision at which a path's identity is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PegRevision {
    Number(Revnum),
    Head,
    Base,
    Committed,
    Prev,
}

impl PegRevision {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HEAD" => Some(Self::Head),
            "BASE" => Some(Self::Base),
            "COMMITTED" => Some(Self::Committed),
            "PREV" => Some(Self::Prev),
            other => {
                let digits = other.strip_prefix('R').unwrap_or(other);
                digits.parse::<Revnum>().ok().filter(|n| *n >= 0).map(Self::Number)
            }
        }
    }
}

impl std::fmt::Display for PegRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Head => write!(f, "HEAD"),
            Self::Base => write!(f, "BASE"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Prev => write!(f, "PREV"),
        }
    }
}

/// A normalised user target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// A local working-copy path (absolute or relative to the cwd).
    Path {
        path: String,
        peg: Option<PegRevision>,
    },
    /// A repository URL.
    Url {
        url: String,
        peg: Option<PegRevision>,
    },
}

impl Target {
    /// Parse and normalise a raw target string.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        if raw.is_empty() {
            return Err(TargetError::Empty);
        }
        let (body, peg) = split_peg(raw)?;
        if body.is_empty() {
            return Err(TargetError::Empty);
        }
        if is_url(body) {
            Ok(Self::Url {
                url: canonicalize_url(body)?,
                peg,
            })
        } else {
            Ok(Self::Path {
                path: canonicalize_path(body),
                peg,
            })
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url { .. })
    }

    pub fn peg(&self) -> Option<PegRevision> {
        match self {
            Self::Path { peg, .. } | Self::Url { peg, .. } => *peg,
        }
    }

    /// The path or URL without the peg.
    pub fn body(&self) -> &str {
        match self {
            Self::Path { path, .. } => path,
            Self::Url { url, .. } => url,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peg() {
            Some(peg) => write!(f, "{}@{}", self.body(), peg),
            None => write!(f, "{}", self.body()),
        }
    }
}

/// `true` if `s` starts with a known repository URL scheme.
pub fn is_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    URL_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

fn split_peg(raw: &str) -> Result<(&str, Option<PegRevision>), TargetError> {
    let Some(at) = raw.rfind('@') else {
        return Ok((raw, None));
    };
    // '@' inside the last path segment of a URL host part (user@host) is not
    // a peg when nothing path-like follows it.
    let (body, peg_str) = (&raw[..at], &raw[at + 1..]);
    if peg_str.contains('/') {
        return Ok((raw, None));
    }
    if peg_str.is_empty() {
        return Ok((body, None));
    }
    match PegRevision::parse(peg_str) {
        Some(peg) => Ok((body, Some(peg))),
        None => Err(TargetError::InvalidPeg {
            target: raw.to_string(),
            peg: peg_str.to_string(),
        }),
    }
}

fn canonicalize_url(url: &str) -> Result<String, TargetError> {
    let scheme_end = url.find("://").ok_or_else(|| TargetError::InvalidUrl(url.to_string()))?;
    let scheme = url[..scheme_end].to_ascii_lowercase();
    let rest = &url[scheme_end + 3..];
    let (host, path) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, ""),
    };
    if host.is_empty() && scheme != "file" {
        return Err(TargetError::InvalidUrl(url.to_string()));
    }
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut out = format!("{}://{}", scheme, host.to_ascii_lowercase());
    for seg in segments {
        out.push('/');
        out.push_str(seg);
    }
    Ok(out)
}

fn canonicalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

// ---------------------------------------------------------------------------
// Relative path helpers
// ---------------------------------------------------------------------------

/// Normalise a working-copy relative path. Rejects paths escaping the root.
pub fn normalize_relpath(path: &str) -> Result<String, TargetError> {
    let canonical = canonicalize_path(path);
    if canonical == "." {
        return Ok(String::new());
    }
    if canonical.starts_with('/') || canonical.split('/').any(|s| s == "..") {
        return Err(TargetError::OutsideRoot(path.to_string()));
    }
    Ok(canonical)
}

/// Convert an on-disk path into a relpath below `root`.
pub fn relpath_from_fs(root: &Path, path: &Path) -> Result<String, TargetError> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root)
            .map_err(|_| TargetError::OutsideRoot(path.display().to_string()))?
    } else {
        path
    };
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(TargetError::OutsideRoot(path.display().to_string())),
        }
    }
    normalize_relpath(&parts.join("/"))
}

/// Join two relpaths.
pub fn join(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{child}"),
    }
}

/// Parent relpath; the root's parent is `None`.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map(|pos| &path[..pos]).unwrap_or(""))
}

/// Last component of a relpath.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// If `child` is `ancestor` or below it, return the remainder (empty for
/// equality).
pub fn skip_ancestor<'a>(ancestor: &str, child: &'a str) -> Option<&'a str> {
    if ancestor.is_empty() {
        return Some(child);
    }
    if child == ancestor {
        return Some("");
    }
    child
        .strip_prefix(ancestor)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// `true` if `child` is `ancestor` or lies below it.
pub fn is_ancestor(ancestor: &str, child: &str) -> bool {
    skip_ancestor(ancestor, child).is_some()
}

/// Number of path components `child` lies below `ancestor`.
pub fn depth_below(ancestor: &str, child: &str) -> Option<usize> {
    skip_ancestor(ancestor, child).map(|rest| {
        if rest.is_empty() {
            0
        } else {
            rest.split('/').count()
        }
    })
}

/// All proper ancestors of `path`, nearest first, ending with the root.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent(path), |p| parent(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_url_with_peg() {
        let t = Target::parse("HTTP://Svn.Example.com/repo//trunk/./src@123").unwrap();
        assert_eq!(
            t,
            Target::Url {
                url: "http://svn.example.com/repo/trunk/src".into(),
                peg: Some(PegRevision::Number(123)),
            }
        );
        assert_eq!(t.to_string(), "http://svn.example.com/repo/trunk/src@123");
    }

    #[test]
    fn test_parse_path_and_escape() {
        let t = Target::parse("foo@bar@").unwrap();
        assert_eq!(
            t,
            Target::Path {
                path: "foo@bar".into(),
                peg: None,
            }
        );
        let t = Target::parse("src/../lib/./x.rs@HEAD").unwrap();
        assert_eq!(t.body(), "lib/x.rs");
        assert_eq!(t.peg(), Some(PegRevision::Head));
    }

    #[test]
    fn test_invalid_peg() {
        assert!(matches!(
            Target::parse("file.txt@yesterday"),
            Err(TargetError::InvalidPeg { .. })
        ));
        assert_eq!(Target::parse(""), Err(TargetError::Empty));
    }

    #[test]
    fn test_equal_targets_hash_equal() {
        let a = Target::parse("svn://host/repo/trunk/").unwrap();
        let b = Target::parse("svn://HOST/repo/trunk").unwrap();
        assert_eq!(a, b);
        let set: HashSet<Target> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_relpath_helpers() {
        assert_eq!(normalize_relpath("./a//b/").unwrap(), "a/b");
        assert_eq!(normalize_relpath(".").unwrap(), "");
        assert!(normalize_relpath("../x").is_err());
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a", "b"), "a/b");
        assert_eq!(parent("a/b"), Some("a"));
        assert_eq!(parent("a"), Some(""));
        assert_eq!(parent(""), None);
        assert_eq!(skip_ancestor("a", "a/b/c"), Some("b/c"));
        assert_eq!(skip_ancestor("a", "ab"), None);
        assert_eq!(depth_below("", "a/b"), Some(2));
        assert_eq!(ancestors("a/b/c").collect::<Vec<_>>(), vec!["a/b", "a", ""]);
    }

    #[test]
    fn test_relpath_from_fs() {
        let root = Path::new("/wc");
        assert_eq!(relpath_from_fs(root, Path::new("/wc/a/b.txt")).unwrap(), "a/b.txt");
        assert_eq!(relpath_from_fs(root, Path::new("a/./b")).unwrap(), "a/b");
        assert!(relpath_from_fs(root, Path::new("/elsewhere/x")).is_err());
    }
}
