//! Depth and changelist scoping.
//!
//! A [`PathFilter`] restricts which paths the driver, the status walk and
//! the conflict enumeration touch. Depth is measured from the operation
//! target; changelists only hold files, so directories always pass the
//! changelist test and their unlisted file children are filtered instead.

use crate::models::{Depth, NodeKind};
use crate::target;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    /// Relpath of the operation target.
    pub target: String,
    pub depth: Depth,
    /// Empty means "no changelist restriction".
    pub changelists: Vec<String>,
}

impl PathFilter {
    pub fn new(target: impl Into<String>, depth: Depth) -> Self {
        Self {
            target: target.into(),
            depth,
            changelists: Vec::new(),
        }
    }

    /// Everything below the working-copy root.
    pub fn everything() -> Self {
        Self::new("", Depth::Infinity)
    }

    pub fn with_changelists(mut self, changelists: Vec<String>) -> Self {
        self.changelists = changelists;
        self
    }

    /// `true` if `path` of `kind` lies within the requested depth.
    pub fn in_depth(&self, path: &str, kind: NodeKind) -> bool {
        match target::depth_below(&self.target, path) {
            None => false,
            Some(0) => true,
            Some(distance) => depth_admits(self.depth, distance, kind),
        }
    }

    /// `true` if a node with the given changelist passes the changelist test.
    pub fn in_changelists(&self, kind: NodeKind, changelist: Option<&str>) -> bool {
        if self.changelists.is_empty() || kind == NodeKind::Dir {
            return true;
        }
        changelist
            .map(|cl| self.changelists.iter().any(|c| c == cl))
            .unwrap_or(false)
    }

    pub fn admits(&self, path: &str, kind: NodeKind, changelist: Option<&str>) -> bool {
        self.in_depth(path, kind) && self.in_changelists(kind, changelist)
    }

    /// `true` if a walk should list the children of directory `path`.
    pub fn descends_into(&self, path: &str) -> bool {
        match target::depth_below(&self.target, path) {
            None => false,
            Some(0) => self.depth > Depth::Empty,
            Some(_) => self.depth == Depth::Infinity,
        }
    }
}

/// Whether a node `distance` levels below a directory whose depth is `depth`
/// falls inside it. Files are never subject to a depth of their own.
pub fn depth_admits(depth: Depth, distance: usize, kind: NodeKind) -> bool {
    match depth {
        Depth::Empty => distance == 0,
        Depth::Files => distance == 0 || (distance == 1 && kind != NodeKind::Dir),
        Depth::Immediates => distance <= 1,
        Depth::Infinity => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_scoping() {
        let files = PathFilter::new("a", Depth::Files);
        assert!(files.in_depth("a", NodeKind::Dir));
        assert!(files.in_depth("a/x.txt", NodeKind::File));
        assert!(!files.in_depth("a/sub", NodeKind::Dir));
        assert!(!files.in_depth("a/sub/y", NodeKind::File));
        assert!(!files.in_depth("b", NodeKind::File));

        let imm = PathFilter::new("a", Depth::Immediates);
        assert!(imm.in_depth("a/sub", NodeKind::Dir));
        assert!(!imm.in_depth("a/sub/y", NodeKind::File));

        let empty = PathFilter::new("a", Depth::Empty);
        assert!(empty.in_depth("a", NodeKind::Dir));
        assert!(!empty.in_depth("a/x.txt", NodeKind::File));

        assert!(PathFilter::everything().in_depth("deep/er/still", NodeKind::File));
    }

    #[test]
    fn test_changelist_scoping() {
        let f = PathFilter::everything().with_changelists(vec!["fixes".into()]);
        assert!(f.admits("a.txt", NodeKind::File, Some("fixes")));
        assert!(!f.admits("b.txt", NodeKind::File, Some("other")));
        assert!(!f.admits("c.txt", NodeKind::File, None));
        assert!(f.admits("dir", NodeKind::Dir, None));
    }

    #[test]
    fn test_descends_into() {
        assert!(!PathFilter::new("", Depth::Empty).descends_into(""));
        assert!(PathFilter::new("", Depth::Files).descends_into(""));
        assert!(!PathFilter::new("", Depth::Immediates).descends_into("a"));
        assert!(PathFilter::new("", Depth::Infinity).descends_into("a/b"));
    }
}
