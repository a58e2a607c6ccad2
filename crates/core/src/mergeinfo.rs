//! Merge tracking: revision ranges and the `svn:mergeinfo` property.
//!
//! A [`MergeRange`] is a half-open `(start, end]` pair of revisions; a range
//! with `start > end` describes a reverse merge. A [`RangeList`] holds only
//! forward ranges, sorted, non-overlapping, with adjacent ranges of equal
//! inheritability coalesced. All set operations rebuild the list from the
//! elementary intervals between range boundaries, so the invariants hold
//! after every call.
//!
//! Property text format, one source per line, sources sorted:
//!
//! ```text
//! /branches/feature:3-5,7*,9
//! /trunk:12
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::MergeInfoError;
use crate::models::Revnum;

const NON_INHERITABLE: char = '*';

// ---------------------------------------------------------------------------
// MergeRange
// ---------------------------------------------------------------------------

/// A revision range `(start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeRange {
    pub start: Revnum,
    pub end: Revnum,
    pub inheritable: bool,
}

impl MergeRange {
    pub fn new(start: Revnum, end: Revnum) -> Self {
        Self {
            start,
            end,
            inheritable: true,
        }
    }

    /// The inclusive span `first..=last`, e.g. `revisions(5, 5)` is r5 alone.
    pub fn revisions(first: Revnum, last: Revnum) -> Self {
        Self::new(first - 1, last)
    }

    pub fn is_reverse(&self) -> bool {
        self.start > self.end
    }

    /// The same span with endpoints swapped.
    pub fn reversed(&self) -> Self {
        Self {
            start: self.end,
            end: self.start,
            inheritable: self.inheritable,
        }
    }

    /// The forward form of this range.
    pub fn forward(&self) -> Self {
        if self.is_reverse() {
            self.reversed()
        } else {
            *self
        }
    }

    /// Lowest and highest revision touched, inclusive.
    pub fn bounds(&self) -> (Revnum, Revnum) {
        let fwd = self.forward();
        (fwd.start + 1, fwd.end)
    }

    pub fn contains(&self, revision: Revnum) -> bool {
        let fwd = self.forward();
        revision > fwd.start && revision <= fwd.end
    }

    fn parse(source: &str, text: &str) -> Result<Self, MergeInfoError> {
        let invalid = || MergeInfoError::InvalidRange {
            source_path: source.to_string(),
            range: text.to_string(),
        };
        let (body, inheritable) = match text.strip_suffix(NON_INHERITABLE) {
            Some(body) => (body, false),
            None => (text, true),
        };
        let parse_rev = |s: &str| s.trim().parse::<Revnum>().map_err(|_| invalid());
        let (first, last) = match body.split_once('-') {
            Some((a, b)) => (parse_rev(a)?, parse_rev(b)?),
            None => {
                let r = parse_rev(body)?;
                (r, r)
            }
        };
        if first < 1 || last < first {
            return Err(invalid());
        }
        Ok(Self {
            start: first - 1,
            end: last,
            inheritable,
        })
    }
}

impl std::fmt::Display for MergeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (first, last) = self.bounds();
        if first == last {
            write!(f, "{last}")?;
        } else if self.is_reverse() {
            write!(f, "{last}-{first}")?;
        } else {
            write!(f, "{first}-{last}")?;
        }
        if !self.inheritable {
            write!(f, "{NON_INHERITABLE}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RangeList
// ---------------------------------------------------------------------------

/// A normalised list of forward revision ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeList {
    ranges: Vec<MergeRange>,
}

impl RangeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from arbitrary (possibly overlapping or reverse) ranges.
    /// Overlaps are unioned; inheritable wins where ranges disagree.
    pub fn from_ranges(ranges: impl IntoIterator<Item = MergeRange>) -> Self {
        let raw: Vec<MergeRange> = ranges.into_iter().map(|r| r.forward()).collect();
        let points = boundaries(raw.iter());
        Self {
            ranges: build(&points, |p, q| cover_any(&raw, p, q)),
        }
    }

    pub fn ranges(&self) -> &[MergeRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn includes(&self, revision: Revnum) -> bool {
        self.ranges.iter().any(|r| r.contains(revision))
    }

    /// Union; inheritable wins where both lists cover a revision.
    pub fn union(&self, other: &RangeList) -> RangeList {
        Self::from_ranges(self.ranges.iter().chain(other.ranges.iter()).copied())
    }

    /// Revisions of `self` not in `eraser`.
    pub fn remove(&self, eraser: &RangeList) -> RangeList {
        let points = boundaries(self.ranges.iter().chain(eraser.ranges.iter()));
        RangeList {
            ranges: build(&points, |p, q| match cover_any(&self.ranges, p, q) {
                Some(inh) if cover_any(&eraser.ranges, p, q).is_none() => Some(inh),
                _ => None,
            }),
        }
    }

    /// Revisions in both lists, keeping the inheritability of `self`.
    pub fn intersect(&self, other: &RangeList) -> RangeList {
        let points = boundaries(self.ranges.iter().chain(other.ranges.iter()));
        RangeList {
            ranges: build(&points, |p, q| match cover_any(&self.ranges, p, q) {
                Some(inh) if cover_any(&other.ranges, p, q).is_some() => Some(inh),
                _ => None,
            }),
        }
    }

    /// The ranges as a reverse merge would apply them: newest first, each
    /// with swapped endpoints.
    pub fn reversed(&self) -> Vec<MergeRange> {
        self.ranges.iter().rev().map(MergeRange::reversed).collect()
    }

    /// Only the inheritable ranges.
    pub fn inheritable_only(&self) -> RangeList {
        RangeList {
            ranges: self.ranges.iter().filter(|r| r.inheritable).copied().collect(),
        }
    }

    /// Parse `3-5,7*,9`. Overlapping ranges are rejected.
    pub fn parse(source: &str, text: &str) -> Result<Self, MergeInfoError> {
        let mut parsed = Vec::new();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            parsed.push(MergeRange::parse(source, part)?);
        }
        parsed.sort_by_key(|r| r.start);
        if parsed.windows(2).any(|w| w[1].start < w[0].end) {
            return Err(MergeInfoError::Overlapping(source.to_string()));
        }
        Ok(Self::from_ranges(parsed))
    }
}

impl std::fmt::Display for RangeList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

fn boundaries<'a>(ranges: impl Iterator<Item = &'a MergeRange>) -> Vec<Revnum> {
    let mut points: Vec<Revnum> = ranges.flat_map(|r| [r.start, r.end]).collect();
    points.sort_unstable();
    points.dedup();
    points
}

/// Inheritability of the ranges covering `(p, q]`, inheritable winning;
/// `None` if no range covers it.
fn cover_any(ranges: &[MergeRange], p: Revnum, q: Revnum) -> Option<bool> {
    ranges
        .iter()
        .filter(|r| r.start <= p && q <= r.end)
        .map(|r| r.inheritable)
        .reduce(|a, b| a || b)
}

/// Rebuild a normalised list from the elementary intervals between `points`.
fn build(points: &[Revnum], cover: impl Fn(Revnum, Revnum) -> Option<bool>) -> Vec<MergeRange> {
    let mut out: Vec<MergeRange> = Vec::new();
    for w in points.windows(2) {
        let (p, q) = (w[0], w[1]);
        let Some(inheritable) = cover(p, q) else {
            continue;
        };
        match out.last_mut() {
            Some(last) if last.end == p && last.inheritable == inheritable => last.end = q,
            _ => out.push(MergeRange {
                start: p,
                end: q,
                inheritable,
            }),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Mergeinfo
// ---------------------------------------------------------------------------

/// Merge-tracking metadata: per source path, the revisions already merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mergeinfo {
    sources: BTreeMap<String, RangeList>,
}

impl Mergeinfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the property text.
    pub fn parse(text: &str) -> Result<Self, MergeInfoError> {
        let mut sources: BTreeMap<String, RangeList> = BTreeMap::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (source, ranges) = line
                .rsplit_once(':')
                .ok_or_else(|| MergeInfoError::MissingSeparator(line.to_string()))?;
            let parsed = RangeList::parse(source, ranges)?;
            let entry = sources.entry(source.to_string()).or_default();
            *entry = entry.union(&parsed);
        }
        Ok(Self { sources })
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, source: &str) -> Option<&RangeList> {
        self.sources.get(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = (&str, &RangeList)> {
        self.sources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Record `range` for `source`; reverse ranges are subtracted instead.
    pub fn apply_range(&mut self, source: &str, range: MergeRange) {
        let list = RangeList::from_ranges([range]);
        if range.is_reverse() {
            if let Some(existing) = self.sources.get(source) {
                let remaining = existing.remove(&list);
                self.set(source, remaining);
            }
        } else {
            let entry = self.sources.entry(source.to_string()).or_default();
            *entry = entry.union(&list);
        }
    }

    /// Union with another mergeinfo, source by source.
    pub fn merge(&mut self, other: &Mergeinfo) {
        for (source, ranges) in &other.sources {
            let entry = self.sources.entry(source.clone()).or_default();
            *entry = entry.union(ranges);
        }
    }

    /// Revisions of `self` not recorded in `eraser`.
    pub fn remove(&self, eraser: &Mergeinfo) -> Mergeinfo {
        let mut out = Mergeinfo::new();
        for (source, ranges) in &self.sources {
            let remaining = match eraser.sources.get(source) {
                Some(erase) => ranges.remove(erase),
                None => ranges.clone(),
            };
            out.set(source, remaining);
        }
        out
    }

    /// Revisions recorded in both.
    pub fn intersect(&self, other: &Mergeinfo) -> Mergeinfo {
        let mut out = Mergeinfo::new();
        for (source, ranges) in &self.sources {
            if let Some(theirs) = other.sources.get(source) {
                out.set(source, ranges.intersect(theirs));
            }
        }
        out
    }

    /// Mergeinfo a child at relative path `rel` inherits from this node:
    /// inheritable ranges only, with `rel` appended to every source.
    pub fn inherited_by(&self, rel: &str) -> Mergeinfo {
        let mut out = Mergeinfo::new();
        for (source, ranges) in &self.sources {
            let child_source = if rel.is_empty() {
                source.clone()
            } else {
                format!("{}/{}", source.trim_end_matches('/'), rel)
            };
            out.set(&child_source, ranges.inheritable_only());
        }
        out
    }

    /// Sub-ranges of `requested` a merge from `source` still has to apply.
    ///
    /// Forward merges skip revisions already recorded; reverse merges only
    /// undo revisions that are recorded, newest first.
    pub fn remaining_ranges(&self, source: &str, requested: MergeRange) -> Vec<MergeRange> {
        let wanted = RangeList::from_ranges([requested]);
        let recorded = self.sources.get(source).cloned().unwrap_or_default();
        if requested.is_reverse() {
            wanted.intersect(&recorded).reversed()
        } else {
            wanted.remove(&recorded).ranges().to_vec()
        }
    }

    fn set(&mut self, source: &str, ranges: RangeList) {
        if ranges.is_empty() {
            self.sources.remove(source);
        } else {
            self.sources.insert(source.to_string(), ranges);
        }
    }
}

impl std::fmt::Display for Mergeinfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (source, ranges)) in self.sources.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{source}:{ranges}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(text: &str) -> RangeList {
        RangeList::parse("/src", text).unwrap()
    }

    #[test]
    fn test_adjacent_ranges_coalesce_and_split_back() {
        let mut mi = Mergeinfo::new();
        mi.apply_range("/trunk", MergeRange::revisions(5, 5));
        mi.apply_range("/trunk", MergeRange::revisions(6, 6));
        assert_eq!(mi.to_string(), "/trunk:5-6");
        assert_eq!(mi.get("/trunk").unwrap().ranges().len(), 1);

        mi.apply_range("/trunk", MergeRange::revisions(6, 6).reversed());
        assert_eq!(mi.to_string(), "/trunk:5");

        mi.apply_range("/trunk", MergeRange::revisions(5, 5).reversed());
        assert!(mi.is_empty());
    }

    #[test]
    fn test_parse_and_format() {
        let mi = Mergeinfo::parse("/trunk:12\n/branches/feature:9,3-5,7*\n").unwrap();
        assert_eq!(mi.to_string(), "/branches/feature:3-5,7*,9\n/trunk:12");

        assert!(matches!(
            Mergeinfo::parse("/trunk 12"),
            Err(MergeInfoError::MissingSeparator(_))
        ));
        assert!(matches!(
            Mergeinfo::parse("/trunk:5-3"),
            Err(MergeInfoError::InvalidRange { .. })
        ));
        assert!(matches!(
            Mergeinfo::parse("/trunk:3-6,5"),
            Err(MergeInfoError::Overlapping(_))
        ));
    }

    #[test]
    fn test_union_inheritable_wins() {
        let merged = list("1-4*").union(&list("3-6"));
        assert_eq!(merged.to_string(), "1-2*,3-6");
        assert_eq!(list("1-3").union(&list("4-5")).to_string(), "1-5");
        assert_eq!(list("1-3*").union(&list("4-5")).to_string(), "1-3*,4-5");
    }

    #[test]
    fn test_remove_and_intersect() {
        assert_eq!(list("1-10").remove(&list("3-4,8")).to_string(), "1-2,5-7,9-10");
        assert_eq!(list("1-10").intersect(&list("3-4,8,12")).to_string(), "3-4,8");
        assert!(list("3").remove(&list("1-5")).is_empty());
    }

    #[test]
    fn test_reverse_and_includes() {
        let l = list("2-3,7");
        let rev = l.reversed();
        assert_eq!(rev[0], MergeRange::new(7, 6));
        assert_eq!(rev[1], MergeRange::new(3, 1));
        assert_eq!(rev[1].to_string(), "3-2");
        assert!(l.includes(2));
        assert!(!l.includes(4));
    }

    #[test]
    fn test_remaining_ranges() {
        let mi = Mergeinfo::parse("/trunk:3-4").unwrap();
        let todo = mi.remaining_ranges("/trunk", MergeRange::revisions(1, 6));
        assert_eq!(todo, vec![MergeRange::new(0, 2), MergeRange::new(4, 6)]);

        let undo = mi.remaining_ranges("/trunk", MergeRange::revisions(1, 6).reversed());
        assert_eq!(undo, vec![MergeRange::new(4, 2)]);

        assert!(mi
            .remaining_ranges("/trunk", MergeRange::revisions(3, 4))
            .is_empty());
    }

    #[test]
    fn test_inherited_by_child() {
        let mi = Mergeinfo::parse("/branches/b:1-5,7*").unwrap();
        assert_eq!(mi.inherited_by("sub/x.txt").to_string(), "/branches/b/sub/x.txt:1-5");
    }
}
