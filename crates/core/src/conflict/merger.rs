//! Three-way text merge engine.
//!
//! The line merge itself is diffy's. It runs in diff3 style with a marker
//! length longer than any marker-character run in the inputs, so every
//! marker line in its output is unambiguous. Those conflict blocks are then
//! parsed back into their mine, base and theirs sections. Each block is
//! re-rendered with our labels in the configured style, or replaced by one
//! side when the caller asks for it.

use tracing::debug;

use crate::config::{ConflictStyle, MergeConfig};

const MARKER_CHARS: [u8; 4] = [b'<', b'|', b'=', b'>'];

/// Which side wins conflicting hunks when merging without markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSide {
    Mine,
    Theirs,
}

/// Labels printed after the conflict markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLabels {
    pub mine: String,
    pub base: String,
    pub theirs: String,
}

impl MergeLabels {
    pub fn new(mine: impl Into<String>, base: impl Into<String>, theirs: impl Into<String>) -> Self {
        Self {
            mine: mine.into(),
            base: base.into(),
            theirs: theirs.into(),
        }
    }
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Merged text; contains conflict markers when `conflicts > 0`.
    pub merged_content: Vec<u8>,
    /// Number of conflicting hunks left in the output.
    pub conflicts: usize,
    /// Number of hunks resolved through `ConflictSide`.
    pub resolved_conflicts: usize,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        self.conflicts > 0
    }
}

/// A piece of diffy's merge output.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Clean(&'a [u8]),
    Conflict(Hunk<'a>),
}

/// One conflicting hunk. The last piece of a section may lack its `\n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Hunk<'a> {
    mine: Vec<&'a [u8]>,
    base: Vec<&'a [u8]>,
    theirs: Vec<&'a [u8]>,
}

/// Marker lines of one diffy run.
struct Markers {
    open: Vec<u8>,
    base: Vec<u8>,
    separator: Vec<u8>,
    close: Vec<u8>,
}

impl Markers {
    fn new(len: usize) -> Self {
        let line = |c: u8, label: &[u8]| {
            let mut l = vec![c; len];
            l.extend_from_slice(label);
            l.push(b'\n');
            l
        };
        Self {
            open: line(b'<', b" ours"),
            base: line(b'|', b" original"),
            separator: line(b'=', b""),
            close: line(b'>', b" theirs"),
        }
    }
}

/// Stateless three-way merge engine.
pub struct Merger;

impl Merger {
    /// Merge `mine` and `theirs` relative to `base`.
    ///
    /// With `side = None` conflicting hunks are written with markers in the
    /// configured style; otherwise they are replaced by the chosen side and
    /// counted in `resolved_conflicts`.
    pub fn three_way_merge(
        base: &[u8],
        mine: &[u8],
        theirs: &[u8],
        config: &MergeConfig,
        labels: &MergeLabels,
        side: Option<ConflictSide>,
    ) -> MergeResult {
        if mine == base || mine == theirs {
            debug!("mine matches base or theirs, theirs wins cleanly");
            return MergeResult {
                merged_content: theirs.to_vec(),
                conflicts: 0,
                resolved_conflicts: 0,
            };
        }
        if theirs == base {
            debug!("theirs == base, mine wins cleanly");
            return MergeResult {
                merged_content: mine.to_vec(),
                conflicts: 0,
                resolved_conflicts: 0,
            };
        }

        let marker_len = unambiguous_marker_len(config.marker_size, &[base, mine, theirs]);
        let merged = match diffy_merge(base, mine, theirs, marker_len) {
            Ok(clean) => {
                debug!("three-way merge finished cleanly");
                return MergeResult {
                    merged_content: clean,
                    conflicts: 0,
                    resolved_conflicts: 0,
                };
            }
            Err(marked) => marked,
        };

        let segments = parse_segments(&merged, &Markers::new(marker_len));
        let mut out = Vec::with_capacity(merged.len());
        let mut conflicts = 0;
        let mut resolved_conflicts = 0;
        for segment in &segments {
            match segment {
                Segment::Clean(line) => out.extend_from_slice(line),
                Segment::Conflict(hunk) => match side {
                    Some(ConflictSide::Mine) => {
                        resolved_conflicts += 1;
                        extend(&mut out, &hunk.mine);
                    }
                    Some(ConflictSide::Theirs) => {
                        resolved_conflicts += 1;
                        extend(&mut out, &hunk.theirs);
                    }
                    None => {
                        conflicts += 1;
                        write_conflict(&mut out, hunk, config, labels);
                    }
                },
            }
        }
        debug!(conflicts, resolved_conflicts, "three-way merge finished");
        MergeResult {
            merged_content: out,
            conflicts,
            resolved_conflicts,
        }
    }

    /// Quick check: can these three versions be merged without conflicts?
    pub fn can_auto_merge(base: &[u8], mine: &[u8], theirs: &[u8]) -> bool {
        if mine == base || theirs == base || mine == theirs {
            return true;
        }
        diffy::merge_bytes(base, mine, theirs).is_ok()
    }

    /// Unified diff between two texts, for display.
    pub fn unified_diff(original: &[u8], modified: &[u8]) -> String {
        let original = String::from_utf8_lossy(original);
        let modified = String::from_utf8_lossy(modified);
        diffy::create_patch(&original, &modified).to_string()
    }
}

fn diffy_merge(base: &[u8], mine: &[u8], theirs: &[u8], marker_len: usize) -> Result<Vec<u8>, Vec<u8>> {
    diffy::MergeOptions::new()
        .set_conflict_style(diffy::ConflictStyle::Diff3)
        .set_conflict_marker_length(marker_len)
        .merge_bytes(base, mine, theirs)
}

/// Smallest marker length, at least `configured`, that no run of marker
/// characters in the inputs reaches.
fn unambiguous_marker_len(configured: usize, texts: &[&[u8]]) -> usize {
    let mut longest = 0;
    for text in texts {
        let mut run = 0;
        let mut prev = 0u8;
        for &b in text.iter() {
            if MARKER_CHARS.contains(&b) {
                run = if b == prev { run + 1 } else { 1 };
            } else {
                run = 0;
            }
            prev = b;
            longest = longest.max(run);
        }
    }
    configured.max(longest + 1)
}

/// Cut diffy's diff3-style output into clean lines and conflict hunks.
///
/// diffy appends a marker directly after an unterminated line, so inside a
/// hunk a marker may close the previous line instead of starting its own.
fn parse_segments<'a>(merged: &'a [u8], markers: &Markers) -> Vec<Segment<'a>> {
    #[derive(Clone, Copy)]
    enum State {
        Outside,
        Mine,
        Base,
        Theirs,
    }

    fn take<'a>(line: &'a [u8], marker: &[u8], section: &mut Vec<&'a [u8]>) -> bool {
        if !line.ends_with(marker) {
            return false;
        }
        let head = &line[..line.len() - marker.len()];
        if !head.is_empty() {
            section.push(head);
        }
        true
    }

    let mut segments = Vec::new();
    let mut hunk = Hunk::default();
    let mut state = State::Outside;
    for line in split_lines(merged) {
        state = match state {
            State::Outside if line == markers.open.as_slice() => State::Mine,
            State::Outside => {
                segments.push(Segment::Clean(line));
                State::Outside
            }
            State::Mine if take(line, &markers.base, &mut hunk.mine) => State::Base,
            State::Mine => {
                hunk.mine.push(line);
                State::Mine
            }
            State::Base if take(line, &markers.separator, &mut hunk.base) => State::Theirs,
            State::Base => {
                hunk.base.push(line);
                State::Base
            }
            State::Theirs if take(line, &markers.close, &mut hunk.theirs) => {
                segments.push(Segment::Conflict(std::mem::take(&mut hunk)));
                State::Outside
            }
            State::Theirs => {
                hunk.theirs.push(line);
                State::Theirs
            }
        };
    }
    segments
}

fn extend(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

fn write_conflict(out: &mut Vec<u8>, hunk: &Hunk<'_>, config: &MergeConfig, labels: &MergeLabels) {
    let marker = |c: char| c.to_string().repeat(config.marker_size);
    let section = |out: &mut Vec<u8>, header: String, lines: &[&[u8]]| {
        out.extend_from_slice(header.as_bytes());
        out.push(b'\n');
        extend(out, lines);
        if lines.last().map(|l| !l.ends_with(b"\n")).unwrap_or(false) {
            out.push(b'\n');
        }
    };
    section(out, format!("{} {}", marker('<'), labels.mine), &hunk.mine);
    if config.conflict_style == ConflictStyle::Diff3 {
        section(out, format!("{} {}", marker('|'), labels.base), &hunk.base);
    }
    section(out, marker('='), &hunk.theirs);
    out.extend_from_slice(format!("{} {}\n", marker('>'), labels.theirs).as_bytes());
}

/// Split into lines, keeping each `\n`; a final unterminated line is kept.
pub fn split_lines(text: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in text.iter().enumerate() {
        if *b == b'\n' {
            lines.push(&text[start..=i]);
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}
