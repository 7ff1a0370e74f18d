//! Core data models used throughout spectra.
//!
//! These types represent the chunks handed over by a chunk source, the scope
//! that produced an index, and the tags the ranking layer reacts to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Editorial flag attached to a chunk by its source.
///
/// Explore mode multiplies canonical chunks up and deprecated chunks down;
/// retrieve mode uses the ordering `Canonical > Standard > Deprecated` in
/// its type adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Canonical,
    #[default]
    Standard,
    Deprecated,
}

impl SourceTag {
    /// Rank used by the retrieve-mode type adjustment.
    pub fn rank(self) -> i8 {
        match self {
            SourceTag::Canonical => 1,
            SourceTag::Standard => 0,
            SourceTag::Deprecated => -1,
        }
    }
}

/// Content classification attached at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Entry point of a group; coverage measures seeds against these.
    Root,
    /// Material expected to be reachable from a root.
    Seed,
    Journal,
    Reference,
    #[default]
    Note,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Root => "root",
            ContentKind::Seed => "seed",
            ContentKind::Journal => "journal",
            ContentKind::Reference => "reference",
            ContentKind::Note => "note",
        };
        f.write_str(s)
    }
}

/// One indexed unit of text, as produced by a chunk source.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Top-level group (entity) the chunk belongs to.
    pub group: String,
    /// Source within the group, typically a relative file path.
    pub subgroup: String,
    pub heading: Option<String>,
    pub text: String,
    /// Ordinal of this chunk within its `(group, subgroup)` source.
    pub position: usize,
    pub tag: SourceTag,
    pub kind: ContentKind,
}

impl Chunk {
    pub fn new(group: impl Into<String>, subgroup: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            subgroup: subgroup.into(),
            heading: None,
            text: text.into(),
            position: 0,
            tag: SourceTag::Standard,
            kind: ContentKind::Note,
        }
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn with_tag(mut self, tag: SourceTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    /// File name component of the subgroup (`a/b/notes.md` → `notes.md`).
    pub fn file_name(&self) -> &str {
        self.subgroup
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.subgroup)
    }

    /// Text fed to the normalizer: heading, source-name tokens, then body.
    pub fn searchable_text(&self) -> String {
        let stem = self
            .file_name()
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or_else(|| self.file_name());
        let mut text = String::with_capacity(self.text.len() + 64);
        if let Some(heading) = &self.heading {
            text.push_str(heading);
            text.push(' ');
        }
        text.push_str(stem);
        text.push(' ');
        text.push_str(&self.text);
        text
    }

    /// Same-source key: chunks with equal keys come from the same file.
    pub fn source_key(&self) -> (&str, &str) {
        (&self.group, &self.subgroup)
    }
}

/// Lightweight reference to a chunk, used in result records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRef {
    /// Position of the chunk in the index.
    pub index: usize,
    pub group: String,
    pub subgroup: String,
    pub heading: Option<String>,
}

impl ChunkRef {
    pub fn of(index: usize, chunk: &Chunk) -> Self {
        Self {
            index,
            group: chunk.group.clone(),
            subgroup: chunk.subgroup.clone(),
            heading: chunk.heading.clone(),
        }
    }
}

/// How the included groups of a scope were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// The configured active subset.
    Active,
    /// A caller-supplied list.
    Explicit,
    /// Every group the source knows about.
    All,
}

/// Whether the indexed corpus is the default one or an ad hoc external corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Default,
    External,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Default => "default",
            Origin::External => "external",
        })
    }
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScopeMode::Active => "active",
            ScopeMode::Explicit => "explicit",
            ScopeMode::All => "all",
        })
    }
}

/// Describes which source groups an index was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDescriptor {
    pub included_groups: Vec<String>,
    pub mode: ScopeMode,
    pub origin: Origin,
}

impl ScopeDescriptor {
    pub fn new(mut included_groups: Vec<String>, mode: ScopeMode, origin: Origin) -> Self {
        included_groups.sort();
        included_groups.dedup();
        Self {
            included_groups,
            mode,
            origin,
        }
    }

    /// An empty default-origin scope, used for the index before the first build.
    pub fn empty() -> Self {
        Self::new(Vec::new(), ScopeMode::All, Origin::Default)
    }

    pub fn includes(&self, group: &str) -> bool {
        self.included_groups.iter().any(|g| g == group)
    }
}

/// Scoring profile requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Editorial boosting for a curated default corpus.
    Explore,
    /// Neighbor- and type-aware margin for ad hoc external corpora.
    Retrieve,
    /// Pick from the current index's origin.
    #[default]
    Auto,
}

impl SearchMode {
    /// Resolve `Auto` against the origin of the index being queried.
    pub fn resolve(self, origin: Origin) -> SearchMode {
        match self {
            SearchMode::Auto => match origin {
                Origin::External => SearchMode::Retrieve,
                Origin::Default => SearchMode::Explore,
            },
            other => other,
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explore" => Ok(SearchMode::Explore),
            "retrieve" => Ok(SearchMode::Retrieve),
            "auto" => Ok(SearchMode::Auto),
            other => Err(format!(
                "unknown search mode '{}'. Use explore, retrieve, or auto.",
                other
            )),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Explore => "explore",
            SearchMode::Retrieve => "retrieve",
            SearchMode::Auto => "auto",
        })
    }
}

/// Confidence label attached to each search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MED")]
    Med,
    #[serde(rename = "LOW")]
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "HIGH",
            Confidence::Med => "MED",
            Confidence::Low => "LOW",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_searchable_text_includes_heading_and_file_stem() {
        let chunk = Chunk::new("infra", "runbooks/deploy_guide.md", "Roll back first.")
            .with_heading("Rollback");
        assert_eq!(chunk.searchable_text(), "Rollback deploy_guide Roll back first.");
    }

    #[test]
    fn test_file_name_of_nested_subgroup() {
        let chunk = Chunk::new("g", "a/b/notes.md", "x");
        assert_eq!(chunk.file_name(), "notes.md");
    }

    #[test]
    fn test_auto_mode_resolution() {
        assert_eq!(SearchMode::Auto.resolve(Origin::External), SearchMode::Retrieve);
        assert_eq!(SearchMode::Auto.resolve(Origin::Default), SearchMode::Explore);
        assert_eq!(SearchMode::Explore.resolve(Origin::External), SearchMode::Explore);
    }

    #[test]
    fn test_search_mode_parse() {
        assert_eq!("retrieve".parse::<SearchMode>(), Ok(SearchMode::Retrieve));
        assert!("hybrid".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_scope_groups_sorted_and_deduped() {
        let scope = ScopeDescriptor::new(
            vec!["b".into(), "a".into(), "b".into()],
            ScopeMode::Explicit,
            Origin::Default,
        );
        assert_eq!(scope.included_groups, vec!["a", "b"]);
        assert!(scope.includes("a"));
        assert!(!scope.includes("c"));
    }

    #[test]
    fn test_confidence_serializes_uppercase() {
        let json = serde_json::to_string(&Confidence::Med).unwrap();
        assert_eq!(json, "\"MED\"");
    }
}
