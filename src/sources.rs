//! Chunk sources: where the engine's chunks come from.
//!
//! The engine never reads files itself. It asks a [`ChunkSource`] to resolve
//! the default scope, to list the chunks of a scope, and to fingerprint a
//! scope cheaply so the watcher can tell when a rebuild is due.
//!
//! [`FilesystemSource`] is the shipped implementation: a directory of
//! markdown/text files where every top-level directory is a group. Editorial
//! tags and content kinds are attached here, from configured glob sets, so
//! the ranking code never looks at file names.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_markdown;
use crate::config::CorpusConfig;
use crate::models::{Chunk, ContentKind, Origin, ScopeDescriptor, ScopeMode, SourceTag};

/// Supplies chunks and scope information to the engine.
pub trait ChunkSource: Send + Sync {
    /// Whether this source is the configured corpus or an ad hoc one.
    fn origin(&self) -> Origin;

    /// Every group currently present in the source, sorted.
    fn groups(&self) -> Result<Vec<String>>;

    /// The scope this source is indexed with when nobody asks otherwise.
    fn resolve_scope(&self) -> Result<ScopeDescriptor>;

    /// All chunks of the groups in `scope`, in a stable order.
    fn list_chunks(&self, scope: &ScopeDescriptor) -> Result<Vec<Chunk>>;

    /// A cheap fingerprint of everything `list_chunks(scope)` would read.
    fn signature(&self, scope: &ScopeDescriptor) -> Result<String>;
}

/// Glob sets that attach [`SourceTag`]s and [`ContentKind`]s by path.
struct Tagging {
    canonical: GlobSet,
    deprecated: GlobSet,
    root: GlobSet,
    seed: GlobSet,
    journal: GlobSet,
}

impl Tagging {
    fn from_config(corpus: &CorpusConfig) -> Result<Self> {
        Ok(Self {
            canonical: build_globset(&corpus.canonical_globs)?,
            deprecated: build_globset(&corpus.deprecated_globs)?,
            root: build_globset(&corpus.root_globs)?,
            seed: build_globset(&corpus.seed_globs)?,
            journal: build_globset(&corpus.journal_globs)?,
        })
    }

    fn tag(&self, rel: &str) -> SourceTag {
        if self.canonical.is_match(rel) {
            SourceTag::Canonical
        } else if self.deprecated.is_match(rel) {
            SourceTag::Deprecated
        } else {
            SourceTag::Standard
        }
    }

    fn kind(&self, rel: &str) -> ContentKind {
        if self.root.is_match(rel) {
            ContentKind::Root
        } else if self.seed.is_match(rel) {
            ContentKind::Seed
        } else if self.journal.is_match(rel) {
            ContentKind::Journal
        } else if is_reference_name(rel) {
            ContentKind::Reference
        } else {
            ContentKind::Note
        }
    }
}

/// True if the file stem contains a `ref` or `reference` word.
fn is_reference_name(rel: &str) -> bool {
    let stem = Path::new(rel)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    stem.split(|c: char| !c.is_alphanumeric())
        .any(|word| word == "ref" || word == "reference")
}

/// A file the source would read, with its group placement.
#[derive(Debug)]
struct SourceFile {
    path: PathBuf,
    /// Path relative to the corpus root, `/`-separated.
    rel: String,
    group: String,
    subgroup: String,
}

/// A directory (or single file) of markdown and text documents.
pub struct FilesystemSource {
    root: PathBuf,
    /// Set when an external corpus is one file rather than a directory.
    single_file: Option<PathBuf>,
    /// Group of files that sit directly under the root.
    root_group: String,
    origin: Origin,
    include: GlobSet,
    exclude: GlobSet,
    tagging: Tagging,
    active_groups: Vec<String>,
    follow_symlinks: bool,
    max_tokens: usize,
}

impl FilesystemSource {
    /// The configured default corpus.
    pub fn new(corpus: &CorpusConfig, max_tokens: usize) -> Result<Self> {
        let root_group = dir_name(&corpus.root).unwrap_or_else(|| "root".to_string());
        Self::build(
            corpus.root.clone(),
            None,
            root_group,
            Origin::Default,
            corpus,
            max_tokens,
        )
    }

    /// An ad hoc corpus at `path`, indexed with the default corpus's globs.
    ///
    /// `path` may be a directory or a single file. Files directly under it
    /// are grouped under `display_name`, defaulting to the path's own name.
    pub fn external(
        path: &Path,
        display_name: Option<&str>,
        corpus: &CorpusConfig,
        max_tokens: usize,
    ) -> Result<Self> {
        if !path.exists() {
            bail!("External corpus path does not exist: {}", path.display());
        }
        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "external".to_string());

        let (root, single_file) = if path.is_file() {
            // A bare file name has an empty parent.
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (parent, Some(path.to_path_buf()))
        } else {
            (path.to_path_buf(), None)
        };

        let mut corpus = corpus.clone();
        corpus.active_groups.clear();
        Self::build(root, single_file, name, Origin::External, &corpus, max_tokens)
    }

    fn build(
        root: PathBuf,
        single_file: Option<PathBuf>,
        root_group: String,
        origin: Origin,
        corpus: &CorpusConfig,
        max_tokens: usize,
    ) -> Result<Self> {
        let include = build_globset(&corpus.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(corpus.exclude_globs.clone());
        let exclude = build_globset(&default_excludes)?;

        Ok(Self {
            root,
            single_file,
            root_group,
            origin,
            include,
            exclude,
            tagging: Tagging::from_config(corpus)?,
            active_groups: corpus.active_groups.clone(),
            follow_symlinks: corpus.follow_symlinks,
            max_tokens,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the corpus and return every included file, sorted by path.
    fn scan(&self) -> Result<Vec<SourceFile>> {
        if !self.root.exists() {
            bail!("Corpus root does not exist: {}", self.root.display());
        }

        let start = self.single_file.as_deref().unwrap_or(&self.root);
        let mut files = Vec::new();

        let walker = WalkDir::new(start).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let parts: Vec<String> = relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                continue;
            }
            let rel = parts.join("/");

            if self.exclude.is_match(&rel) {
                continue;
            }
            // An explicitly named file is read whatever its extension.
            if self.single_file.is_none() && !self.include.is_match(&rel) {
                continue;
            }

            let (group, subgroup) = if parts.len() > 1 {
                (parts[0].clone(), parts[1..].join("/"))
            } else {
                (self.root_group.clone(), rel.clone())
            };

            files.push(SourceFile {
                path: path.to_path_buf(),
                rel,
                group,
                subgroup,
            });
        }

        files.sort_by(|a, b| a.rel.cmp(&b.rel));
        Ok(files)
    }

    fn scan_scope(&self, scope: &ScopeDescriptor) -> Result<Vec<SourceFile>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|f| scope.includes(&f.group))
            .collect())
    }
}

impl ChunkSource for FilesystemSource {
    fn origin(&self) -> Origin {
        self.origin
    }

    fn groups(&self) -> Result<Vec<String>> {
        let mut groups: Vec<String> = self.scan()?.into_iter().map(|f| f.group).collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }

    fn resolve_scope(&self) -> Result<ScopeDescriptor> {
        let scope = match self.origin {
            Origin::External => ScopeDescriptor::new(self.groups()?, ScopeMode::Explicit, Origin::External),
            Origin::Default if !self.active_groups.is_empty() => ScopeDescriptor::new(
                self.active_groups.clone(),
                ScopeMode::Active,
                Origin::Default,
            ),
            Origin::Default => ScopeDescriptor::new(self.groups()?, ScopeMode::All, Origin::Default),
        };
        Ok(scope)
    }

    fn list_chunks(&self, scope: &ScopeDescriptor) -> Result<Vec<Chunk>> {
        let files = self.scan_scope(scope)?;
        let mut chunks = Vec::new();

        for file in &files {
            let body = match std::fs::read_to_string(&file.path) {
                Ok(body) => body,
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            let tag = self.tagging.tag(&file.rel);
            let kind = self.tagging.kind(&file.rel);

            for (position, para) in chunk_markdown(&body, self.max_tokens).into_iter().enumerate() {
                let mut chunk = Chunk::new(&file.group, &file.subgroup, para.text)
                    .with_position(position)
                    .with_tag(tag)
                    .with_kind(kind);
                chunk.heading = para.heading;
                chunks.push(chunk);
            }
        }

        debug!(
            files = files.len(),
            chunks = chunks.len(),
            root = %self.root.display(),
            "Listed chunks"
        );
        Ok(chunks)
    }

    fn signature(&self, scope: &ScopeDescriptor) -> Result<String> {
        let mut hasher = Sha256::new();
        for file in self.scan_scope(scope)? {
            let metadata = std::fs::metadata(&file.path)
                .with_context(|| format!("Failed to stat {}", file.path.display()))?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);

            hasher.update(file.rel.as_bytes());
            hasher.update([0u8]);
            hasher.update(mtime.to_le_bytes());
            hasher.update(metadata.len().to_le_bytes());
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn dir_name(path: &Path) -> Option<String> {
    let name = |p: &Path| p.file_name().map(|s| s.to_string_lossy().to_string());
    name(path).or_else(|| path.canonicalize().ok().and_then(|p| name(&p)))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // `*` stays inside one path component; `**` crosses directories.
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn corpus() -> (TempDir, CorpusConfig) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("notes");
        write(&root, "kafka/README.md", "# Kafka\n\nBrokers and partitions.");
        write(&root, "kafka/seeds/replication.md", "Replicas follow the leader.");
        write(&root, "kafka/canon/guide.md", "The canonical guide.\n\nSecond paragraph.");
        write(&root, "garden/deprecated/tomatoes.md", "Old tomato advice.");
        write(&root, "garden/api-ref.md", "Reference material for the garden.");
        write(&root, "top.md", "A file at the top level.");
        write(&root, "kafka/image.png", "not text");
        let config = CorpusConfig::with_root(&root);
        (tmp, config)
    }

    #[test]
    fn test_groups_are_top_level_directories() {
        let (_tmp, config) = corpus();
        let source = FilesystemSource::new(&config, 400).unwrap();
        assert_eq!(source.groups().unwrap(), vec!["garden", "kafka", "notes"]);
    }

    #[test]
    fn test_default_scope_is_all_groups() {
        let (_tmp, config) = corpus();
        let source = FilesystemSource::new(&config, 400).unwrap();
        let scope = source.resolve_scope().unwrap();
        assert_eq!(scope.mode, ScopeMode::All);
        assert_eq!(scope.origin, Origin::Default);
        assert_eq!(scope.included_groups.len(), 3);
    }

    #[test]
    fn test_active_groups_restrict_default_scope() {
        let (_tmp, mut config) = corpus();
        config.active_groups = vec!["kafka".to_string()];
        let source = FilesystemSource::new(&config, 400).unwrap();
        let scope = source.resolve_scope().unwrap();
        assert_eq!(scope.mode, ScopeMode::Active);

        let chunks = source.list_chunks(&scope).unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.group == "kafka"));
    }

    #[test]
    fn test_tags_kinds_and_positions() {
        let (_tmp, config) = corpus();
        let source = FilesystemSource::new(&config, 400).unwrap();
        let scope = source.resolve_scope().unwrap();
        let chunks = source.list_chunks(&scope).unwrap();

        let find = |subgroup: &str| {
            chunks
                .iter()
                .filter(|c| c.subgroup == subgroup)
                .collect::<Vec<_>>()
        };

        let readme = find("README.md");
        assert_eq!(readme[0].kind, ContentKind::Root);
        assert_eq!(readme[0].heading.as_deref(), Some("Kafka"));

        assert_eq!(find("seeds/replication.md")[0].kind, ContentKind::Seed);

        let guide = find("canon/guide.md");
        assert_eq!(guide.len(), 2);
        assert_eq!(guide[0].tag, SourceTag::Canonical);
        assert_eq!(guide[0].position, 0);
        assert_eq!(guide[1].position, 1);

        assert_eq!(find("deprecated/tomatoes.md")[0].tag, SourceTag::Deprecated);
        assert_eq!(find("api-ref.md")[0].kind, ContentKind::Reference);

        let top = find("top.md");
        assert_eq!(top[0].group, "notes");
        assert_eq!(top[0].kind, ContentKind::Note);

        assert!(find("image.png").is_empty());
    }

    #[test]
    fn test_exclude_globs_apply() {
        let (_tmp, mut config) = corpus();
        config.exclude_globs = vec!["garden/**".to_string()];
        let source = FilesystemSource::new(&config, 400).unwrap();
        assert_eq!(source.groups().unwrap(), vec!["kafka", "notes"]);
    }

    #[test]
    fn test_signature_changes_when_file_changes() {
        let (_tmp, config) = corpus();
        let source = FilesystemSource::new(&config, 400).unwrap();
        let scope = source.resolve_scope().unwrap();

        let before = source.signature(&scope).unwrap();
        assert_eq!(before, source.signature(&scope).unwrap());

        write(&config.root, "kafka/README.md", "# Kafka\n\nBrokers, partitions and more.");
        assert_ne!(before, source.signature(&scope).unwrap());
    }

    #[test]
    fn test_signature_ignores_out_of_scope_groups() {
        let (_tmp, config) = corpus();
        let source = FilesystemSource::new(&config, 400).unwrap();
        let scope = ScopeDescriptor::new(vec!["kafka".to_string()], ScopeMode::Explicit, Origin::Default);

        let before = source.signature(&scope).unwrap();
        write(&config.root, "garden/new.md", "A brand new garden note.");
        assert_eq!(before, source.signature(&scope).unwrap());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let config = CorpusConfig::with_root("/definitely/not/a/corpus");
        let source = FilesystemSource::new(&config, 400).unwrap();
        assert!(source.resolve_scope().is_err());
        assert!(source.signature(&ScopeDescriptor::empty()).is_err());
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let mut config = CorpusConfig::with_root(".");
        config.canonical_globs = vec!["[unclosed".to_string()];
        assert!(FilesystemSource::new(&config, 400).is_err());
    }

    #[test]
    fn test_external_directory_is_explicit_scope() {
        let (_tmp, config) = corpus();
        let ext = TempDir::new().unwrap();
        write(ext.path(), "paper.md", "An external paper about lighthouses.");
        write(ext.path(), "appendix/a.md", "Appendix on fog signals.");

        let source = FilesystemSource::external(ext.path(), Some("papers"), &config, 400).unwrap();
        let scope = source.resolve_scope().unwrap();
        assert_eq!(scope.origin, Origin::External);
        assert_eq!(scope.mode, ScopeMode::Explicit);
        assert_eq!(scope.included_groups, vec!["appendix", "papers"]);
    }

    #[test]
    fn test_external_single_file() {
        let (_tmp, config) = corpus();
        let ext = TempDir::new().unwrap();
        write(ext.path(), "lighthouse.rst", "Keepers trimmed the wicks nightly.");
        write(ext.path(), "other.md", "Not part of the load.");

        let file = ext.path().join("lighthouse.rst");
        let source = FilesystemSource::external(&file, None, &config, 400).unwrap();
        let scope = source.resolve_scope().unwrap();
        assert_eq!(scope.included_groups, vec!["lighthouse"]);

        let chunks = source.list_chunks(&scope).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].subgroup, "lighthouse.rst");
    }

    #[test]
    fn test_external_bare_file_name_resolves_to_working_dir() {
        // Tests run from the package root.
        let config = CorpusConfig::with_root(".");
        let source = FilesystemSource::external(Path::new("Cargo.toml"), None, &config, 400).unwrap();
        assert_eq!(source.root(), Path::new("."));

        let scope = source.resolve_scope().unwrap();
        assert_eq!(scope.included_groups, vec!["Cargo"]);
        let chunks = source.list_chunks(&scope).unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.subgroup == "Cargo.toml"));
    }

    #[test]
    fn test_external_missing_path_rejected() {
        let config = CorpusConfig::with_root(".");
        let err = FilesystemSource::external(Path::new("/no/such/corpus"), None, &config, 400)
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not exist"));
    }
}
