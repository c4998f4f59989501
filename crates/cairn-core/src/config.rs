//! JSON configuration: backend specs, plan documents, and the
//! constructor registry that turns them into live backends.
//!
//! A backend spec is `{"type": NAME, "config": {...}}`. The registry
//! maps names to constructors in two tables, one for plain
//! destinations and one for partial-read capable ones; wrappers that
//! need range reads below them (`packed`, `split`) resolve their inner
//! destinations through the partial table, so an impossible stacking
//! fails at load time instead of mid-run.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::LazyLock;

use serde::Deserialize;
use serde_json::Value;

use crate::destination::{
    Destination, FilesystemDestination, PackedDestination, PartialReadDestination,
    SplitDestination, SpoolKind, DEFAULT_PACK_SIZE,
};
use crate::error::{CairnError, Result};
use crate::filter::{self, FilePredicate};
use crate::source::{FilesystemSource, GroupedSource, Source};

/// Packs kept in the local read cache when caching is configured
/// without an explicit count.
const DEFAULT_CACHED_PACKS: usize = 5;

/// One backend in a config document: a registered type name plus that
/// type's own settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

/// A whole run in one document: where files come from, where objects
/// go, and the engine knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    pub source: BackendSpec,
    pub destination: BackendSpec,
    /// Extra path fragments to exclude from backup, on top of the
    /// built-in ignore list.
    #[serde(default)]
    pub skip_files_containing: Vec<String>,
    /// Extra path fragments whose files are stored uncompressed.
    #[serde(default)]
    pub skip_compression_containing: Vec<String>,
    #[serde(default)]
    pub chunk_size: Option<u64>,
    #[serde(default)]
    pub progress_every_files: Option<u64>,
    #[serde(default)]
    pub progress_every_bytes: Option<u64>,
}

impl PlanConfig {
    pub fn backup_filter(&self) -> FilePredicate {
        if self.skip_files_containing.is_empty() {
            filter::default_backup_filter()
        } else {
            filter::all(vec![
                filter::default_backup_filter(),
                filter::ignore_containing(self.skip_files_containing.clone()),
            ])
        }
    }

    pub fn compression_filter(&self) -> FilePredicate {
        if self.skip_compression_containing.is_empty() {
            filter::default_compression_filter()
        } else {
            filter::all(vec![
                filter::default_compression_filter(),
                filter::ignore_containing(self.skip_compression_containing.clone()),
            ])
        }
    }
}

/// Reads a spec argument: inline JSON when it starts with `{`,
/// otherwise a path to a JSON file.
pub fn load_spec(text: &str) -> Result<BackendSpec> {
    parse_document(&read_inline_or_file(text)?)
}

/// Reads a plan argument, same inline-or-file rule as [`load_spec`].
pub fn load_plan(text: &str) -> Result<PlanConfig> {
    parse_document(&read_inline_or_file(text)?)
}

fn read_inline_or_file(text: &str) -> Result<String> {
    if text.trim_start().starts_with('{') {
        Ok(text.to_string())
    } else {
        std::fs::read_to_string(text).map_err(|e| CairnError::with_path(text, e))
    }
}

fn parse_document<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| CairnError::Config(e.to_string()))
}

fn parse_config<T: serde::de::DeserializeOwned>(config: &Value) -> Result<T> {
    serde_json::from_value(config.clone()).map_err(|e| CairnError::Config(e.to_string()))
}

// Per-backend settings. `deny_unknown_fields` turns typos into load
// errors instead of silently ignored knobs.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilesystemConfig {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupedConfig {
    sources: Vec<GroupMember>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupMember {
    name: String,
    source: BackendSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackedConfig {
    destination: BackendSpec,
    #[serde(default)]
    pack_size: Option<u64>,
    #[serde(default)]
    max_cached_packs: Option<usize>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SplitConfig {
    primary: BackendSpec,
    #[serde(default)]
    secondaries: Vec<BackendSpec>,
    #[serde(default)]
    spool: SpoolKind,
}

type SourceCtor = fn(&Registry, &Value) -> Result<Box<dyn Source>>;
type DestinationCtor = fn(&Registry, &Value) -> Result<Box<dyn Destination>>;
type PartialCtor = fn(&Registry, &Value) -> Result<Box<dyn PartialReadDestination>>;

/// Backend name to constructor tables, built once at startup.
pub struct Registry {
    sources: Vec<(&'static str, SourceCtor)>,
    destinations: Vec<(&'static str, DestinationCtor)>,
    partials: Vec<(&'static str, PartialCtor)>,
}

impl Registry {
    /// All built-in backends.
    pub fn standard() -> Self {
        Self {
            sources: vec![
                ("filesystem", build_filesystem_source as SourceCtor),
                ("grouped", build_grouped_source),
            ],
            destinations: vec![
                (
                    "filesystem",
                    build_filesystem_destination as DestinationCtor,
                ),
                ("packed", build_packed_destination),
                ("split", build_split_destination),
            ],
            partials: vec![
                (
                    "filesystem",
                    build_filesystem_partial as PartialCtor,
                ),
                ("split", build_split_partial),
            ],
        }
    }

    pub fn global() -> &'static Registry {
        static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::standard);
        &REGISTRY
    }

    pub fn source(&self, spec: &BackendSpec) -> Result<Box<dyn Source>> {
        match self.sources.iter().find(|(name, _)| *name == spec.kind) {
            Some((_, build)) => build(self, &spec.config),
            None => Err(CairnError::UnknownBackend(spec.kind.clone())),
        }
    }

    pub fn destination(&self, spec: &BackendSpec) -> Result<Box<dyn Destination>> {
        match self.destinations.iter().find(|(name, _)| *name == spec.kind) {
            Some((_, build)) => build(self, &spec.config),
            None => Err(CairnError::UnknownBackend(spec.kind.clone())),
        }
    }

    /// Like [`Registry::destination`], for positions that need range
    /// reads underneath. A known backend that cannot serve them is
    /// rejected here rather than at first use.
    pub fn partial_destination(&self, spec: &BackendSpec) -> Result<Box<dyn PartialReadDestination>> {
        match self.partials.iter().find(|(name, _)| *name == spec.kind) {
            Some((_, build)) => build(self, &spec.config),
            None if self
                .destinations
                .iter()
                .any(|(name, _)| *name == spec.kind) =>
            {
                Err(CairnError::NotPartialRead(spec.kind.clone()))
            }
            None => Err(CairnError::UnknownBackend(spec.kind.clone())),
        }
    }
}

fn build_filesystem_source(_: &Registry, config: &Value) -> Result<Box<dyn Source>> {
    let cfg: FilesystemConfig = parse_config(config)?;
    Ok(Box::new(FilesystemSource::new(cfg.base_path)))
}

fn build_grouped_source(registry: &Registry, config: &Value) -> Result<Box<dyn Source>> {
    let cfg: GroupedConfig = parse_config(config)?;
    let mut group = GroupedSource::new();
    for member in cfg.sources {
        group.add(member.name, registry.source(&member.source)?);
    }
    Ok(Box::new(group))
}

fn filesystem_destination(config: &Value) -> Result<FilesystemDestination> {
    let cfg: FilesystemConfig = parse_config(config)?;
    Ok(FilesystemDestination::new(cfg.base_path))
}

fn build_filesystem_destination(_: &Registry, config: &Value) -> Result<Box<dyn Destination>> {
    Ok(Box::new(filesystem_destination(config)?))
}

fn build_filesystem_partial(
    _: &Registry,
    config: &Value,
) -> Result<Box<dyn PartialReadDestination>> {
    Ok(Box::new(filesystem_destination(config)?))
}

fn build_packed_destination(registry: &Registry, config: &Value) -> Result<Box<dyn Destination>> {
    let cfg: PackedConfig = parse_config(config)?;
    let inner = registry.partial_destination(&cfg.destination)?;
    let mut packed = PackedDestination::new(inner, cfg.pack_size.unwrap_or(DEFAULT_PACK_SIZE));
    if cfg.max_cached_packs.is_some() || cfg.cache_dir.is_some() {
        let capacity = cfg.max_cached_packs.unwrap_or(DEFAULT_CACHED_PACKS);
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| CairnError::Config("max_cached_packs must be at least 1".into()))?;
        packed = packed.with_pack_cache(capacity, cfg.cache_dir);
    }
    Ok(Box::new(packed))
}

fn split_destination(registry: &Registry, config: &Value) -> Result<SplitDestination> {
    let cfg: SplitConfig = parse_config(config)?;
    let primary = registry.partial_destination(&cfg.primary)?;
    let mut secondaries = Vec::with_capacity(cfg.secondaries.len());
    for spec in &cfg.secondaries {
        secondaries.push(registry.destination(spec)?);
    }
    Ok(SplitDestination::new(primary, secondaries, cfg.spool))
}

fn build_split_destination(registry: &Registry, config: &Value) -> Result<Box<dyn Destination>> {
    Ok(Box::new(split_destination(registry, config)?))
}

fn build_split_partial(
    registry: &Registry,
    config: &Value,
) -> Result<Box<dyn PartialReadDestination>> {
    Ok(Box::new(split_destination(registry, config)?))
}
