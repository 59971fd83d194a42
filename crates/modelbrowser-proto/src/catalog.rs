//! Item-model catalog built from a resource pack on disk.
//!
//! Only `assets/<namespace>/items/*.json` is ever scanned. The sibling
//! `models/` tree holds model *references* with the same file names and is
//! never a source of entries.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to list {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("deleting catalog entries is not supported yet: {0}")]
    DeleteUnsupported(String),
}

/// Derived tag describing what kind of item a definition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Weapons,
    Shields,
    Tools,
    Armor,
    Selectable,
    Items,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Weapons,
        Category::Shields,
        Category::Tools,
        Category::Armor,
        Category::Selectable,
        Category::Items,
        Category::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Weapons => "weapons",
            Category::Shields => "shields",
            Category::Tools => "tools",
            Category::Armor => "armor",
            Category::Selectable => "selectable",
            Category::Items => "items",
            Category::Unknown => "unknown",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discoverable item-model definition. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub category: Category,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    /// Source file the entry was read from.
    pub path: PathBuf,
}

impl CatalogEntry {
    pub fn last_modified_millis(&self) -> i64 {
        self.last_modified.timestamp_millis()
    }
}

/// A file that was listed but could not be turned into an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedFile>,
    /// Example content was written because the pack root was missing.
    pub bootstrapped: bool,
}

// ── Scanner ───────────────────────────────────────────────────────────────────

pub fn items_dir(root: &Path, namespace: &str) -> PathBuf {
    root.join("assets").join(namespace).join("items")
}

/// List the entry identifiers in `assets/<namespace>/items/`, non-recursively.
///
/// A missing directory yields an empty list. Order is whatever the
/// filesystem returns.
pub fn scan_items(root: &Path, namespace: &str) -> Result<Vec<String>, CatalogError> {
    let dir = items_dir(root, namespace);
    if !dir.is_dir() {
        debug!("Items directory not found: {:?}", dir);
        return Ok(Vec::new());
    }

    let read_dir = std::fs::read_dir(&dir).map_err(|source| CatalogError::Scan {
        path: dir.clone(),
        source,
    })?;

    let mut ids = Vec::new();
    for dirent in read_dir {
        let dirent = dirent.map_err(|source| CatalogError::Scan {
            path: dir.clone(),
            source,
        })?;
        let path = dirent.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(format!("{}:{}", namespace, stem));
        }
    }
    Ok(ids)
}

// ── Categorisation ────────────────────────────────────────────────────────────

/// Derive a category from a parsed item definition. First match wins.
pub fn classify(json: &Value) -> Category {
    let Some(model) = json.get("model") else {
        return Category::Unknown;
    };

    if let Some(kind) = model.get("type").and_then(Value::as_str) {
        if kind.contains("condition") {
            return Category::Shields;
        }
        if kind.contains("select") {
            return Category::Selectable;
        }
    }

    let text = json.to_string().to_lowercase();
    if text.contains("sword") || text.contains("axe") {
        Category::Weapons
    } else if text.contains("shield") {
        Category::Shields
    } else if text.contains("pickaxe") {
        Category::Tools
    } else if text.contains("hat") || text.contains("helmet") {
        Category::Armor
    } else {
        Category::Items
    }
}

// ── ModelCatalog ──────────────────────────────────────────────────────────────

/// In-memory entry table. Read-only between reloads.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    root: PathBuf,
    namespace: String,
    bootstrap_examples: bool,
    entries: BTreeMap<String, CatalogEntry>,
}

impl ModelCatalog {
    /// An empty catalog over `config`'s resource pack. Call [`reload`](Self::reload) to fill it.
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            root: config.resource_pack.clone(),
            namespace: config.namespace.clone(),
            bootstrap_examples: config.bootstrap_examples,
            entries: BTreeMap::new(),
        }
    }

    /// Build and fill a catalog in one step.
    pub fn load(config: &CatalogConfig) -> Result<(Self, ReloadReport), CatalogError> {
        let mut catalog = Self::new(config);
        let report = catalog.reload()?;
        Ok((catalog, report))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn items_dir(&self) -> PathBuf {
        items_dir(&self.root, &self.namespace)
    }

    /// Rescan the items directory and rebuild every entry.
    ///
    /// The new table is assembled separately and swapped in at the end. A
    /// file that cannot be read or parsed is skipped and reported. A failure
    /// to list the directory leaves the catalog empty.
    pub fn reload(&mut self) -> Result<ReloadReport, CatalogError> {
        self.entries.clear();
        let mut report = ReloadReport::default();

        if !self.root.exists() {
            warn!("Resource pack directory not found: {:?}", self.root);
            if self.bootstrap_examples {
                match bootstrap_examples(&self.root, &self.namespace) {
                    Ok(()) => {
                        info!("Created example resource pack at {:?}", self.root);
                        report.bootstrapped = true;
                    }
                    Err(e) => warn!("Failed to create example structure: {}", e),
                }
            }
            return Ok(report);
        }

        let ids = scan_items(&self.root, &self.namespace)?;
        let dir = self.items_dir();
        let prefix = format!("{}:", self.namespace);

        let mut fresh = BTreeMap::new();
        for id in ids {
            let name = id.strip_prefix(&prefix).unwrap_or(&id);
            let path = dir.join(format!("{}.json", name));
            match read_entry(&id, &path) {
                Ok(entry) => {
                    debug!("Found item model: {} ({})", entry.id, entry.category);
                    fresh.insert(id, entry);
                }
                Err(reason) => {
                    warn!("Skipping item model {:?}: {}", path, reason);
                    report.skipped.push(SkippedFile { id, reason });
                }
            }
        }

        report.loaded = fresh.len();
        self.entries = fresh;
        info!("Loaded {} models from resource pack", report.loaded);
        Ok(report)
    }

    /// Every entry, ordered by identifier.
    pub fn list(&self) -> Vec<&CatalogEntry> {
        self.entries.values().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive substring match on the identifier. An empty query
    /// matches everything.
    pub fn search(&self, query: &str) -> Vec<&CatalogEntry> {
        let needle = query.to_lowercase();
        self.entries
            .values()
            .filter(|e| e.id.to_lowercase().contains(&needle))
            .collect()
    }

    /// Group every entry under its category. Empty categories are omitted.
    pub fn by_category(&self) -> BTreeMap<Category, Vec<&CatalogEntry>> {
        let mut groups: BTreeMap<Category, Vec<&CatalogEntry>> = BTreeMap::new();
        for entry in self.entries.values() {
            groups.entry(entry.category).or_default().push(entry);
        }
        groups
    }

    pub fn in_category(&self, category: Category) -> Vec<&CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.category == category)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Position of `id` in identifier order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.keys().position(|k| k == id)
    }

    /// Raw JSON source of an entry, read fresh from disk.
    pub fn read_source(&self, id: &str) -> io::Result<Option<String>> {
        match self.entries.get(id) {
            Some(entry) => std::fs::read_to_string(&entry.path).map(Some),
            None => Ok(None),
        }
    }

    /// Removing entries is not available; this always fails.
    pub fn delete(&self, id: &str) -> Result<(), CatalogError> {
        warn!("Model deletion not implemented yet for: {}", id);
        Err(CatalogError::DeleteUnsupported(id.to_string()))
    }
}

fn read_entry(id: &str, path: &Path) -> Result<CatalogEntry, String> {
    let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
    let modified = metadata.modified().map_err(|e| e.to_string())?;
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let json: Value = serde_json::from_str(&content).map_err(|e| format!("invalid JSON: {}", e))?;
    if !json.is_object() {
        return Err("top-level value is not an object".to_string());
    }

    Ok(CatalogEntry {
        id: id.to_string(),
        category: classify(&json),
        size_bytes: metadata.len(),
        last_modified: DateTime::<Utc>::from(modified),
        path: path.to_path_buf(),
    })
}

// ── Example bootstrap ─────────────────────────────────────────────────────────

fn bootstrap_examples(root: &Path, namespace: &str) -> io::Result<()> {
    let dir = items_dir(root, namespace);
    std::fs::create_dir_all(&dir)?;

    let plain = |name: &str| {
        serde_json::json!({
            "model": {
                "type": format!("{}:model", namespace),
                "model": format!("{}:item/{}", namespace, name),
            }
        })
    };
    let shield = serde_json::json!({
        "model": {
            "type": format!("{}:condition", namespace),
            "property": format!("{}:using_item", namespace),
            "on_true": {
                "type": format!("{}:model", namespace),
                "model": format!("{}:item/example_shield_blocking", namespace),
            },
            "on_false": {
                "type": format!("{}:model", namespace),
                "model": format!("{}:item/example_shield", namespace),
            }
        }
    });

    let examples = [
        ("example_sword", plain("example_sword")),
        ("example_shield", shield),
        ("example_tool", plain("example_tool")),
    ];
    for (name, json) in examples {
        let content = serde_json::to_string_pretty(&json)?;
        std::fs::write(dir.join(format!("{}.json", name)), content)?;
    }

    let mcmeta = serde_json::json!({
        "pack": {
            "pack_format": 22,
            "description": "Example Resource Pack for Model Browser",
        }
    });
    std::fs::write(root.join("pack.mcmeta"), serde_json::to_string_pretty(&mcmeta)?)?;
    Ok(())
}
