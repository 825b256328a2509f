//! Script loader for scanning the game's Lua files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::Result;

/// Metadata parsed from the comment header of a Lua file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMetadata {
    /// Display name (@name).
    pub name: Option<String>,
    /// Description (@description).
    pub description: Option<String>,
    /// Whether the file is loaded (@enabled).
    pub enabled: Option<bool>,
}

/// A Lua file found under the scripts directory.
#[derive(Debug, Clone)]
pub struct ScriptFile {
    /// Path relative to the scripts directory.
    pub rel_path: String,
    pub name: String,
    pub metadata: ScriptMetadata,
    pub source: String,
}

impl ScriptFile {
    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled.unwrap_or(true)
    }
}

/// Finds the game's Lua files, in load order.
pub struct ScriptLoader {
    root: PathBuf,
}

impl ScriptLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Scan the scripts directory for enabled `.lua` files.
    ///
    /// Files come back sorted by relative path so load order is stable. A
    /// missing directory yields no files.
    pub fn scan(&self) -> Result<Vec<ScriptFile>> {
        let mut paths = Vec::new();
        if !self.root.is_dir() {
            warn!("scripts directory {} does not exist", self.root.display());
            return Ok(Vec::new());
        }
        walk(&self.root, &mut paths)?;
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let file = self.read_file(&path)?;
            if file.is_enabled() {
                files.push(file);
            } else {
                debug!("skipping disabled script {}", file.rel_path);
            }
        }
        Ok(files)
    }

    fn read_file(&self, path: &Path) -> Result<ScriptFile> {
        let source = fs::read_to_string(path)?;
        let metadata = Self::parse_metadata(&source);
        let rel_path = match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => path.display().to_string(),
        };
        let name = match &metadata.name {
            Some(name) => name.clone(),
            None => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| rel_path.clone()),
        };

        Ok(ScriptFile {
            rel_path,
            name,
            metadata,
            source,
        })
    }

    /// Parse the `-- @key value` header of a Lua file.
    ///
    /// The header ends at the first line that is neither blank nor a comment.
    /// Recognized keys are `name`, `description` and `enabled`; others are
    /// ignored, as is an `enabled` value that is not `true` or `false`.
    pub fn parse_metadata(content: &str) -> ScriptMetadata {
        let mut metadata = ScriptMetadata::default();

        let header = content
            .lines()
            .map(str::trim)
            .take_while(|line| line.is_empty() || line.starts_with("--"))
            .filter_map(|line| line.strip_prefix("--"));

        for comment in header {
            let Some(tag) = comment.trim().strip_prefix('@') else {
                continue;
            };
            let (key, value) = tag.split_once(char::is_whitespace).unwrap_or((tag, ""));
            let value = value.trim();
            match key {
                "name" if !value.is_empty() => metadata.name = Some(value.to_string()),
                "description" => metadata.description = Some(value.to_string()),
                "enabled" => metadata.enabled = value.parse().ok(),
                _ => {}
            }
        }

        metadata
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.root
    }
}

fn walk(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "lua") {
            paths.push(path);
        }
    }
    Ok(())
}
