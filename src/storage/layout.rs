//! Storage scope selection and path resolution.
//!
//! State lives either project-local under `<project>/var/storage/` or
//! globally under `~/.mcptools/`. Selection is deterministic: if
//! `<project>/var` exists the project scope wins, otherwise the global
//! scope is used; `MCPTOOLS_SCOPE` forces either, and `MCPTOOLS_DATA_DIR`
//! replaces the base directory entirely.

use crate::config::{ENV_DATA_DIR, ENV_SCOPE};
use crate::error::{RetrievalError, RetrievalResult};
use std::path::{Path, PathBuf};

/// Where persisted state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// `<project>/var/storage/...`
    Project,
    /// `~/.mcptools/...`
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Global => "global",
        }
    }
}

/// The kinds of store the layout can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Relational,
    Vector,
}

/// Resolves all on-disk paths for a project root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    project_root: PathBuf,
    home_dir: PathBuf,
    data_dir_override: Option<PathBuf>,
    forced_scope: Option<Scope>,
}

impl StorageLayout {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let forced_scope = std::env::var(ENV_SCOPE).ok().and_then(|v| {
            match v.to_ascii_lowercase().as_str() {
                "project" => Some(Scope::Project),
                "global" => Some(Scope::Global),
                other => {
                    tracing::warn!("Ignoring unknown {ENV_SCOPE} value '{other}'");
                    None
                }
            }
        });
        let data_dir_override = std::env::var(ENV_DATA_DIR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            project_root: project_root.into(),
            home_dir: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
            data_dir_override,
            forced_scope,
        }
    }

    /// Construct with explicit overrides, bypassing the environment.
    /// Used by tests and by hosts that manage configuration themselves.
    pub fn with_overrides(
        project_root: impl Into<PathBuf>,
        home_dir: impl Into<PathBuf>,
        data_dir_override: Option<PathBuf>,
        forced_scope: Option<Scope>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            home_dir: home_dir.into(),
            data_dir_override,
            forced_scope,
        }
    }

    /// Deterministic scope selection.
    pub fn scope(&self) -> Scope {
        if let Some(forced) = self.forced_scope {
            return forced;
        }
        if self.project_root.join("var").is_dir() {
            Scope::Project
        } else {
            Scope::Global
        }
    }

    /// Base directory for a scope.
    pub fn base_path(&self, scope: Scope) -> PathBuf {
        if let Some(dir) = &self.data_dir_override {
            return dir.clone();
        }
        match scope {
            Scope::Project => self.project_root.join("var").join("storage"),
            Scope::Global => self.home_dir.join(".mcptools"),
        }
    }

    /// Directory for one vector collection.
    pub fn vector_store_path(&self, scope: Scope, collection: &str) -> PathBuf {
        self.base_path(scope).join("vector").join(collection)
    }

    /// Path of a relational database file.
    pub fn relational_path(&self, scope: Scope, db_name: &str) -> PathBuf {
        self.base_path(scope).join(format!("{db_name}.db"))
    }

    /// Path of the keyword index directory.
    pub fn keyword_index_path(&self, scope: Scope) -> PathBuf {
        self.base_path(scope).join("keyword")
    }

    /// Leaves-first list of base directories to consult when reading, so
    /// an older global store stays readable after a project-local one is
    /// created.
    pub fn search_paths(&self, kind: StoreKind) -> Vec<PathBuf> {
        let sub = match kind {
            StoreKind::Relational => "",
            StoreKind::Vector => "vector",
        };
        let mut paths = Vec::new();
        for scope in [Scope::Project, Scope::Global] {
            let base = self.base_path(scope);
            let path = if sub.is_empty() { base } else { base.join(sub) };
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// Create a directory lazily. Failure is reported, never hidden.
    pub fn ensure_dir(&self, path: &Path) -> RetrievalResult<()> {
        std::fs::create_dir_all(path).map_err(|e| RetrievalError::io_path(path, e))
    }
}
