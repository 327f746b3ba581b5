//! Import resolution.
//!
//! The host supplies an [`ImportResolver`]; the evaluator asks it for the
//! contents of `import`/`importstr` targets and memoises the answer per
//! `(base_dir, rel_path)`, so the rest of the run is referentially
//! transparent even if the underlying filesystem changes mid-run.

use std::{fs, path::PathBuf, rc::Rc};

use ahash::AHashMap;

use crate::ast::ExprRef;

/// Resolves an import target to file contents.
pub trait ImportResolver {
    /// `base_dir` is the directory (with trailing slash, possibly empty) of
    /// the file containing the import expression; `rel_path` is the target
    /// as written. On success returns the contents and the path the file was
    /// actually found at, which becomes `base_dir` for nested imports. On
    /// failure returns a message describing why.
    fn resolve(&mut self, base_dir: &str, rel_path: &str) -> Result<(String, String), String>;
}

/// Resolver that refuses every import. Useful for embedders evaluating
/// self-contained snippets and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve(&mut self, _base_dir: &str, rel_path: &str) -> Result<(String, String), String> {
        Err(format!("Imports are not available: {rel_path}"))
    }
}

/// Filesystem resolver: tries the importing file's directory first, then the
/// library search paths, last added first.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    search_paths: Vec<PathBuf>,
}

impl FileResolver {
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    fn try_path(dir: &str, rel: &str) -> Option<(String, String)> {
        let abs = if rel.starts_with('/') {
            rel.to_string()
        } else {
            format!("{dir}{rel}")
        };
        fs::read_to_string(&abs).ok().map(|contents| (contents, abs))
    }
}

impl ImportResolver for FileResolver {
    fn resolve(&mut self, base_dir: &str, rel_path: &str) -> Result<(String, String), String> {
        if let Some(found) = Self::try_path(base_dir, rel_path) {
            return Ok(found);
        }
        for dir in self.search_paths.iter().rev() {
            let mut dir = dir.to_string_lossy().into_owned();
            if !dir.is_empty() && !dir.ends_with('/') {
                dir.push('/');
            }
            if let Some(found) = Self::try_path(&dir, rel_path) {
                return Ok(found);
            }
        }
        Err("No match locally or in the library search paths.".to_string())
    }
}

/// One resolved import: contents plus the path it was found at.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedImport {
    pub contents: Rc<str>,
    pub resolved_path: Rc<str>,
}

/// Per-run memoisation of import results. Contents are cached under the
/// `(base_dir, rel_path)` pair that requested them; parsed programs are
/// cached under the resolved path so the same file imported from two places
/// is parsed once. Never purged during a run.
#[derive(Debug, Default)]
pub(crate) struct ImportCache {
    contents: AHashMap<(String, String), ResolvedImport>,
    programs: AHashMap<Rc<str>, ExprRef>,
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, base_dir: &str, rel_path: &str) -> Option<&ResolvedImport> {
        self.contents
            .get(&(base_dir.to_string(), rel_path.to_string()))
    }

    pub fn insert(&mut self, base_dir: String, rel_path: String, resolved: ResolvedImport) {
        self.contents.insert((base_dir, rel_path), resolved);
    }

    pub fn lookup_program(&self, resolved_path: &str) -> Option<ExprRef> {
        self.programs.get(resolved_path).map(Rc::clone)
    }

    pub fn insert_program(&mut self, resolved_path: Rc<str>, program: ExprRef) {
        self.programs.insert(resolved_path, program);
    }
}
