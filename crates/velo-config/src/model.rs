//! Configuration model extraction
//!
//! Converts a parsed document into the immutable [`ConfigModel`]: project
//! metadata, fully resolved global variables, and one [`TargetSpec`] per
//! entry in the `targets` array. All interpolation happens here; the model
//! holds only resolved strings and never references the AST.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::ast::{Node, NodeId};
use crate::interp::{resolve_globals, Interpolator, Scope};
use crate::parser::Document;
use crate::{ConfigError, ConfigResult};

/// Kind of build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Executable program
    Binary,
    /// Static library
    Library,
    /// Single relocatable object
    Object,
}

impl TargetKind {
    /// Parse a `type` member value
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "binary" => Some(Self::Binary),
            "library" => Some(Self::Library),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Library => write!(f, "library"),
            Self::Object => write!(f, "object"),
        }
    }
}

impl Default for TargetKind {
    fn default() -> Self {
        Self::Binary
    }
}

/// One target from the build description
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    /// Unique, non-empty identifier
    pub name: String,
    pub kind: TargetKind,
    /// Source patterns as written (globs or plain paths)
    pub source_patterns: Vec<String>,
    /// Resolved source files, canonically sorted; filled by expansion
    pub sources: Vec<PathBuf>,
    /// Targets this one declares a dependency on
    pub declared_deps: BTreeSet<String>,
    /// Target-specific compiler flags
    pub flags: Vec<String>,
    /// Output artifact path; filled once the output directory is known
    pub output_path: PathBuf,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            source_patterns: Vec::new(),
            sources: Vec::new(),
            declared_deps: BTreeSet::new(),
            flags: Vec::new(),
            output_path: PathBuf::new(),
        }
    }

    /// Derive the output artifact path for this target under `output_dir`
    pub fn derive_output_path(&self, output_dir: &Path) -> PathBuf {
        match self.kind {
            TargetKind::Binary => output_dir.join(&self.name),
            TargetKind::Library => output_dir.join(format!("lib{}.a", self.name)),
            TargetKind::Object => output_dir.join(format!("{}.o", self.name)),
        }
    }

    /// Where a library target's per-source object file lands
    pub fn object_path(&self, output_dir: &Path, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        output_dir
            .join("obj")
            .join(&self.name)
            .join(format!("{stem}.o"))
    }
}

/// The fully resolved build description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigModel {
    /// Project metadata in declaration order
    pub project: Vec<(String, String)>,
    /// Global variables, post-interpolation, in declaration order
    pub variables: Vec<(String, String)>,
    pub targets: Vec<TargetSpec>,
}

impl ConfigModel {
    /// A project metadata value by key
    pub fn project_value(&self, key: &str) -> Option<&str> {
        self.project
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The project name, if declared
    pub fn project_name(&self) -> Option<&str> {
        self.project_value("name")
    }

    /// Look up a target by name
    pub fn target(&self, name: &str) -> Option<&TargetSpec> {
        self.targets.iter().find(|t| t.name == name)
    }
}

const KNOWN_TARGET_KEYS: &[&str] = &["name", "type", "sources", "deps", "flags", "variables"];
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["project", "variables", "targets"];

/// Extract and resolve a [`ConfigModel`] from a parsed document
pub fn extract_model(document: &Document, file: &str) -> ConfigResult<ConfigModel> {
    let arena = &document.arena;

    if let Some(root) = document.root {
        for (key, _) in arena.members(root) {
            if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
                warn!(file, key = %key, "ignoring unknown top-level member");
            }
        }
    }

    let globals = resolve_globals(arena, document.variables())?;

    let mut model = ConfigModel {
        variables: globals.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        ..ConfigModel::default()
    };

    // project metadata: strings interpolate against the global scope
    if let Some(project) = document.project() {
        let mut interp = Interpolator::new(&globals);
        for (key, value) in arena.members(project) {
            let rendered = match arena.get(*value) {
                Node::Str(s) => interp.resolve_value(s)?,
                Node::Int(n) => n.to_string(),
                Node::Bool(b) => b.to_string(),
                _ => {
                    warn!(file, key = %key, "ignoring non-scalar project member");
                    continue;
                }
            };
            model.project.push((key.clone(), rendered));
        }
    }

    let Some(targets) = document.targets() else {
        return Ok(model);
    };

    let mut seen = BTreeSet::new();
    for element in arena.elements(targets) {
        let Node::Object(_) = arena.get(*element) else {
            let (line, column) = arena.position(*element);
            warn!(file, line, column, "ignoring non-object entry in targets array");
            continue;
        };

        let target = extract_target(document, *element, &globals, file)?;
        if !seen.insert(target.name.clone()) {
            return Err(ConfigError::DuplicateTarget(target.name));
        }
        model.targets.push(target);
    }

    Ok(model)
}

fn extract_target(
    document: &Document,
    element: NodeId,
    globals: &Scope,
    file: &str,
) -> ConfigResult<TargetSpec> {
    let arena = &document.arena;
    let local = Scope::from_object(arena, arena.member(element, "variables"));
    let mut interp = Interpolator::new(globals).with_local(&local);

    let name = match arena.member(element, "name").and_then(|id| arena.as_string(id)) {
        Some(value) => interp.resolve_value(value)?,
        None => String::new(),
    };
    if name.is_empty() {
        let (line, column) = arena.position(element);
        return Err(ConfigError::InvalidTarget {
            target: format!("{file}:{line}:{column}"),
            reason: "missing or empty 'name'".to_string(),
        });
    }

    let kind = match arena.member(element, "type").and_then(|id| arena.as_string(id)) {
        Some(value) => {
            let text = interp.resolve_value(value)?;
            TargetKind::parse(&text).ok_or_else(|| ConfigError::InvalidTarget {
                target: name.clone(),
                reason: format!("unknown target type '{text}'"),
            })?
        }
        None => TargetKind::default(),
    };

    let mut target = TargetSpec::new(name, kind);
    target.source_patterns = string_array(document, element, "sources", &mut interp)?;
    target.declared_deps = string_array(document, element, "deps", &mut interp)?
        .into_iter()
        .collect();
    target.flags = string_array(document, element, "flags", &mut interp)?;

    for (key, _) in arena.members(element) {
        if !KNOWN_TARGET_KEYS.contains(&key.as_str()) {
            warn!(file, target = %target.name, key = %key, "ignoring unknown target member");
        }
    }

    Ok(target)
}

/// Resolve an array-of-strings member; non-string elements are skipped
fn string_array(
    document: &Document,
    element: NodeId,
    key: &str,
    interp: &mut Interpolator<'_>,
) -> ConfigResult<Vec<String>> {
    let arena = &document.arena;
    let Some(array) = arena.member(element, key) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for id in arena.elements(array) {
        match arena.as_string(*id) {
            Some(value) => out.push(interp.resolve_value(value)?),
            None => {
                let (line, column) = arena.position(*id);
                warn!(key, line, column, "ignoring non-string array element");
            }
        }
    }
    Ok(out)
}
