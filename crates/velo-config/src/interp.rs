//! Variable interpolation for build-description values
//!
//! Resolves `&{NAME}` references against a scope chain: `ENV.`-prefixed
//! names consult the process environment, then the target-local scope, then
//! the global `variables` section. Values may reference other variables;
//! resolution recurses with three-color marking (white = unseen, gray = on
//! stack, black = resolved) so cycles are reported with the full resolution
//! path and resolved values are memoized for O(V+E) total work.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

use crate::ast::{Arena, NodeId, Segment, StringValue};

/// Environment-variable reference prefix inside `&{...}`
const ENV_PREFIX: &str = "ENV.";

/// Interpolation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error("undefined variable '{name}' (while resolving {})", .path.join(" -> "))]
    Undefined { name: String, path: Vec<String> },

    #[error("environment variable not set: {0}")]
    MissingEnv(String),

    #[error("circular variable definition: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("unterminated variable placeholder in \"{0}\"")]
    Unterminated(String),
}

/// An ordered variable scope (insertion order preserved)
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: Vec<(String, String)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scope from the literal string members of a `variables`
    /// object node. Composite members resolve lazily during lookup, so
    /// their raw text is reconstructed here.
    pub fn from_object(arena: &Arena, object: Option<NodeId>) -> Self {
        let mut scope = Scope::new();
        let Some(object) = object else {
            return scope;
        };
        for (key, value) in arena.members(object) {
            if let Some(value) = arena.as_string(*value) {
                scope.set(key, raw_text(value));
            }
        }
        scope
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.vars.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value.into(),
            None => self.vars.push((name, value.into())),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Reconstruct the raw source text of a string value, placeholders included
fn raw_text(value: &StringValue) -> String {
    match value {
        StringValue::Literal(text) => text.clone(),
        StringValue::Composite(segments) => {
            let mut out = String::new();
            for segment in segments {
                match segment {
                    Segment::Literal(text) => out.push_str(text),
                    Segment::Variable(name) => {
                        out.push_str("&{");
                        out.push_str(name);
                        out.push('}');
                    }
                }
            }
            out
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

/// Interpolation engine for one resolution context
///
/// Memoization is keyed by variable name, so one interpolator must not be
/// reused across targets whose local scopes shadow different values; the
/// document pass creates a fresh interpolator per target.
pub struct Interpolator<'a> {
    global: &'a Scope,
    local: Option<&'a Scope>,
    colors: HashMap<String, Color>,
    cache: HashMap<String, String>,
    path: Vec<String>,
}

impl<'a> Interpolator<'a> {
    pub fn new(global: &'a Scope) -> Self {
        Self {
            global,
            local: None,
            colors: HashMap::new(),
            cache: HashMap::new(),
            path: Vec::new(),
        }
    }

    pub fn with_local(mut self, local: &'a Scope) -> Self {
        self.local = Some(local);
        self
    }

    /// Resolve every `&{NAME}` reference in a raw string
    pub fn resolve_text(&mut self, input: &str) -> Result<String, InterpError> {
        let mut out = String::new();
        let mut rest = input;
        while let Some(at) = rest.find("&{") {
            out.push_str(&rest[..at]);
            let after = &rest[at + 2..];
            let Some(close) = after.find('}') else {
                return Err(InterpError::Unterminated(input.to_string()));
            };
            out.push_str(&self.resolve_variable(&after[..close])?);
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Resolve a parsed string value segment-by-segment
    pub fn resolve_value(&mut self, value: &StringValue) -> Result<String, InterpError> {
        match value {
            // literal strings may still carry placeholders in the legacy dialect
            StringValue::Literal(text) => self.resolve_text(text),
            StringValue::Composite(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Variable(name) => out.push_str(&self.resolve_variable(name)?),
                    }
                }
                Ok(out)
            }
        }
    }

    fn resolve_variable(&mut self, name: &str) -> Result<String, InterpError> {
        self.path.push(name.to_string());
        let result = self.resolve_inner(name);
        self.path.pop();
        result
    }

    fn resolve_inner(&mut self, name: &str) -> Result<String, InterpError> {
        match self.colors.get(name) {
            Some(Color::Gray) => {
                return Err(InterpError::Cycle {
                    path: self.path.clone(),
                })
            }
            Some(Color::Black) => return Ok(self.cache[name].clone()),
            None => {}
        }

        self.colors.insert(name.to_string(), Color::Gray);

        let resolved = if let Some(env_name) = name.strip_prefix(ENV_PREFIX) {
            env::var(env_name).map_err(|_| InterpError::MissingEnv(env_name.to_string()))?
        } else if let Some(raw) = self.local.and_then(|scope| scope.get(name)) {
            let raw = raw.to_string();
            self.resolve_text(&raw)?
        } else if let Some(raw) = self.global.get(name) {
            let raw = raw.to_string();
            self.resolve_text(&raw)?
        } else {
            return Err(InterpError::Undefined {
                name: name.to_string(),
                path: self.path.clone(),
            });
        };

        self.colors.insert(name.to_string(), Color::Black);
        self.cache.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }
}

/// Resolve the global `variables` section in declaration order.
/// Each value may reference earlier (or later) globals or the environment.
pub fn resolve_globals(arena: &Arena, variables: Option<NodeId>) -> Result<Scope, InterpError> {
    let raw = Scope::from_object(arena, variables);
    let mut resolved = Scope::new();
    let mut interp = Interpolator::new(&raw);
    for (name, _) in raw.iter() {
        let value = interp.resolve_variable(name)?;
        resolved.set(name, value);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(pairs: &[(&str, &str)]) -> Scope {
        let mut scope = Scope::new();
        for (k, v) in pairs {
            scope.set(*k, *v);
        }
        scope
    }

    #[test]
    fn test_plain_text_passthrough() {
        let global = Scope::new();
        let mut interp = Interpolator::new(&global);
        assert_eq!(interp.resolve_text("no placeholders").unwrap(), "no placeholders");
    }

    #[test]
    fn test_simple_substitution() {
        let global = scope(&[("NAME", "app")]);
        let mut interp = Interpolator::new(&global);
        assert_eq!(interp.resolve_text("bin/&{NAME}.exe").unwrap(), "bin/app.exe");
    }

    #[test]
    fn test_recursive_resolution() {
        let global = scope(&[
            ("ROOT", "/proj"),
            ("OUT", "&{ROOT}/build"),
            ("BIN", "&{OUT}/bin"),
        ]);
        let mut interp = Interpolator::new(&global);
        assert_eq!(interp.resolve_text("&{BIN}").unwrap(), "/proj/build/bin");
    }

    #[test]
    fn test_local_scope_shadows_global() {
        let global = scope(&[("OPT", "-O0")]);
        let local = scope(&[("OPT", "-O2")]);
        let mut interp = Interpolator::new(&global).with_local(&local);
        assert_eq!(interp.resolve_text("&{OPT}").unwrap(), "-O2");
    }

    #[test]
    fn test_env_reference() {
        env::set_var("VELO_INTERP_TEST", "from-env");
        let global = Scope::new();
        let mut interp = Interpolator::new(&global);
        assert_eq!(
            interp.resolve_text("&{ENV.VELO_INTERP_TEST}").unwrap(),
            "from-env"
        );
        env::remove_var("VELO_INTERP_TEST");
    }

    #[test]
    fn test_missing_env_is_hard_error() {
        let global = Scope::new();
        let mut interp = Interpolator::new(&global);
        let err = interp.resolve_text("&{ENV.VELO_DEFINITELY_UNSET}").unwrap_err();
        assert_eq!(err, InterpError::MissingEnv("VELO_DEFINITELY_UNSET".to_string()));
    }

    #[test]
    fn test_undefined_variable() {
        let global = Scope::new();
        let mut interp = Interpolator::new(&global);
        match interp.resolve_text("&{NOPE}").unwrap_err() {
            InterpError::Undefined { name, path } => {
                assert_eq!(name, "NOPE");
                assert_eq!(path, vec!["NOPE".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cycle_reports_full_path() {
        let global = scope(&[("A", "&{B}"), ("B", "&{C}"), ("C", "&{A}")]);
        let mut interp = Interpolator::new(&global);
        match interp.resolve_text("&{A}").unwrap_err() {
            InterpError::Cycle { path } => {
                assert_eq!(path, vec!["A", "B", "C", "A"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_cycle() {
        let global = scope(&[("X", "prefix-&{X}")]);
        let mut interp = Interpolator::new(&global);
        assert!(matches!(
            interp.resolve_text("&{X}").unwrap_err(),
            InterpError::Cycle { .. }
        ));
    }

    #[test]
    fn test_unterminated_placeholder() {
        let global = Scope::new();
        let mut interp = Interpolator::new(&global);
        assert!(matches!(
            interp.resolve_text("&{OPEN").unwrap_err(),
            InterpError::Unterminated(_)
        ));
    }

    #[test]
    fn test_memoization_returns_same_value() {
        let global = scope(&[("A", "&{B}&{B}"), ("B", "x")]);
        let mut interp = Interpolator::new(&global);
        assert_eq!(interp.resolve_text("&{A}").unwrap(), "xx");
        // second resolution hits the black cache
        assert_eq!(interp.resolve_text("&{A}").unwrap(), "xx");
    }

    #[test]
    fn test_resolve_globals_in_order() {
        let mut arena = Arena::new();
        use crate::ast::Node;
        let a = arena.alloc(Node::Str(StringValue::Literal("/p".to_string())), 1, 1);
        let b = arena.alloc(
            Node::Str(StringValue::Composite(vec![
                Segment::Variable("ROOT".to_string()),
                Segment::Literal("/out".to_string()),
            ])),
            2,
            1,
        );
        let obj = arena.alloc(
            Node::Object(vec![("ROOT".to_string(), a), ("OUT".to_string(), b)]),
            1,
            1,
        );

        let globals = resolve_globals(&arena, Some(obj)).unwrap();
        assert_eq!(globals.get("ROOT"), Some("/p"));
        assert_eq!(globals.get("OUT"), Some("/p/out"));
    }

    #[test]
    fn test_scope_ordered_iteration() {
        let scope = scope(&[("Z", "1"), ("A", "2")]);
        let keys: Vec<_> = scope.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Z", "A"]);
    }
}
