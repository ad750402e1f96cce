//! Dependency graph construction, topological ordering, and cycle detection
//!
//! Forward edges are the union of each target's declared dependencies and
//! the module names its sources import, filtered to known target names
//! (anything else is an external import and ignored). The reverse map is
//! built in the same pass for dirty propagation. Ordering uses Kahn's
//! algorithm with a lexicographic ready set so build plans are reproducible
//! regardless of hash-map iteration order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use velo_config::TargetSpec;

use crate::error::{BuildError, BuildResult};

/// Forward/reverse dependency maps plus a topological order
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    forward: BTreeMap<String, BTreeSet<String>>,
    reverse: BTreeMap<String, BTreeSet<String>>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph from target specs and per-target scanned imports.
    /// Fails on unknown declared dependencies and on cycles.
    pub fn build(
        targets: &[TargetSpec],
        scanned_imports: &HashMap<String, Vec<String>>,
    ) -> BuildResult<Self> {
        let known: BTreeSet<&str> = targets.iter().map(|t| t.name.as_str()).collect();

        let mut forward: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for target in targets {
            forward.entry(target.name.clone()).or_default();
            reverse.entry(target.name.clone()).or_default();
        }

        for target in targets {
            for dep in &target.declared_deps {
                if !known.contains(dep.as_str()) {
                    return Err(BuildError::MissingDependency {
                        target: target.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                forward.get_mut(&target.name).unwrap().insert(dep.clone());
                reverse.get_mut(dep).unwrap().insert(target.name.clone());
            }

            // scanned names that match a known target become edges; the
            // rest are imports of external modules
            if let Some(imports) = scanned_imports.get(&target.name) {
                for import in imports {
                    if import != &target.name && known.contains(import.as_str()) {
                        forward.get_mut(&target.name).unwrap().insert(import.clone());
                        reverse.get_mut(import).unwrap().insert(target.name.clone());
                    }
                }
            }
        }

        let mut graph = Self {
            forward,
            reverse,
            order: Vec::new(),
        };
        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    /// Kahn's algorithm; zero-in-degree nodes pop in lexicographic order
    fn topological_order(&self) -> BuildResult<Vec<String>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .forward
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&name, _)| name)
            .collect();

        let mut order = Vec::with_capacity(self.forward.len());
        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            if let Some(dependents) = self.reverse.get(name) {
                for dependent in dependents {
                    let degree = remaining.get_mut(dependent.as_str()).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() != self.forward.len() {
            return Err(BuildError::Cycle {
                path: self.recover_cycle(&order),
            });
        }
        Ok(order)
    }

    /// Walk forward edges inside the unordered set until a vertex repeats,
    /// returning the closed walk for the error message.
    fn recover_cycle(&self, ordered: &[String]) -> Vec<String> {
        let ordered: BTreeSet<&str> = ordered.iter().map(String::as_str).collect();
        let start = self
            .forward
            .keys()
            .find(|name| !ordered.contains(name.as_str()));
        let Some(start) = start else {
            return Vec::new();
        };

        let mut path = vec![start.clone()];
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        seen.insert(start.as_str());
        let mut current = start.as_str();

        loop {
            let next = self.forward[current]
                .iter()
                .find(|dep| !ordered.contains(dep.as_str()));
            let Some(next) = next else {
                return path;
            };
            path.push(next.clone());
            if !seen.insert(next.as_str()) {
                // trim the lead-in so the walk starts at the repeated vertex
                let head = path.last().unwrap();
                if let Some(at) = path.iter().position(|n| n == head) {
                    return path[at..].to_vec();
                }
                return path;
            }
            current = next.as_str();
        }
    }

    /// Dependencies of one target
    pub fn dependencies(&self, name: &str) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.forward.get(name).unwrap_or(&EMPTY)
    }

    /// Targets that depend on the given one
    pub fn dependents(&self, name: &str) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.reverse.get(name).unwrap_or(&EMPTY)
    }

    /// Topological order over all targets
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Close a dirty set under reverse edges: if a target is dirty, every
    /// transitive dependent becomes dirty.
    pub fn dirty_closure(&self, initial: &BTreeSet<String>) -> BTreeSet<String> {
        let mut dirty = initial.clone();
        let mut work: Vec<&String> = initial.iter().collect();
        while let Some(name) = work.pop() {
            if let Some(dependents) = self.reverse.get(name) {
                for dependent in dependents {
                    if dirty.insert(dependent.clone()) {
                        work.push(dependent);
                    }
                }
            }
        }
        dirty
    }

    /// Forward graph in Graphviz DOT format
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph dependencies {\n");
        out.push_str("  rankdir=LR;\n");
        out.push_str("  node [shape=box];\n");
        for (target, deps) in &self.forward {
            if deps.is_empty() && self.reverse[target].is_empty() {
                out.push_str(&format!("  \"{target}\";\n"));
            }
            for dep in deps {
                out.push_str(&format!("  \"{target}\" -> \"{dep}\";\n"));
            }
        }
        out.push_str("}\n");
        out
    }
}
