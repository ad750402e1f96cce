//! Glob-based source expansion
//!
//! Compiles glob patterns to anchored regular expressions over the path
//! relative to the base directory, then walks the tree with `walkdir`.
//! Supported syntax: `*` (any run within one path segment), `**` (any run
//! across segments), `?` (one character within a segment), `[abc]`,
//! `[a-z]`, and `[!abc]` character classes. Matching is done on
//! forward-slash-normalized relative paths so patterns behave the same on
//! every platform. Results are sorted and deduplicated for reproducible
//! builds.

use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use walkdir::WalkDir;

use crate::adapters::{ExpandError, GlobOptions, SourceExpander};

/// Default [`SourceExpander`] backed by a filesystem walk
#[derive(Debug, Default)]
pub struct WalkdirExpander;

impl WalkdirExpander {
    pub fn new() -> Self {
        Self
    }
}

/// Whether a pattern contains any glob metacharacters
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

impl SourceExpander for WalkdirExpander {
    fn expand(
        &self,
        base_dir: &Path,
        pattern: &str,
        options: &GlobOptions,
    ) -> Result<Vec<PathBuf>, ExpandError> {
        if !is_glob(pattern) {
            let path = base_dir.join(pattern);
            if path.is_file() || (!options.files_only && path.exists()) {
                return Ok(vec![path]);
            }
            return Ok(Vec::new());
        }

        let regex = glob_to_regex(pattern, options.case_sensitive)?;

        let mut matches = Vec::new();
        let walker = WalkDir::new(base_dir)
            .max_depth(options.max_depth)
            .follow_links(options.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                options.include_hidden
                    || entry.depth() == 0
                    || !entry.file_name().to_string_lossy().starts_with('.')
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                // unreadable subtrees are skipped, not fatal
                Err(_) => continue,
            };
            if options.files_only && !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(base_dir) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            let normalized = normalize(relative);
            if regex.is_match(&normalized) {
                matches.push(entry.path().to_path_buf());
            }
        }

        matches.sort();
        matches.dedup();
        Ok(matches)
    }
}

fn normalize(path: &Path) -> String {
    let text = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Compile a glob pattern to an anchored regex over relative paths
fn glob_to_regex(pattern: &str, case_sensitive: bool) -> Result<regex::Regex, ExpandError> {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    // `**/` may match zero segments; a trailing `**` matches anything
                    if chars.get(i + 2) == Some(&'/') {
                        out.push_str("(?:[^/]+/)*");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => {
                let Some(close) = find_class_end(&chars, i) else {
                    return Err(ExpandError::new(pattern, "unclosed character class"));
                };
                out.push('[');
                let mut j = i + 1;
                if chars.get(j) == Some(&'!') {
                    out.push('^');
                    j += 1;
                }
                while j < close {
                    let c = chars[j];
                    if c == '\\' || c == '^' || c == ']' {
                        out.push('\\');
                    }
                    out.push(c);
                    j += 1;
                }
                out.push(']');
                i = close + 1;
            }
            c => {
                if "\\.+()|{}^$".contains(c) {
                    out.push('\\');
                }
                out.push(c);
                i += 1;
            }
        }
    }
    out.push('$');

    RegexBuilder::new(&out)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|error| ExpandError::new(pattern, error))
}

/// Index of the `]` closing a character class starting at `open`
fn find_class_end(chars: &[char], open: usize) -> Option<usize> {
    // a `]` immediately after `[` or `[!` is literal
    let mut j = open + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}
