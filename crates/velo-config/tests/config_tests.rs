//! Integration tests for build-description loading
//!
//! Exercises the full path: lexing, parsing, interpolation, and model
//! extraction, in both dialects.

use velo_config::{load_model, ConfigError, TargetKind};

#[test]
fn test_complete_braced_document() {
    let source = r#"
// demo project
{
    project: {
        name: `demo`,
        version: `0.3.1`,
    },
    variables: {
        SRC: `src`,
        OUT_NAME: `demo-tool`,
    },
    targets: [
        {
            name: `util`,
            type: library,
            sources: [`&{SRC}/util/*.velo`],
        },
        {
            name: `app`,
            type: binary,
            sources: [`&{SRC}/main.velo`],
            deps: [`util`],
            flags: [`-O2`],
            variables: { SRC: `app_src` },
        },
    ],
}
"#;

    let model = load_model(source, "build.vbc").unwrap();
    assert_eq!(model.project_name(), Some("demo"));
    assert_eq!(model.targets.len(), 2);

    let util = model.target("util").unwrap();
    assert_eq!(util.kind, TargetKind::Library);
    assert_eq!(util.source_patterns, vec!["src/util/*.velo"]);

    // the local SRC shadows the global one for `app`
    let app = model.target("app").unwrap();
    assert_eq!(app.source_patterns, vec!["app_src/main.velo"]);
    assert!(app.declared_deps.contains("util"));
}

#[test]
fn test_equivalent_legacy_document() {
    let source = r#"
# demo project
[project]
name = "demo"

[variables]
SRC = "src"

[target.util]
type = "library"
sources = ["&{SRC}/util/*.velo"]

[target.app]
sources = ["&{SRC}/main.velo"]
deps = ["util"]
flags = ["-O2"]
"#;

    let model = load_model(source, "build.vbc").unwrap();
    assert_eq!(model.project_name(), Some("demo"));
    assert_eq!(model.targets.len(), 2);
    assert_eq!(model.target("util").unwrap().kind, TargetKind::Library);
    assert_eq!(
        model.target("app").unwrap().source_patterns,
        vec!["src/main.velo"]
    );
}

#[test]
fn test_environment_reference() {
    std::env::set_var("VELO_CONFIG_IT_ROOT", "/work");
    let source = "{ targets: [ { name: `a`, flags: [`-L&{ENV.VELO_CONFIG_IT_ROOT}/lib`] } ] }";
    let model = load_model(source, "build.vbc").unwrap();
    assert_eq!(model.targets[0].flags, vec!["-L/work/lib"]);
    std::env::remove_var("VELO_CONFIG_IT_ROOT");
}

#[test]
fn test_circular_variables_fail_with_path() {
    let source = "{ variables: { A: `&{B}`, B: `&{A}` } }";
    let err = load_model(source, "build.vbc").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("circular"), "message: {message}");
    assert!(message.contains("A"), "message: {message}");
}

#[test]
fn test_syntax_errors_reported_with_positions() {
    let source = "{\n  targets: [\n    { name `app` }\n  ]\n}";
    match load_model(source, "build.vbc").unwrap_err() {
        ConfigError::Syntax { diagnostics, .. } => {
            assert!(!diagnostics.is_empty());
            assert!(diagnostics[0].line >= 3);
            assert!(diagnostics[0].to_string().starts_with("build.vbc:"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_recovery_surfaces_later_targets() {
    // the first target is malformed; recovery still reaches the second,
    // and the document as a whole is rejected
    let source = "{ targets: [ { name: }, { name: `ok` } ] }";
    let err = load_model(source, "build.vbc").unwrap_err();
    assert!(matches!(err, ConfigError::Syntax { .. }));
}
