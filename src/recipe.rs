//! Recipe loading
//!
//! A recipe is an ordered list of declarations, stored as TOML
//! (`[[resource]]` tables) or JSON (an array, or an object with a
//! `resource` array). Every declaration is validated before anything runs.

use declarative::{DeclarationSpec, ResourceDeclaration, validate_all};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("could not read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported recipe format '{0}' (expected .toml or .json)")]
    UnsupportedFormat(String),

    #[error("invalid TOML recipe: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON recipe: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} invalid declaration(s)", .0.len())]
    Invalid(Vec<(usize, declarative::Error)>),
}

pub type Result<T> = std::result::Result<T, RecipeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFormat {
    Toml,
    Json,
}

impl RecipeFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(RecipeError::UnsupportedFormat(ext)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeDocument {
    #[serde(default, rename = "resource")]
    resources: Vec<DeclarationSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonRecipe {
    List(Vec<DeclarationSpec>),
    Document(RecipeDocument),
}

/// Read and validate a recipe file
pub fn load(path: &Path) -> Result<Vec<ResourceDeclaration>> {
    let format = RecipeFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|source| RecipeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let declarations = parse(&content, format)?;
    log::debug!(
        "Loaded {} declaration(s) from {}",
        declarations.len(),
        path.display()
    );
    Ok(declarations)
}

/// Parse and validate recipe text
pub fn parse(content: &str, format: RecipeFormat) -> Result<Vec<ResourceDeclaration>> {
    let specs = match format {
        RecipeFormat::Toml => toml::from_str::<RecipeDocument>(content)?.resources,
        RecipeFormat::Json => match serde_json::from_str::<JsonRecipe>(content)? {
            JsonRecipe::List(specs) => specs,
            JsonRecipe::Document(document) => document.resources,
        },
    };
    validate_all(specs).map_err(RecipeError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Action, ResourceKind, Value};

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            RecipeFormat::from_path(Path::new("web.TOML")).unwrap(),
            RecipeFormat::Toml
        );
        assert_eq!(
            RecipeFormat::from_path(Path::new("web.json")).unwrap(),
            RecipeFormat::Json
        );
        assert!(matches!(
            RecipeFormat::from_path(Path::new("web.rb")),
            Err(RecipeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_toml_keeps_order() {
        let declarations = parse(
            r#"
            [[resource]]
            type = "service"
            name = "w32time"
            actions = ["enable", "start"]

            [[resource]]
            type = "site"
            name = "WebApplication1"
            actions = ["add", "start"]
            attributes = { port = 80, path = "WebApplication1" }
            "#,
            RecipeFormat::Toml,
        )
        .unwrap();

        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].kind(), ResourceKind::Service);
        assert_eq!(declarations[0].actions(), &[Action::Enable, Action::Start]);
        assert_eq!(declarations[1].attr("port"), Some(&Value::Int(80)));
    }

    #[test]
    fn test_parse_json_array_and_document() {
        let array = r#"[{"type": "directory", "name": "WebApplication1"}]"#;
        let document = r#"{"resource": [{"type": "directory", "name": "WebApplication1", "action": "create"}]}"#;
        for content in [array, document] {
            let declarations = parse(content, RecipeFormat::Json).unwrap();
            assert_eq!(declarations[0].actions(), &[Action::Create]);
        }
    }

    #[test]
    fn test_invalid_declarations_are_all_reported() {
        let err = parse(
            r#"
            [[resource]]
            type = "service"
            name = "w3svc"
            actions = ["enable"]

            [[resource]]
            type = "application_pool"
            name = "P"
            attributes = { pipeline_mode = "Hybrid" }

            [[resource]]
            type = "mainframe"
            name = "M"
            "#,
            RecipeFormat::Toml,
        )
        .unwrap_err();

        let RecipeError::Invalid(problems) = err else {
            panic!("expected validation errors, got {err}");
        };
        let indexes: Vec<usize> = problems.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![1, 2]);
        assert_eq!(problems[0].1.offending_keys(), vec!["pipeline_mode"]);
    }

    #[test]
    fn test_float_attribute_names_its_key() {
        let err = parse(
            r#"[{"type": "application_pool", "name": "WebApplication1",
                 "attributes": {"runtime_version": 4.0, "pipeline_mode": "Integrated"}}]"#,
            RecipeFormat::Json,
        )
        .unwrap_err();

        let RecipeError::Invalid(problems) = err else {
            panic!("expected validation errors, got {err}");
        };
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, 0);
        assert_eq!(problems[0].1.offending_keys(), vec!["runtime_version"]);
        assert!(problems[0].1.to_string().contains("got float"));
    }

    #[test]
    fn test_float_port_is_reported_with_other_problems() {
        let err = parse(
            r#"
            [[resource]]
            type = "site"
            name = "WebApplication1"
            attributes = { port = 80.0, path = "WebApplication1" }

            [[resource]]
            type = "application_pool"
            name = "WebApplication1"
            attributes = { runtime_version = 4.0 }
            "#,
            RecipeFormat::Toml,
        )
        .unwrap_err();

        let RecipeError::Invalid(problems) = err else {
            panic!("expected validation errors, got {err}");
        };
        let indexes: Vec<usize> = problems.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(problems[0].1.offending_keys(), vec!["port"]);
        assert_eq!(problems[1].1.offending_keys(), vec!["runtime_version"]);
    }

    #[test]
    fn test_unknown_declaration_fields_are_rejected() {
        let result = parse(
            "[[resource]]\ntype = \"service\"\nname = \"w3svc\"\nnotify = \"w3svc\"\n",
            RecipeFormat::Toml,
        );
        assert!(matches!(result, Err(RecipeError::Toml(_))));
    }

    #[test]
    fn test_bundled_recipe_is_valid() {
        let declarations = parse(
            include_str!("../recipes/windows-web.toml"),
            RecipeFormat::Toml,
        )
        .unwrap();
        assert_eq!(declarations.len(), 10);
        assert_eq!(
            declarations.iter().filter(|d| !d.is_enabled()).count(),
            3
        );
        let product = declarations.last().unwrap();
        assert_eq!(product.kind(), ResourceKind::InstallableProduct);
        assert_eq!(product.bool_attr("accept_eula"), Some(true));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.json");
        fs::write(&path, r#"[{"type": "service", "name": "w3svc", "actions": ["start"]}]"#)
            .unwrap();
        let declarations = load(&path).unwrap();
        assert_eq!(declarations[0].name(), "w3svc");

        let missing = dir.path().join("missing.toml");
        assert!(matches!(load(&missing), Err(RecipeError::Read { .. })));
    }
}
