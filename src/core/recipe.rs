//! DF-004: Recipe loading and shape validation.
//!
//! Recipes are read as untyped JSON first so that a missing or mistyped key
//! can be reported by its full path (e.g. `recipeStepGroups[1].alias`)
//! before typed deserialization. Validation stops at the first problem.

use super::error::WrappedError;
use super::types::RecipeDocument;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

static ALIAS_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("alias pattern is valid")
});

/// Load a recipe file. `.yaml`/`.yml` is parsed as YAML, anything else as JSON.
pub fn load_recipe(path: &Path) -> Result<Value, WrappedError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WrappedError::validation(
            "RecipeNotReadable",
            format!("cannot read recipe {}: {}", path.display(), e),
        )
    })?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        parse_recipe_yaml(&content)
    } else {
        parse_recipe_json(&content)
    }
}

pub fn parse_recipe_json(text: &str) -> Result<Value, WrappedError> {
    serde_json::from_str(text).map_err(|e| {
        WrappedError::validation("RecipeParseError", format!("recipe is not valid JSON: {}", e))
    })
}

pub fn parse_recipe_yaml(text: &str) -> Result<Value, WrappedError> {
    serde_yaml_ng::from_str(text).map_err(|e| {
        WrappedError::validation("RecipeParseError", format!("recipe is not valid YAML: {}", e))
    })
}

/// Validate the outer and inner shape, then deserialize.
pub fn validate_document(raw: &Value) -> Result<RecipeDocument, WrappedError> {
    let root = raw
        .as_object()
        .ok_or_else(|| invalid("<root>", "the recipe must be a JSON object"))?;

    let version = require_str(root, "", "schemaVersion")?;
    let major = version.split('.').next().unwrap_or_default();
    if major != "1" {
        return Err(invalid(
            "schemaVersion",
            &format!("unsupported schema version \"{}\" (expected 1.x)", version),
        ));
    }

    let groups = require_array(root, "", "recipeStepGroups")?;
    let options = require_object(root, "", "options")?;
    validate_options(options)?;

    let mut seen_groups = HashSet::new();
    for (i, group) in groups.iter().enumerate() {
        let path = format!("recipeStepGroups[{}]", i);
        let group = group
            .as_object()
            .ok_or_else(|| invalid(&path, "a step group must be an object"))?;
        require_str(group, &path, "stepGroupName")?;
        let alias = require_alias(group, &path)?;
        if !seen_groups.insert(alias.to_string()) {
            return Err(invalid(
                &format!("{}.alias", path),
                &format!("duplicate step group alias '{}'", alias),
            ));
        }
        let steps = require_array(group, &path, "recipeSteps")?;
        for (j, step) in steps.iter().enumerate() {
            let step_path = format!("{}.recipeSteps[{}]", path, j);
            let step = step
                .as_object()
                .ok_or_else(|| invalid(&step_path, "a recipe step must be an object"))?;
            require_str(step, &step_path, "stepName")?;
            require_str(step, &step_path, "action")?;
            require_object(step, &step_path, "options")?;
        }
    }

    serde_json::from_value(raw.clone()).map_err(|e| {
        WrappedError::validation("InvalidRecipe", format!("recipe does not match the schema: {}", e))
    })
}

fn validate_options(options: &Map<String, Value>) -> Result<(), WrappedError> {
    let path = "options";
    let targets = require_array(options, path, "targetOrgs")?;
    if targets.is_empty() {
        return Err(invalid(
            "options.targetOrgs",
            "at least one target environment must be declared",
        ));
    }
    require_bool(options, path, "haltOnError")?;
    require_bool(options, path, "noCustomInstall")?;
    for key in ["skipGroups", "skipActions"] {
        if let Some(v) = options.get(key) {
            let ok = v
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string));
            if !ok {
                return Err(invalid(
                    &format!("options.{}", key),
                    "must be a list of strings",
                ));
            }
        }
    }

    let mut seen = HashSet::new();
    for (k, target) in targets.iter().enumerate() {
        let tpath = format!("options.targetOrgs[{}]", k);
        let target = target
            .as_object()
            .ok_or_else(|| invalid(&tpath, "a target org must be an object"))?;
        require_str(target, &tpath, "orgName")?;
        let alias = require_alias(target, &tpath)?;
        if !seen.insert(alias.to_string()) {
            return Err(invalid(
                &format!("{}.alias", tpath),
                &format!("duplicate target alias '{}'", alias),
            ));
        }
        if require_bool(target, &tpath, "isScratchOrg")? {
            require_str(target, &tpath, "scratchDefJson")?;
        }
    }
    Ok(())
}

/// JSON Schema of the recipe document.
pub fn recipe_schema() -> Result<String, WrappedError> {
    let schema = schemars::schema_for!(RecipeDocument);
    Ok(serde_json::to_string_pretty(&schema)?)
}

// -- key helpers --

fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn missing(path: &str) -> WrappedError {
    WrappedError::validation(
        "MissingRecipeKey",
        format!("required key '{}' is missing", path),
    )
}

fn invalid(path: &str, why: &str) -> WrappedError {
    WrappedError::validation("InvalidRecipeKey", format!("'{}': {}", path, why))
}

fn require<'a>(
    obj: &'a Map<String, Value>,
    parent: &str,
    key: &str,
) -> Result<&'a Value, WrappedError> {
    obj.get(key).ok_or_else(|| missing(&key_path(parent, key)))
}

fn require_str<'a>(
    obj: &'a Map<String, Value>,
    parent: &str,
    key: &str,
) -> Result<&'a str, WrappedError> {
    match require(obj, parent, key)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::String(_) => Err(invalid(&key_path(parent, key), "must not be empty")),
        _ => Err(invalid(&key_path(parent, key), "must be a string")),
    }
}

fn require_alias<'a>(obj: &'a Map<String, Value>, parent: &str) -> Result<&'a str, WrappedError> {
    let alias = require_str(obj, parent, "alias")?;
    if !ALIAS_RE.is_match(alias) {
        return Err(invalid(
            &key_path(parent, "alias"),
            &format!("'{}' is not a valid alias (letters, digits, '-', '_', '.')", alias),
        ));
    }
    Ok(alias)
}

fn require_bool(obj: &Map<String, Value>, parent: &str, key: &str) -> Result<bool, WrappedError> {
    require(obj, parent, key)?
        .as_bool()
        .ok_or_else(|| invalid(&key_path(parent, key), "must be a boolean"))
}

fn require_array<'a>(
    obj: &'a Map<String, Value>,
    parent: &str,
    key: &str,
) -> Result<&'a Vec<Value>, WrappedError> {
    require(obj, parent, key)?
        .as_array()
        .ok_or_else(|| invalid(&key_path(parent, key), "must be a list"))
}

fn require_object<'a>(
    obj: &'a Map<String, Value>,
    parent: &str,
    key: &str,
) -> Result<&'a Map<String, Value>, WrappedError> {
    require(obj, parent, key)?
        .as_object()
        .ok_or_else(|| invalid(&key_path(parent, key), "must be an object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCategory;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "schemaVersion": "1.0",
            "recipeName": "Demo Build",
            "recipeStepGroups": [
                {
                    "stepGroupName": "Setup",
                    "alias": "setup",
                    "description": "Base metadata",
                    "recipeSteps": [
                        {"stepName": "Deploy base", "action": "deploy-metadata", "options": {"mdapiSource": "mdapi/base"}}
                    ]
                },
                {
                    "stepGroupName": "Data load",
                    "alias": "data-load",
                    "recipeSteps": [
                        {"stepName": "Import accounts", "action": "import-data", "options": {"plan": "data/plan.json"}}
                    ]
                }
            ],
            "options": {
                "targetOrgs": [
                    {"orgName": "Scratch", "alias": "demo-scratch", "isScratchOrg": true, "scratchDefJson": "config/scratch.json"},
                    {"orgName": "Sandbox", "alias": "demo-sandbox", "isScratchOrg": false}
                ],
                "skipGroups": [],
                "skipActions": [],
                "haltOnError": true,
                "noCustomInstall": false
            }
        })
    }

    fn expect_err(raw: Value) -> WrappedError {
        let err = validate_document(&raw).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
        err
    }

    #[test]
    fn test_df004_valid_document() {
        let doc = validate_document(&valid()).unwrap();
        assert_eq!(doc.recipe_step_groups.len(), 2);
        assert_eq!(doc.options.target_orgs[0].alias, "demo-scratch");
    }

    #[test]
    fn test_df004_missing_top_level_keys() {
        for key in ["schemaVersion", "recipeStepGroups", "options"] {
            let mut raw = valid();
            raw.as_object_mut().unwrap().remove(key);
            let err = expect_err(raw);
            assert_eq!(err.name, "MissingRecipeKey");
            assert!(err.message.contains(key), "{} not named in {}", key, err.message);
        }
    }

    #[test]
    fn test_df004_missing_option_keys() {
        for key in ["targetOrgs", "haltOnError", "noCustomInstall"] {
            let mut raw = valid();
            raw["options"].as_object_mut().unwrap().remove(key);
            let err = expect_err(raw);
            assert!(err.message.contains(&format!("options.{}", key)));
        }
    }

    #[test]
    fn test_df004_missing_step_key_named_by_path() {
        let mut raw = valid();
        raw["recipeStepGroups"][1]["recipeSteps"][0]
            .as_object_mut()
            .unwrap()
            .remove("action");
        let err = expect_err(raw);
        assert!(err
            .message
            .contains("recipeStepGroups[1].recipeSteps[0].action"));
    }

    #[test]
    fn test_df004_step_options_must_be_object() {
        let mut raw = valid();
        raw["recipeStepGroups"][0]["recipeSteps"][0]["options"] = json!("nope");
        let err = expect_err(raw);
        assert_eq!(err.name, "InvalidRecipeKey");
        assert!(err.message.contains("options"));
    }

    #[test]
    fn test_df004_scratch_target_needs_definition() {
        let mut raw = valid();
        raw["options"]["targetOrgs"][0]
            .as_object_mut()
            .unwrap()
            .remove("scratchDefJson");
        let err = expect_err(raw);
        assert!(err.message.contains("options.targetOrgs[0].scratchDefJson"));
    }

    #[test]
    fn test_df004_duplicate_group_alias() {
        let mut raw = valid();
        raw["recipeStepGroups"][1]["alias"] = json!("setup");
        let err = expect_err(raw);
        assert!(err.message.contains("duplicate step group alias"));
    }

    #[test]
    fn test_df004_bad_alias_characters() {
        let mut raw = valid();
        raw["recipeStepGroups"][0]["alias"] = json!("has space");
        let err = expect_err(raw);
        assert!(err.message.contains("not a valid alias"));
    }

    #[test]
    fn test_df004_unsupported_version() {
        let mut raw = valid();
        raw["schemaVersion"] = json!("2.0");
        let err = expect_err(raw);
        assert!(err.message.contains("unsupported schema version"));
    }

    #[test]
    fn test_df004_empty_targets() {
        let mut raw = valid();
        raw["options"]["targetOrgs"] = json!([]);
        let err = expect_err(raw);
        assert!(err.message.contains("at least one target"));
    }

    #[test]
    fn test_df004_skip_lists_must_be_strings() {
        let mut raw = valid();
        raw["options"]["skipGroups"] = json!([1, 2]);
        let err = expect_err(raw);
        assert!(err.message.contains("options.skipGroups"));
    }

    #[test]
    fn test_df004_not_an_object() {
        let err = expect_err(json!([1, 2, 3]));
        assert!(err.message.contains("<root>"));
    }

    #[test]
    fn test_df004_load_json_and_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("recipe.json");
        std::fs::write(&json_path, serde_json::to_string(&valid()).unwrap()).unwrap();
        let yaml_path = dir.path().join("recipe.yaml");
        std::fs::write(&yaml_path, serde_yaml_ng::to_string(&valid()).unwrap()).unwrap();

        let from_json = load_recipe(&json_path).unwrap();
        let from_yaml = load_recipe(&yaml_path).unwrap();
        assert_eq!(from_json, from_yaml);
        validate_document(&from_yaml).unwrap();
    }

    #[test]
    fn test_df004_load_missing_file() {
        let err = load_recipe(Path::new("/nonexistent/recipe.json")).unwrap_err();
        assert_eq!(err.name, "RecipeNotReadable");
    }

    #[test]
    fn test_df004_parse_invalid_json() {
        let err = parse_recipe_json("{not json").unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
    }

    #[test]
    fn test_df004_schema_mentions_fields() {
        let schema = recipe_schema().unwrap();
        assert!(schema.contains("recipeStepGroups"));
        assert!(schema.contains("noCustomInstall"));
    }
}
