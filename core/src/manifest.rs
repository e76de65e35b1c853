use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::VisibilityEngine;
use crate::error::{EngineError, TargetKind};
use crate::form::{FieldGroup, FlagId, Form, FormInput, GroupId, InputId};
use crate::policy::{GroupRule, TriggerValues, VisibilityPolicy};

/// Visibility metadata for one page, as extracted from its markup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageManifest {
    #[serde(default)]
    pub inputs: Vec<FormInput>,
    #[serde(default)]
    pub groups: Vec<GroupDeclaration>,
    #[serde(default)]
    pub flags: Vec<FlagDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDeclaration {
    #[serde(flatten)]
    pub group: FieldGroup,
    /// Groups without a policy are plain containers (e.g. for nesting)
    #[serde(default)]
    pub policy: Option<VisibilityPolicy>,
    #[serde(default)]
    pub clear_on_hide: bool,
    #[serde(default)]
    pub overridden_by: Option<FlagId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagDeclaration {
    pub id: FlagId,
    pub input: InputId,
    pub exclusive: TriggerValues,
}

/// A declaration that could not be wired up. The page still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestIssue {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
}

impl ManifestIssue {
    fn from_error(err: &EngineError, group: Option<&str>) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            group: group.map(str::to_string),
        }
    }
}

impl PageManifest {
    pub fn from_json_str(raw: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Build an engine from the declarations. Broken declarations are
    /// reported and skipped; the remaining rules are still registered.
    pub fn into_engine(self) -> (VisibilityEngine, Vec<ManifestIssue>) {
        let mut form = Form::new();
        for input in self.inputs {
            form.add_input(input);
        }
        let mut rules = Vec::new();
        for decl in self.groups {
            if let Some(policy) = decl.policy {
                let mut rule = GroupRule::new(policy);
                rule.clear_on_hide = decl.clear_on_hide;
                rule.overridden_by = decl.overridden_by;
                rules.push((decl.group.id.clone(), rule));
            }
            form.add_group(decl.group);
        }

        let mut engine = VisibilityEngine::new(form);
        let mut issues = Vec::new();

        for flag in self.flags {
            let id = flag.id.clone();
            if let Err(err) = engine.register_flag(flag.id, flag.input, flag.exclusive) {
                tracing::warn!(flag = %id, error = %err, "skipping override flag");
                issues.push(ManifestIssue::from_error(&err, None));
            }
        }

        for (group, rule) in rules {
            if let Some(input) = rule.policy.controlling_input() {
                if engine.form().input(input).is_none() {
                    issues.push(ManifestIssue::from_error(
                        &EngineError::PolicyTargetMissing {
                            target: TargetKind::Input,
                            id: input.to_string(),
                        },
                        Some(&group),
                    ));
                }
            }
            let flagged = match &rule.policy {
                VisibilityPolicy::ShowWhenFlagged { flag } => Some(flag),
                _ => None,
            };
            for flag in [flagged, rule.overridden_by.as_ref()].into_iter().flatten() {
                if engine.flag_active(flag).is_none() {
                    issues.push(ManifestIssue::from_error(
                        &EngineError::PolicyTargetMissing {
                            target: TargetKind::Flag,
                            id: flag.clone(),
                        },
                        Some(&group),
                    ));
                }
            }
            if let Err(err) = engine.register_policy(group.clone(), rule) {
                tracing::warn!(group = %group, error = %err, "skipping visibility policy");
                issues.push(ManifestIssue::from_error(&err, Some(&group)));
            }
        }

        (engine, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::PageManifest;
    use crate::error::codes;
    use crate::form::InputChange;

    const CAR_BENEFIT: &str = r#"{
        "inputs": [
            {"id": "fuelType", "kind": "choice", "options": ["petrol", "diesel", "electricity"], "selected": "electricity"},
            {"id": "co2Figure", "kind": "text", "value": "95"},
            {"id": "co2NoFigure", "kind": "toggle", "value": "true"}
        ],
        "groups": [
            {
                "id": "co2",
                "members": ["co2Figure", "co2NoFigure"],
                "policy": {"show_when_value_in": {"input": "fuelType", "allowed": "petrol,diesel"}},
                "overridden_by": "electric"
            },
            {"id": "electricInfo", "visible": false, "policy": {"show_when_flagged": {"flag": "electric"}}}
        ],
        "flags": [
            {"id": "electric", "input": "fuelType", "exclusive": ["electricity"]}
        ]
    }"#;

    #[test]
    fn manifest_builds_a_consistent_engine() {
        let manifest = PageManifest::from_json_str(CAR_BENEFIT).expect("manifest should parse");
        let (mut engine, issues) = manifest.into_engine();
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");

        engine.initialize_from_server_state();
        assert_eq!(engine.is_visible("co2"), Some(false));
        assert_eq!(engine.is_visible("electricInfo"), Some(true));
        assert!(engine.form().input("co2Figure").expect("input").is_empty());

        engine.on_controlling_input_changed(
            "fuelType",
            InputChange::Selected(Some("diesel".to_string())),
        );
        assert_eq!(engine.is_visible("co2"), Some(true));
        assert_eq!(engine.is_visible("electricInfo"), Some(false));
    }

    #[test]
    fn broken_declarations_become_issues() {
        let manifest = PageManifest::from_json_str(
            r#"{
                "inputs": [{"id": "hasCar", "kind": "toggle", "value": "yes"}],
                "groups": [
                    {"id": "car", "policy": {"show_when_checked": {"input": "hasVan"}}},
                    {"id": "van", "policy": {"show_when_flagged": {"flag": "fleet"}}}
                ],
                "flags": [{"id": "fleet", "input": "fleetSize", "exclusive": "many"}]
            }"#,
        )
        .expect("manifest should parse");
        let (engine, issues) = manifest.into_engine();

        assert_eq!(issues.len(), 3, "issues: {issues:?}");
        assert!(issues.iter().all(|i| i.code == codes::POLICY_TARGET_MISSING));
        assert_eq!(engine.evaluate("car"), None);
        assert_eq!(engine.evaluate("van"), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = PageManifest::from_json_str("{\"inputs\": 3}").expect_err("should fail");
        assert_eq!(err.code(), codes::INVALID_MANIFEST);
    }
}
