//! Model definition parsing and the loaded policy model.
//!
//! # Purpose
//! Turns the embedded INI-style model text plus a policy snapshot into an
//! immutable, pre-validated [`PolicyModel`]: tokens resolved, matcher
//! compiled, effect rule parsed, role graphs built. Every configuration
//! fault is caught here, loudly, before the first enforcement call.
//!
//! # Key invariants
//! - A built model never changes; reloads build a fresh one and swap it in.
//! - Policy rows always have exactly as many values as declared tokens.
//! - The matcher references only declared tokens and registered functions.

use std::collections::BTreeMap;

use crate::effect::{Effect, EffectRule};
use crate::errors::{AuthzError, AuthzResult};
use crate::expr::{parse_matcher, validate_matcher, Expr};
use crate::role::RoleGraph;
use crate::source::ModelSnapshot;

/// Model shipped with the control plane: role-linked subjects, segment-wise
/// resource/action/object matching, deny overrides allow.
pub const DEFAULT_MODEL: &str = r#"
# Default authorization model for the Rampart control plane.
[request_definition]
r = sub, res, act, obj

[policy_definition]
p = sub, res, act, obj, eft

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow)) && !some(where (p.eft == deny))

[matchers]
m = g(r.sub, p.sub) && keyMatch(r.res, p.res) && keyMatch(r.act, p.act) && keyMatch(r.obj, p.obj)
"#;

/// Request tokens the engine knows how to fill from an enforcement call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestSlot {
    Subject,
    Resource,
    Action,
    Object,
}

impl RequestSlot {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "sub" => Some(RequestSlot::Subject),
            "res" => Some(RequestSlot::Resource),
            "act" => Some(RequestSlot::Action),
            "obj" => Some(RequestSlot::Object),
            _ => None,
        }
    }
}

/// Parsed form of the model text, before policies are attached.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    request_tokens: Vec<String>,
    policy_tokens: Vec<String>,
    relation_names: Vec<String>,
    effect_rule: String,
    matcher: String,
}

impl ModelDefinition {
    /// Parse the INI-style model text.
    ///
    /// Recognized sections: `request_definition` (key `r`),
    /// `policy_definition` (key `p`), `role_definition` (keys starting with
    /// `g`, arity two), `policy_effect` (key `e`), `matchers` (key `m`).
    /// Lines starting with `#` are comments.
    pub fn from_conf_str(text: &str) -> AuthzResult<Self> {
        let mut section: Option<&str> = None;
        let mut request_tokens: Option<Vec<String>> = None;
        let mut policy_tokens: Option<Vec<String>> = None;
        let mut relation_names: Vec<String> = Vec::new();
        let mut effect_rule: Option<String> = None;
        let mut matcher: Option<String> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(match name {
                    "request_definition" => "r",
                    "policy_definition" => "p",
                    "role_definition" => "g",
                    "policy_effect" => "e",
                    "matchers" => "m",
                    other => {
                        return Err(AuthzError::MalformedModel(format!(
                            "unknown section [{other}]"
                        )));
                    }
                });
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(AuthzError::MalformedModel(format!(
                    "expected 'key = value', got '{line}'"
                )));
            };
            let key = key.trim();
            let value = value.trim();

            match section {
                Some("r") if key == "r" => {
                    set_once(&mut request_tokens, split_tokens(value), key)?;
                }
                Some("p") if key == "p" => {
                    set_once(&mut policy_tokens, split_tokens(value), key)?;
                }
                Some("g") if key.starts_with('g') => {
                    let arity = split_tokens(value).len();
                    if arity != 2 {
                        return Err(AuthzError::MalformedModel(format!(
                            "relation {key} must have arity two, got {arity}"
                        )));
                    }
                    if relation_names.iter().any(|name| name == key) {
                        return Err(AuthzError::MalformedModel(format!(
                            "duplicate relation {key}"
                        )));
                    }
                    relation_names.push(key.to_string());
                }
                Some("e") if key == "e" => {
                    set_once(&mut effect_rule, value.to_string(), key)?;
                }
                Some("m") if key == "m" => {
                    set_once(&mut matcher, value.to_string(), key)?;
                }
                Some(_) => {
                    return Err(AuthzError::MalformedModel(format!(
                        "unexpected key '{key}' in section"
                    )));
                }
                None => {
                    return Err(AuthzError::MalformedModel(format!(
                        "key '{key}' outside any section"
                    )));
                }
            }
        }

        let definition = Self {
            request_tokens: request_tokens.ok_or_else(|| {
                AuthzError::MalformedModel("missing [request_definition]".to_string())
            })?,
            policy_tokens: policy_tokens.ok_or_else(|| {
                AuthzError::MalformedModel("missing [policy_definition]".to_string())
            })?,
            relation_names,
            effect_rule: effect_rule.ok_or_else(|| {
                AuthzError::MalformedModel("missing [policy_effect]".to_string())
            })?,
            matcher: matcher
                .ok_or_else(|| AuthzError::MalformedModel("missing [matchers]".to_string()))?,
        };
        definition.validate_tokens()?;
        Ok(definition)
    }

    fn validate_tokens(&self) -> AuthzResult<()> {
        if self.request_tokens.is_empty() {
            return Err(AuthzError::MalformedModel(
                "request definition declares no tokens".to_string(),
            ));
        }
        for token in &self.request_tokens {
            if RequestSlot::from_token(token).is_none() {
                return Err(AuthzError::MalformedModel(format!(
                    "unknown request token '{token}', expected sub, res, act or obj"
                )));
            }
        }
        if has_duplicates(&self.request_tokens) {
            return Err(AuthzError::MalformedModel(
                "duplicate request token".to_string(),
            ));
        }

        // Policy rows lead with role, resource and action; the pre-filter
        // depends on those fixed positions.
        let leading: Vec<&str> = self.policy_tokens.iter().take(3).map(String::as_str).collect();
        if leading != ["sub", "res", "act"] {
            return Err(AuthzError::MalformedModel(format!(
                "policy definition must start with sub, res, act; got {}",
                self.policy_tokens.join(", ")
            )));
        }
        for token in self.policy_tokens.iter().skip(3) {
            if token != "obj" && token != "eft" {
                return Err(AuthzError::MalformedModel(format!(
                    "unknown policy token '{token}'"
                )));
            }
        }
        if has_duplicates(&self.policy_tokens) {
            return Err(AuthzError::MalformedModel(
                "duplicate policy token".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_tokens(&self) -> &[String] {
        &self.request_tokens
    }

    pub fn policy_tokens(&self) -> &[String] {
        &self.policy_tokens
    }
}

fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn set_once<T>(slot: &mut Option<T>, value: T, key: &str) -> AuthzResult<()> {
    if slot.is_some() {
        return Err(AuthzError::MalformedModel(format!("duplicate key '{key}'")));
    }
    *slot = Some(value);
    Ok(())
}

fn has_duplicates(tokens: &[String]) -> bool {
    tokens
        .iter()
        .enumerate()
        .any(|(i, token)| tokens[..i].contains(token))
}

/// Fully loaded, validated and compiled policy model.
///
/// Immutable after [`PolicyModel::build`]; shared read-only across
/// concurrent batch evaluations.
#[derive(Debug)]
pub struct PolicyModel {
    request_slots: Vec<RequestSlot>,
    request_keys: Vec<String>,
    policy_keys: Vec<String>,
    policies: Vec<Vec<String>>,
    matcher: Expr,
    effect_rule: EffectRule,
    relations: BTreeMap<String, RoleGraph>,
    eft_index: Option<usize>,
    fastpath_compatible: bool,
}

impl PolicyModel {
    /// Build a model from its definition and a policy snapshot, validating
    /// everything that would otherwise surface mid-enforcement.
    pub fn build(definition: &ModelDefinition, snapshot: &ModelSnapshot) -> AuthzResult<Self> {
        let request_slots: Vec<RequestSlot> = definition
            .request_tokens
            .iter()
            .map(|token| {
                RequestSlot::from_token(token)
                    .expect("request tokens validated by ModelDefinition")
            })
            .collect();
        let request_keys: Vec<String> = definition
            .request_tokens
            .iter()
            .map(|token| format!("r_{token}"))
            .collect();
        let policy_keys: Vec<String> = definition
            .policy_tokens
            .iter()
            .map(|token| format!("p_{token}"))
            .collect();

        for (row, values) in snapshot.policies.iter().enumerate() {
            if values.len() != definition.policy_tokens.len() {
                return Err(AuthzError::PolicyArityMismatch {
                    row,
                    expected: definition.policy_tokens.len(),
                    actual: values.len(),
                });
            }
        }

        let mut relations: BTreeMap<String, RoleGraph> = definition
            .relation_names
            .iter()
            .map(|name| (name.clone(), RoleGraph::new()))
            .collect();
        for edge in &snapshot.groupings {
            let Some(graph) = relations.get_mut(&edge.relation) else {
                return Err(AuthzError::MalformedModel(format!(
                    "grouping edge references undeclared relation '{}'",
                    edge.relation
                )));
            };
            graph.add_link(edge.subject.clone(), edge.role.clone());
        }

        let matcher = parse_matcher(&definition.matcher)?;
        validate_matcher(&matcher, &request_keys, &policy_keys, &relations)?;
        let effect_rule = EffectRule::parse(&definition.effect_rule)?;

        let eft_index = definition
            .policy_tokens
            .iter()
            .position(|token| token == "eft");
        let fastpath_compatible = definition.policy_tokens
            == ["sub", "res", "act", "obj", "eft"]
            && effect_rule == EffectRule::SomeAllowAndNoDeny;

        Ok(Self {
            request_slots,
            request_keys,
            policy_keys,
            policies: snapshot.policies.clone(),
            matcher,
            effect_rule,
            relations,
            eft_index,
            fastpath_compatible,
        })
    }

    /// Fill the request tuple in declared token order for one resource item.
    pub(crate) fn request_values<'a>(
        &self,
        subject: &'a str,
        resource: &'a str,
        action: &'a str,
        item: &'a str,
    ) -> Vec<&'a str> {
        self.request_slots
            .iter()
            .map(|slot| match slot {
                RequestSlot::Subject => subject,
                RequestSlot::Resource => resource,
                RequestSlot::Action => action,
                RequestSlot::Object => item,
            })
            .collect()
    }

    /// Per-row effect given whether the matcher matched the row.
    pub(crate) fn row_effect(&self, row: &[String], matched: bool) -> Effect {
        if !matched {
            return Effect::Indeterminate;
        }
        match self.eft_index {
            Some(index) => match row[index].as_str() {
                "allow" => Effect::Allow,
                "deny" => Effect::Deny,
                _ => Effect::Indeterminate,
            },
            None => Effect::Allow,
        }
    }

    pub fn policies(&self) -> &[Vec<String>] {
        &self.policies
    }

    pub fn effect_rule(&self) -> EffectRule {
        self.effect_rule
    }

    /// The primary grouping relation, when the model declares one.
    pub(crate) fn primary_relation(&self) -> Option<&RoleGraph> {
        self.relations.get("g")
    }

    pub(crate) fn relations(&self) -> &BTreeMap<String, RoleGraph> {
        &self.relations
    }

    pub(crate) fn matcher(&self) -> &Expr {
        &self.matcher
    }

    pub(crate) fn request_keys(&self) -> &[String] {
        &self.request_keys
    }

    pub(crate) fn policy_keys(&self) -> &[String] {
        &self.policy_keys
    }

    pub(crate) fn fastpath_compatible(&self) -> bool {
        self.fastpath_compatible
    }

    pub(crate) fn policy_token_names(&self) -> String {
        self.policy_keys
            .iter()
            .map(|key| key.trim_start_matches("p_"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ModelSnapshot;

    fn snapshot() -> ModelSnapshot {
        ModelSnapshot::new()
            .policy(&["role:admin", "application", "get", "*", "allow"])
            .grouping("u1", "role:admin")
    }

    #[test]
    fn default_model_parses_and_builds() {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL).expect("definition");
        assert_eq!(definition.request_tokens(), ["sub", "res", "act", "obj"]);
        assert_eq!(
            definition.policy_tokens(),
            ["sub", "res", "act", "obj", "eft"]
        );

        let model = PolicyModel::build(&definition, &snapshot()).expect("model");
        assert_eq!(model.effect_rule(), EffectRule::SomeAllowAndNoDeny);
        assert!(model.fastpath_compatible());
        assert_eq!(model.policies().len(), 1);
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = ModelDefinition::from_conf_str("[role_manager]\nx = y").expect_err("section");
        assert!(matches!(err, AuthzError::MalformedModel(_)));
    }

    #[test]
    fn missing_matcher_section_is_rejected() {
        let text = "[request_definition]\nr = sub, obj, act\n\
                    [policy_definition]\np = sub, res, act\n\
                    [policy_effect]\ne = some(where (p_eft == allow))";
        let err = ModelDefinition::from_conf_str(text).expect_err("missing matchers");
        assert!(matches!(err, AuthzError::MalformedModel(_)));
    }

    #[test]
    fn unknown_effect_rule_fails_at_build() {
        let text = "[request_definition]\nr = sub, res, act, obj\n\
                    [policy_definition]\np = sub, res, act, obj, eft\n\
                    [role_definition]\ng = _, _\n\
                    [policy_effect]\ne = most(where (p_eft == allow))\n\
                    [matchers]\nm = g(r.sub, p.sub) && keyMatch(r.obj, p.obj)";
        let definition = ModelDefinition::from_conf_str(text).expect("definition");
        let err = PolicyModel::build(&definition, &ModelSnapshot::new()).expect_err("effect");
        assert!(matches!(err, AuthzError::UnknownEffectRule(_)));
    }

    #[test]
    fn short_policy_row_fails_at_build() {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL).expect("definition");
        let snapshot = ModelSnapshot::new().policy(&["role:admin", "application", "get"]);
        let err = PolicyModel::build(&definition, &snapshot).expect_err("arity");
        assert!(matches!(
            err,
            AuthzError::PolicyArityMismatch {
                row: 0,
                expected: 5,
                actual: 3
            }
        ));
    }

    #[test]
    fn matcher_referencing_undeclared_relation_fails_at_build() {
        let text = "[request_definition]\nr = sub, res, act, obj\n\
                    [policy_definition]\np = sub, res, act, obj, eft\n\
                    [policy_effect]\ne = some(where (p_eft == allow))\n\
                    [matchers]\nm = g(r.sub, p.sub) && keyMatch(r.obj, p.obj)";
        let definition = ModelDefinition::from_conf_str(text).expect("definition");
        let err = PolicyModel::build(&definition, &ModelSnapshot::new()).expect_err("relation");
        assert!(matches!(err, AuthzError::UnknownFunction(name) if name == "g"));
    }

    #[test]
    fn grouping_edge_for_undeclared_relation_fails_at_build() {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL).expect("definition");
        let snapshot = ModelSnapshot::new().grouping_in("g2", "u1", "role:admin");
        let err = PolicyModel::build(&definition, &snapshot).expect_err("edge");
        assert!(matches!(err, AuthzError::MalformedModel(_)));
    }

    #[test]
    fn policy_tokens_must_lead_with_sub_res_act() {
        let text = "[request_definition]\nr = sub, obj, act\n\
                    [policy_definition]\np = sub, obj, act\n\
                    [policy_effect]\ne = some(where (p_eft == allow))\n\
                    [matchers]\nm = r.sub == p.sub";
        let err = ModelDefinition::from_conf_str(text).expect_err("layout");
        assert!(matches!(err, AuthzError::MalformedModel(_)));
    }

    #[test]
    fn request_values_follow_declared_token_order() {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL).expect("definition");
        let model = PolicyModel::build(&definition, &snapshot()).expect("model");
        assert_eq!(
            model.request_values("u1", "application", "get", "demo/staging/app"),
            vec!["u1", "application", "get", "demo/staging/app"]
        );
    }

    #[test]
    fn row_effect_maps_eft_column() {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL).expect("definition");
        let model = PolicyModel::build(&definition, &snapshot()).expect("model");
        let allow_row: Vec<String> = ["role:admin", "application", "get", "*", "allow"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let deny_row: Vec<String> = ["role:admin", "application", "get", "*", "deny"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(model.row_effect(&allow_row, true), Effect::Allow);
        assert_eq!(model.row_effect(&deny_row, true), Effect::Deny);
        assert_eq!(model.row_effect(&allow_row, false), Effect::Indeterminate);
    }
}
