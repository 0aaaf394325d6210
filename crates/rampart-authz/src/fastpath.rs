//! Fixed-shape evaluation strategy.
//!
//! Assumes the policy rows are exactly `[sub, res, act, obj, eft]` and that
//! the matcher reduces to "role links AND object segment-match", which the
//! pre-filter plus a direct object comparison already cover. Skips the
//! expression interpreter entirely; a matching `deny` row settles the item
//! immediately.
//!
//! Shape compatibility is validated when the enforcer loads a model with
//! this strategy configured; the checks here only guard against rows that
//! would otherwise index out of bounds.

use crate::errors::{AuthzError, AuthzResult};
use crate::matcher::key_segment_match;
use crate::model::PolicyModel;

const REQUEST_ARITY: usize = 4;
const POLICY_ARITY: usize = 5;
const OBJ_INDEX: usize = 3;
const EFT_INDEX: usize = 4;

/// Decide one item against the filtered rows.
///
/// The request tuple is `[subject, resource, action, item]`; a model
/// declaring any other request arity cannot be evaluated on this path.
pub(crate) fn evaluate_item(model: &PolicyModel, item: &str, rows: &[usize]) -> AuthzResult<bool> {
    if model.request_keys().len() != REQUEST_ARITY {
        return Err(AuthzError::RequestArityMismatch {
            expected: model.request_keys().len(),
            actual: REQUEST_ARITY,
        });
    }

    let mut allowed = false;
    for &row_index in rows {
        let row = &model.policies()[row_index];
        if row.len() != POLICY_ARITY {
            return Err(AuthzError::PolicyArityMismatch {
                row: row_index,
                expected: POLICY_ARITY,
                actual: row.len(),
            });
        }
        if !key_segment_match(item, &row[OBJ_INDEX]) {
            continue;
        }
        match row[EFT_INDEX].as_str() {
            "allow" => allowed = true,
            // Deny is absolute on this path; no later row can undo it.
            "deny" => return Ok(false),
            _ => {}
        }
    }
    Ok(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDefinition, DEFAULT_MODEL};
    use crate::source::ModelSnapshot;

    fn model(snapshot: ModelSnapshot) -> PolicyModel {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL).expect("definition");
        PolicyModel::build(&definition, &snapshot).expect("model")
    }

    #[test]
    fn empty_row_set_denies() {
        let model = model(ModelSnapshot::new());
        assert!(!evaluate_item(&model, "demo-team/staging/app", &[]).expect("eval"));
    }

    #[test]
    fn wildcard_object_allows() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:admin", "application", "get", "demo-team/*/*", "allow"])
                .grouping("u1", "role:admin"),
        );

        assert!(evaluate_item(&model, "demo-team/staging/app", &[0]).expect("eval"));
        assert!(!evaluate_item(&model, "other-team/staging/app", &[0]).expect("eval"));
    }

    #[test]
    fn deny_row_short_circuits_over_later_allow() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:admin", "application", "get", "app1", "deny"])
                .policy(&["role:admin", "application", "get", "*", "allow"])
                .grouping("u1", "role:admin"),
        );

        assert!(!evaluate_item(&model, "app1", &[0, 1]).expect("eval"));
        assert!(evaluate_item(&model, "app2", &[0, 1]).expect("eval"));
    }

    #[test]
    fn allow_then_deny_still_denies() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:admin", "application", "get", "*", "allow"])
                .policy(&["role:admin", "application", "get", "app1", "deny"])
                .grouping("u1", "role:admin"),
        );

        assert!(!evaluate_item(&model, "app1", &[0, 1]).expect("eval"));
    }

    #[test]
    fn unknown_effect_value_is_inconclusive() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:admin", "application", "get", "*", "audit"])
                .grouping("u1", "role:admin"),
        );

        assert!(!evaluate_item(&model, "app1", &[0]).expect("eval"));
    }
}
