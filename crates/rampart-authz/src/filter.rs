//! Policy pre-filter run once per batch call.

use crate::matcher::key_segment_match;
use crate::model::PolicyModel;

/// Indices of the policy rows that can produce a conclusive effect for
/// `(subject, resource, action)`, in row order, duplicates preserved.
///
/// Row positions are fixed by model convention: role, resource and action
/// lead every policy row. Role membership goes through the primary grouping
/// relation; with no relation declared, only rows naming the subject
/// directly apply.
pub(crate) fn filter_policies(
    subject: &str,
    resource: &str,
    action: &str,
    model: &PolicyModel,
) -> Vec<usize> {
    let graph = model.primary_relation();
    model
        .policies()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            let role_linked = match graph {
                Some(graph) => graph.has_link(subject, &row[0]),
                None => row[0] == subject,
            };
            role_linked
                && key_segment_match(action, &row[2])
                && key_segment_match(resource, &row[1])
        })
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDefinition, PolicyModel, DEFAULT_MODEL};
    use crate::source::ModelSnapshot;

    fn model(snapshot: ModelSnapshot) -> PolicyModel {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL).expect("definition");
        PolicyModel::build(&definition, &snapshot).expect("model")
    }

    #[test]
    fn keeps_only_rows_the_subject_is_linked_to() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:admin", "application", "get", "*", "allow"])
                .policy(&["role:auditor", "application", "get", "*", "allow"])
                .grouping("u1", "role:admin"),
        );

        assert_eq!(filter_policies("u1", "application", "get", &model), vec![0]);
        assert!(filter_policies("u2", "application", "get", &model).is_empty());
    }

    #[test]
    fn resource_and_action_match_segment_wise() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:admin", "application", "get", "*", "allow"])
                .policy(&["role:admin", "environment", "get", "*", "allow"])
                .policy(&["role:admin", "*", "trigger", "*", "allow"])
                .grouping("u1", "role:admin"),
        );

        assert_eq!(
            filter_policies("u1", "environment", "get", &model),
            vec![1]
        );
        assert_eq!(
            filter_policies("u1", "environment", "trigger", &model),
            vec![2]
        );
        assert!(filter_policies("u1", "environment", "delete", &model).is_empty());
    }

    #[test]
    fn preserves_row_order_and_duplicates() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:admin", "application", "get", "a", "allow"])
                .policy(&["role:admin", "application", "get", "b", "deny"])
                .policy(&["role:admin", "application", "get", "a", "allow"])
                .grouping("u1", "role:admin"),
        );

        assert_eq!(
            filter_policies("u1", "application", "get", &model),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn transitive_role_links_apply() {
        let model = model(
            ModelSnapshot::new()
                .policy(&["role:viewer", "application", "get", "*", "allow"])
                .grouping("u1", "role:team-lead")
                .grouping("role:team-lead", "role:viewer"),
        );

        assert_eq!(filter_policies("u1", "application", "get", &model), vec![0]);
    }
}
