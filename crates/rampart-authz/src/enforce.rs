//! Batch enforcement root.
//!
//! # Purpose
//! [`Enforcer`] owns the loaded [`PolicyModel`] and answers, for one subject
//! and many resource objects, which objects the subject may act on for a
//! `(resource, action)` pair. Policies are filtered once per batch; each
//! item then runs through the configured matcher strategy and the model's
//! effect rule.
//!
//! # Key invariants
//! - The model reference swaps atomically on reload; an in-flight batch
//!   keeps the model it started with.
//! - Results align 1:1 with the input items, empty input included.
//! - Evaluation faults surface as errors, never as an all-deny result.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::{EnforcerConfig, MatcherStrategy};
use crate::effect::{Effect, EffectScan};
use crate::errors::{AuthzError, AuthzResult};
use crate::expr::{decide, evaluate, FunctionTable, MatcherScope};
use crate::fastpath;
use crate::filter::filter_policies;
use crate::model::{ModelDefinition, PolicyModel, DEFAULT_MODEL};
use crate::source::{ModelSnapshot, PolicySource};

/// Process-wide authorization handle.
///
/// Constructed once at startup and shared by cloning; all clones observe the
/// same model and the same reloads. There is no global state behind it.
#[derive(Clone)]
pub struct Enforcer {
    inner: Arc<EnforcerInner>,
}

struct EnforcerInner {
    definition: ModelDefinition,
    config: EnforcerConfig,
    source: Box<dyn PolicySource>,
    model: RwLock<Arc<PolicyModel>>,
}

impl Enforcer {
    /// Build an enforcer from a model definition, loading the initial
    /// snapshot from `source`. Fails loudly on any configuration fault:
    /// malformed model text, unparseable matcher, unknown effect rule, or a
    /// model incompatible with the configured strategy.
    pub fn new(
        definition: ModelDefinition,
        source: impl PolicySource + 'static,
        config: EnforcerConfig,
    ) -> AuthzResult<Self> {
        let source: Box<dyn PolicySource> = Box::new(source);
        let snapshot = source.load()?;
        let model = build_model(&definition, &config, &snapshot)?;
        Ok(Self {
            inner: Arc::new(EnforcerInner {
                definition,
                config,
                source,
                model: RwLock::new(Arc::new(model)),
            }),
        })
    }

    /// Convenience constructor using the control plane's default model.
    pub fn with_default_model(
        source: impl PolicySource + 'static,
        config: EnforcerConfig,
    ) -> AuthzResult<Self> {
        let definition = ModelDefinition::from_conf_str(DEFAULT_MODEL)?;
        Self::new(definition, source, config)
    }

    /// Pull a fresh snapshot from the policy source, build and validate a
    /// new model, and swap it in atomically. Readers see either the old
    /// model or the new one, never a mix; a failed reload leaves the old
    /// model in place.
    pub fn reload(&self) -> AuthzResult<()> {
        let snapshot = self.inner.source.load()?;
        let model = build_model(&self.inner.definition, &self.inner.config, &snapshot)?;
        *self
            .inner
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(model);
        Ok(())
    }

    /// Single-object permission check; a batch of one.
    pub fn enforce(
        &self,
        subject: &str,
        resource: &str,
        action: &str,
        object: &str,
    ) -> AuthzResult<bool> {
        let object = object.to_string();
        let results = self.run_batch(subject, resource, action, std::slice::from_ref(&object))?;
        Ok(results.first().copied().unwrap_or(false))
    }

    /// Primary batch contract: one decision per distinct item, keyed by the
    /// item string. Duplicate items collapse to a single key.
    pub fn enforce_in_batch(
        &self,
        subject: &str,
        resource: &str,
        action: &str,
        items: &[String],
    ) -> AuthzResult<HashMap<String, bool>> {
        let results = self.run_batch(subject, resource, action, items)?;
        Ok(items
            .iter()
            .cloned()
            .zip(results)
            .collect())
    }

    /// Positional batch variant: result `i` answers for `items[i]`,
    /// duplicates preserved.
    pub fn enforce_many(
        &self,
        subject: &str,
        resource: &str,
        action: &str,
        items: &[String],
    ) -> AuthzResult<Vec<bool>> {
        self.run_batch(subject, resource, action, items)
    }

    /// Every role the subject holds through the primary grouping relation,
    /// directly or transitively.
    pub fn implicit_roles(&self, subject: &str) -> Vec<String> {
        let model = self.current_model();
        match model.primary_relation() {
            Some(graph) => graph.implicit_roles(subject),
            None => Vec::new(),
        }
    }

    /// Policy rows whose role the subject holds, for debugging and
    /// token-minting callers. Rows are returned in policy order.
    pub fn effective_policies(&self, subject: &str) -> Vec<Vec<String>> {
        let model = self.current_model();
        model
            .policies()
            .iter()
            .filter(|row| match model.primary_relation() {
                Some(graph) => graph.has_link(subject, &row[0]),
                None => row[0] == subject,
            })
            .cloned()
            .collect()
    }

    fn current_model(&self) -> Arc<PolicyModel> {
        self.inner
            .model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn run_batch(
        &self,
        subject: &str,
        resource: &str,
        action: &str,
        items: &[String],
    ) -> AuthzResult<Vec<bool>> {
        let started = Instant::now();
        let model = self.current_model();
        let strategy = self.inner.config.strategy;

        // Evaluation is pure computation, but a latent bug must not take the
        // process down with it; convert any panic into a reported error.
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if self.inner.config.batch_enabled {
                let rows = filter_policies(subject, resource, action, &model);
                items
                    .iter()
                    .map(|item| evaluate_item(&model, strategy, subject, resource, action, item, &rows))
                    .collect::<AuthzResult<Vec<bool>>>()
            } else {
                // Escape hatch: naive per-item enforcement, re-filtering for
                // every item. Same decisions, no batch amortization.
                items
                    .iter()
                    .map(|item| {
                        let rows = filter_policies(subject, resource, action, &model);
                        evaluate_item(&model, strategy, subject, resource, action, item, &rows)
                    })
                    .collect::<AuthzResult<Vec<bool>>>()
            }
        }));

        let results = match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => {
                tracing::warn!(
                    subject,
                    resource,
                    action,
                    error = %err,
                    "batch enforcement failed"
                );
                metrics::counter!("rampart_enforce_batches_total", "result" => "error")
                    .increment(1);
                return Err(err);
            }
            Err(_) => {
                tracing::error!(subject, resource, action, "policy evaluation panicked");
                metrics::counter!("rampart_enforce_batches_total", "result" => "panic")
                    .increment(1);
                return Err(AuthzError::EvaluationPanic {
                    subject: subject.to_string(),
                    resource: resource.to_string(),
                    action: action.to_string(),
                });
            }
        };

        let elapsed = started.elapsed();
        let allowed = results.iter().filter(|&&granted| granted).count();
        tracing::debug!(
            subject,
            resource,
            action,
            requested = items.len(),
            allowed,
            elapsed_us = elapsed.as_micros() as u64,
            "batch enforcement complete"
        );
        metrics::counter!("rampart_enforce_batches_total", "result" => "ok").increment(1);
        metrics::counter!("rampart_enforce_items_total").increment(items.len() as u64);
        metrics::histogram!("rampart_enforce_batch_seconds").record(elapsed.as_secs_f64());

        Ok(results)
    }
}

fn build_model(
    definition: &ModelDefinition,
    config: &EnforcerConfig,
    snapshot: &ModelSnapshot,
) -> AuthzResult<PolicyModel> {
    let model = PolicyModel::build(definition, snapshot)?;
    if config.strategy == MatcherStrategy::FastPath && !model.fastpath_compatible() {
        return Err(AuthzError::PolicyShapeMismatch {
            actual: model.policy_token_names(),
        });
    }
    Ok(model)
}

fn evaluate_item(
    model: &PolicyModel,
    strategy: MatcherStrategy,
    subject: &str,
    resource: &str,
    action: &str,
    item: &str,
    rows: &[usize],
) -> AuthzResult<bool> {
    match strategy {
        MatcherStrategy::Expression => {
            expression_item(model, subject, resource, action, item, rows)
        }
        MatcherStrategy::FastPath => fastpath::evaluate_item(model, item, rows),
    }
}

/// Expression-strategy decision for one item: bind the request tuple, walk
/// the filtered rows through the compiled matcher, merge effects under the
/// model's rule. With no applicable rows the matcher runs once against an
/// all-empty policy tuple, which in practice resolves to deny.
fn expression_item(
    model: &PolicyModel,
    subject: &str,
    resource: &str,
    action: &str,
    item: &str,
    rows: &[usize],
) -> AuthzResult<bool> {
    let request_values = model.request_values(subject, resource, action, item);
    let functions = FunctionTable::new(model.relations());
    let mut scan = EffectScan::new(model.effect_rule());

    if rows.is_empty() {
        let empty: Vec<String> = vec![String::new(); model.policy_keys().len()];
        let mut scope = MatcherScope::new(model.request_keys(), &request_values, model.policy_keys())?;
        scope.bind_policy_row(0, &empty)?;
        let matched = decide(&evaluate(model.matcher(), &scope, &functions)?)?;
        scan.push(if matched {
            Effect::Allow
        } else {
            Effect::Indeterminate
        });
        return Ok(scan.finish());
    }

    let mut scope = MatcherScope::new(model.request_keys(), &request_values, model.policy_keys())?;
    for &row_index in rows {
        let row = &model.policies()[row_index];
        scope.bind_policy_row(row_index, row)?;
        let matched = decide(&evaluate(model.matcher(), &scope, &functions)?)?;
        if scan.push(model.row_effect(row, matched)) {
            break;
        }
    }
    Ok(scan.finish())
}
