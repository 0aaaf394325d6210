//! Batch RBAC policy evaluation engine for the Rampart control plane.
//!
//! # Purpose
//! Answers, for one subject and a large batch of resource objects, which
//! objects the subject may act on for a given `(resource, action)` pair.
//! Policies are pre-filtered once per batch through the role graph, then
//! each item runs through the configured matcher strategy and the model's
//! effect-combination rule.
//!
//! # How it fits
//! Control-plane services construct one [`Enforcer`] at startup from their
//! policy store and share it by handle; REST handlers and bulk listing
//! endpoints call [`Enforcer::enforce_in_batch`] with the object lists they
//! are about to render. Session resolution and policy persistence live in
//! the embedding service, not here.
//!
//! # Key invariants
//! - A loaded model is immutable; reload swaps the whole reference
//!   atomically, so concurrent batches never observe a half-updated model.
//! - Batch results align 1:1 with the input items, in input order.
//! - Configuration faults (malformed matcher, arity mismatch, unknown
//!   effect rule) surface as errors, never as a silent deny-all.
//!
//! # Important configuration
//! - `RAMPART_ENFORCER_STRATEGY` selects `expression` or `fastpath`; the
//!   fast path requires the `[sub, res, act, obj, eft]` policy shape.
//! - `RAMPART_BATCH_ENFORCE` disables the batch-optimized path when set to
//!   a false value, falling back to naive per-item enforcement.
//!
//! # Examples
//! ```rust
//! use rampart_authz::{Enforcer, EnforcerConfig, MemorySource, ModelSnapshot};
//!
//! let snapshot = ModelSnapshot::new()
//!     .policy(&["role:admin", "application", "get", "*", "allow"])
//!     .grouping("ops@example.com", "role:admin");
//! let enforcer = Enforcer::with_default_model(
//!     MemorySource::new(snapshot),
//!     EnforcerConfig::default(),
//! )
//! .expect("load model");
//!
//! let allowed = enforcer
//!     .enforce("ops@example.com", "application", "get", "demo-team/staging/billing-app")
//!     .expect("enforce");
//! assert!(allowed);
//! ```
//!
//! # Common pitfalls
//! - Treating an enforcement error as a deny hides misconfiguration; fail
//!   the privileged call instead (fail closed, loudly).
//! - Selecting the fast-path strategy for a model it cannot represent is
//!   rejected at load time, not silently approximated.
//!
//! # Future work
//! - Expose implicit-permission queries per resource, not just per subject.

mod config;
mod effect;
mod enforce;
mod errors;
mod expr;
mod fastpath;
mod filter;
mod matcher;
mod model;
mod role;
mod source;

pub use config::{EnforcerConfig, MatcherStrategy, BATCH_ENFORCE_ENV, STRATEGY_ENV};
pub use effect::{Effect, EffectRule};
pub use enforce::Enforcer;
pub use errors::{AuthzError, AuthzResult};
pub use matcher::key_segment_match;
pub use model::{ModelDefinition, PolicyModel, DEFAULT_MODEL};
pub use role::RoleGraph;
pub use source::{GroupingEdge, MemorySource, ModelSnapshot, PolicySource};
