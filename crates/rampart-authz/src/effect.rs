//! Effect values and the rules that combine them into a decision.

use crate::errors::{AuthzError, AuthzResult};

/// Per-row outcome of matching one policy against one request tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
    Indeterminate,
}

/// Recognized effect-combination rules from the `[policy_effect]` section.
///
/// Anything outside this set is a configuration error; the engine never
/// guesses a default for an unknown rule string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectRule {
    /// `some(where (p_eft == allow))`
    SomeAllow,
    /// `some(where (p_eft == allow)) && !some(where (p_eft == deny))`
    SomeAllowAndNoDeny,
    /// `priority(p_eft) || deny` — first conclusive row wins.
    Priority,
}

impl EffectRule {
    pub fn parse(raw: &str) -> AuthzResult<Self> {
        // Accept the dotted `p.eft` spelling used in embedded model text.
        let normalized = raw.trim().replace("p.eft", "p_eft");
        match normalized.as_str() {
            "some(where (p_eft == allow))" => Ok(EffectRule::SomeAllow),
            "some(where (p_eft == allow)) && !some(where (p_eft == deny))" => {
                Ok(EffectRule::SomeAllowAndNoDeny)
            }
            "priority(p_eft) || deny" => Ok(EffectRule::Priority),
            _ => Err(AuthzError::UnknownEffectRule(raw.trim().to_string())),
        }
    }
}

/// Streaming combinator merging per-row effects for a single item.
///
/// `push` reports whether scanning further rows can change the outcome, so
/// the evaluation loop can stop early.
#[derive(Debug)]
pub struct EffectScan {
    rule: EffectRule,
    saw_allow: bool,
    saw_deny: bool,
    decided: Option<bool>,
}

impl EffectScan {
    pub fn new(rule: EffectRule) -> Self {
        Self {
            rule,
            saw_allow: false,
            saw_deny: false,
            decided: None,
        }
    }

    /// Feed one row effect. Returns `true` once the outcome is settled.
    pub fn push(&mut self, effect: Effect) -> bool {
        match effect {
            Effect::Allow => self.saw_allow = true,
            Effect::Deny => self.saw_deny = true,
            Effect::Indeterminate => {}
        }
        match self.rule {
            EffectRule::SomeAllow => {
                if self.saw_allow {
                    self.decided = Some(true);
                }
            }
            EffectRule::SomeAllowAndNoDeny => {
                if self.saw_deny {
                    self.decided = Some(false);
                }
            }
            EffectRule::Priority => {
                if self.decided.is_none() {
                    match effect {
                        Effect::Allow => self.decided = Some(true),
                        Effect::Deny => self.decided = Some(false),
                        Effect::Indeterminate => {}
                    }
                }
            }
        }
        self.decided.is_some()
    }

    pub fn finish(self) -> bool {
        if let Some(decided) = self.decided {
            return decided;
        }
        match self.rule {
            EffectRule::SomeAllow => self.saw_allow,
            EffectRule::SomeAllowAndNoDeny => self.saw_allow && !self.saw_deny,
            EffectRule::Priority => false,
        }
    }
}
