//! AST interpreter with named-parameter binding and a function registry.

use std::collections::BTreeMap;

use crate::errors::{AuthzError, AuthzResult};
use crate::expr::parser::{BinaryOp, Expr};
use crate::matcher::key_segment_match;
use crate::role::RoleGraph;

/// Runtime value produced while walking a matcher expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
        }
    }
}

/// Name-to-value binding for one `(policy row × request tuple)` evaluation.
///
/// Lookup is a linear scan over the token tables; matcher token counts are
/// tiny and fixed, so this beats building a map per row.
pub(crate) struct MatcherScope<'a> {
    request_keys: &'a [String],
    request_values: &'a [&'a str],
    policy_keys: &'a [String],
    policy_values: &'a [String],
}

impl<'a> MatcherScope<'a> {
    pub(crate) fn new(
        request_keys: &'a [String],
        request_values: &'a [&'a str],
        policy_keys: &'a [String],
    ) -> AuthzResult<Self> {
        if request_keys.len() != request_values.len() {
            return Err(AuthzError::RequestArityMismatch {
                expected: request_keys.len(),
                actual: request_values.len(),
            });
        }
        Ok(Self {
            request_keys,
            request_values,
            policy_keys,
            policy_values: &[],
        })
    }

    /// Bind the policy-token values for the row about to be evaluated.
    pub(crate) fn bind_policy_row(
        &mut self,
        row: usize,
        values: &'a [String],
    ) -> AuthzResult<()> {
        if self.policy_keys.len() != values.len() {
            return Err(AuthzError::PolicyArityMismatch {
                row,
                expected: self.policy_keys.len(),
                actual: values.len(),
            });
        }
        self.policy_values = values;
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        for (key, value) in self.request_keys.iter().zip(self.request_values) {
            if key == name {
                return Some(value);
            }
        }
        for (key, value) in self.policy_keys.iter().zip(self.policy_values) {
            if key == name {
                return Some(value.as_str());
            }
        }
        None
    }
}

/// Callable registry exposed to matcher expressions: the built-in segment
/// matcher plus one membership function per grouping relation.
pub(crate) struct FunctionTable<'a> {
    relations: &'a BTreeMap<String, RoleGraph>,
}

impl<'a> FunctionTable<'a> {
    pub(crate) fn new(relations: &'a BTreeMap<String, RoleGraph>) -> Self {
        Self { relations }
    }

    fn call(&self, name: &str, args: &[Value]) -> AuthzResult<Value> {
        if name == "keyMatch" {
            let (key, pattern) = two_strings(name, args)?;
            return Ok(Value::Bool(key_segment_match(key, pattern)));
        }
        if let Some(graph) = self.relations.get(name) {
            let (subject, role) = two_strings(name, args)?;
            return Ok(Value::Bool(graph.has_link(subject, role)));
        }
        Err(AuthzError::UnknownFunction(name.to_string()))
    }

    fn is_known(&self, name: &str, arity: usize) -> bool {
        (name == "keyMatch" || self.relations.contains_key(name)) && arity == 2
    }
}

fn two_strings<'v>(name: &str, args: &'v [Value]) -> AuthzResult<(&'v str, &'v str)> {
    match args {
        [Value::Str(a), Value::Str(b)] => Ok((a, b)),
        _ => Err(AuthzError::TypeMismatch(format!(
            "{name} expects two string arguments"
        ))),
    }
}

/// Walk the expression under the given scope and functions.
pub(crate) fn evaluate(
    expr: &Expr,
    scope: &MatcherScope<'_>,
    functions: &FunctionTable<'_>,
) -> AuthzResult<Value> {
    match expr {
        Expr::Bool(value) => Ok(Value::Bool(*value)),
        Expr::Num(value) => Ok(Value::Num(*value)),
        Expr::Str(value) => Ok(Value::Str(value.clone())),
        Expr::Ident(name) => match scope.lookup(name) {
            Some(value) => Ok(Value::Str(value.to_string())),
            None => Err(AuthzError::UnknownIdentifier(name.clone())),
        },
        Expr::Not(operand) => match evaluate(operand, scope, functions)? {
            Value::Bool(value) => Ok(Value::Bool(!value)),
            other => Err(AuthzError::TypeMismatch(format!(
                "'!' expects bool, got {}",
                other.type_name()
            ))),
        },
        Expr::Neg(operand) => match evaluate(operand, scope, functions)? {
            Value::Num(value) => Ok(Value::Num(-value)),
            other => Err(AuthzError::TypeMismatch(format!(
                "unary '-' expects number, got {}",
                other.type_name()
            ))),
        },
        Expr::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, scope, functions),
        Expr::Call { name, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(evaluate(arg, scope, functions)?);
            }
            functions.call(name, &evaluated)
        }
    }
}

fn evaluate_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &MatcherScope<'_>,
    functions: &FunctionTable<'_>,
) -> AuthzResult<Value> {
    // Logical operators short-circuit and demand bool operands.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = require_bool(evaluate(lhs, scope, functions)?)?;
        return match (op, left) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => {
                let right = require_bool(evaluate(rhs, scope, functions)?)?;
                Ok(Value::Bool(right))
            }
        };
    }

    let left = evaluate(lhs, scope, functions)?;
    let right = evaluate(rhs, scope, functions)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (a, b) = numeric_pair(op, &left, &right)?;
            let result = match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => {
                let (a, b) = numeric_pair(op, &left, &right)?;
                Ok(Value::Num(a + b))
            }
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (a, b) = numeric_pair(op, &left, &right)?;
            let result = match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            Ok(Value::Num(result))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn require_bool(value: Value) -> AuthzResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(AuthzError::TypeMismatch(format!(
            "logical operator expects bool, got {}",
            other.type_name()
        ))),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Num(a), Value::Num(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => false,
    }
}

fn numeric_pair(op: BinaryOp, left: &Value, right: &Value) -> AuthzResult<(f64, f64)> {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => Ok((*a, *b)),
        _ => Err(AuthzError::TypeMismatch(format!(
            "{op:?} expects numeric operands, got {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Final match decision for one evaluated row: booleans decide directly,
/// numbers count as a match when nonzero regardless of sign, strings are a
/// configuration fault.
pub(crate) fn decide(value: &Value) -> AuthzResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Num(n) => Ok(*n != 0.0),
        Value::Str(_) => Err(AuthzError::TypeMismatch(
            "matcher produced a string, expected bool or number".to_string(),
        )),
    }
}

/// Static validation run at model build: every identifier must be a declared
/// request/policy token and every call target a known function of the right
/// arity. Catches misconfiguration before the first enforcement call.
pub(crate) fn validate_matcher(
    expr: &Expr,
    request_keys: &[String],
    policy_keys: &[String],
    relations: &BTreeMap<String, RoleGraph>,
) -> AuthzResult<()> {
    let functions = FunctionTable::new(relations);
    match expr {
        Expr::Bool(_) | Expr::Num(_) | Expr::Str(_) => Ok(()),
        Expr::Ident(name) => {
            if request_keys.contains(name) || policy_keys.contains(name) {
                Ok(())
            } else {
                Err(AuthzError::UnknownIdentifier(name.clone()))
            }
        }
        Expr::Not(operand) | Expr::Neg(operand) => {
            validate_matcher(operand, request_keys, policy_keys, relations)
        }
        Expr::Binary { lhs, rhs, .. } => {
            validate_matcher(lhs, request_keys, policy_keys, relations)?;
            validate_matcher(rhs, request_keys, policy_keys, relations)
        }
        Expr::Call { name, args } => {
            if !functions.is_known(name, args.len()) {
                return Err(AuthzError::UnknownFunction(name.clone()));
            }
            for arg in args {
                validate_matcher(arg, request_keys, policy_keys, relations)?;
            }
            Ok(())
        }
    }
}
