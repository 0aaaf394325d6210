use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("malformed model: {0}")]
    MalformedModel(String),
    #[error("malformed matcher expression: {0}")]
    MalformedMatcher(String),
    #[error("unknown effect rule: {0}")]
    UnknownEffectRule(String),
    #[error("unknown function in matcher: {0}")]
    UnknownFunction(String),
    #[error("unknown identifier in matcher: {0}")]
    UnknownIdentifier(String),
    #[error("request arity mismatch: model declares {expected} tokens, got {actual}")]
    RequestArityMismatch { expected: usize, actual: usize },
    #[error("policy arity mismatch at row {row}: model declares {expected} tokens, got {actual}")]
    PolicyArityMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("policy shape mismatch: fast-path enforcement requires sub, res, act, obj, eft policy tokens, model declares {actual}")]
    PolicyShapeMismatch { actual: String },
    #[error("type mismatch in matcher: {0}")]
    TypeMismatch(String),
    #[error("unknown matcher strategy: {0}")]
    UnknownStrategy(String),
    #[error("invalid boolean flag {name}: {value}")]
    InvalidFlag { name: String, value: String },
    #[error("policy evaluation panicked for subject={subject} resource={resource} action={action}")]
    EvaluationPanic {
        subject: String,
        resource: String,
        action: String,
    },
}

pub type AuthzResult<T> = Result<T, AuthzError>;
