#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("operation name is required when the document defines multiple operations")]
    OperationNameRequired,
    #[error("operation '{0}' was not found in the document")]
    OperationNotFound(String),
    #[error("document contains no executable operations")]
    NoOperations,
    #[error("subscriptions are not supported")]
    SubscriptionUnsupported,
    #[error("alias '{0}' uses a reserved prefix")]
    ReservedAlias(String),
    #[error("fragment '{0}' is not defined")]
    MissingFragment(String),
    #[error("fragment '{0}' spreads itself")]
    CyclicFragment(String),
    #[error("field '{field}' on type '{type_name}' cannot be resolved by any location")]
    FieldNotResolvable { type_name: String, field: String },
    #[error("no boundary query reaches type '{type_name}' from location '{location}'")]
    NoBoundaryForType {
        type_name: String,
        location: String,
    },
    #[error("internal planning error: {0}")]
    Internal(String),
}
