#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("no location schemas were provided")]
    EmptySchema,
    #[error("location '{0}' declares a Subscription root, which is not supported")]
    SubscriptionUnsupported(String),
    #[error("root operation name '{name}' collides with an existing type in location '{location}'")]
    RootNameCollision { name: String, location: String },
    #[error("type '{0}' is declared with conflicting kinds across locations")]
    TypeKindConflict(String),
    #[error("field '{type_name}.{field}' has incompatible definitions across locations")]
    FieldTypeConflict { type_name: String, field: String },
    #[error(
        "root field '{type_name}.{field}' is declared by multiple locations with different signatures"
    )]
    RootFieldConflict { type_name: String, field: String },
    #[error("input type '{0}' differs between locations")]
    InputTypeMismatch(String),
    #[error("boundary key '{key}' is not a field of type '{type_name}' in location '{location}'")]
    InvalidBoundaryKey {
        type_name: String,
        key: String,
        location: String,
    },
    #[error("boundary field '{field}' in location '{location}' has no usable key argument")]
    InvalidBoundaryArgument { field: String, location: String },
    #[error("duplicate boundary for type '{type_name}' on location '{location}' with key '{key}'")]
    DuplicateBoundary {
        type_name: String,
        location: String,
        key: String,
    },
    #[error("merged type '{type_name}' has no boundary query into location '{location}'")]
    MissingBoundary {
        type_name: String,
        location: String,
    },
}
