//! Input validation limits for schema names and entity properties

/// Maximum length for node and relationship type names (128 chars)
pub const MAX_TYPE_NAME_LEN: usize = 128;

/// Maximum length for a property key (256 chars)
pub const MAX_PROPERTY_KEY_LEN: usize = 256;

/// Maximum properties on a single node or relationship (512)
pub const MAX_PROPERTIES: usize = 512;

/// Maximum capabilities declared on a node type (32)
pub const MAX_CAPABILITIES: usize = 32;

/// Maximum callbacks registered in one transaction (10000)
pub const MAX_CALLBACKS_PER_TRANSACTION: usize = 10_000;

/// Validation error type
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTypeName,
    TypeNameTooLong { len: usize, max: usize },
    InvalidTypeName(String),
    EmptyPropertyKey,
    PropertyKeyTooLong { len: usize, max: usize },
    TooManyProperties { count: usize, max: usize },
    TooManyCapabilities { count: usize, max: usize },
    TooManyCallbacks { max: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTypeName => write!(f, "Type name cannot be empty"),
            Self::TypeNameTooLong { len, max } => {
                write!(f, "Type name too long: {} chars (max {})", len, max)
            }
            Self::InvalidTypeName(name) => write!(
                f,
                "Invalid type name '{}': only letters, digits and '_' are allowed",
                name
            ),
            Self::EmptyPropertyKey => write!(f, "Property key cannot be empty"),
            Self::PropertyKeyTooLong { len, max } => {
                write!(f, "Property key too long: {} chars (max {})", len, max)
            }
            Self::TooManyProperties { count, max } => {
                write!(f, "Too many properties: {} (max {})", count, max)
            }
            Self::TooManyCapabilities { count, max } => {
                write!(f, "Too many capabilities: {} (max {})", count, max)
            }
            Self::TooManyCallbacks { max } => {
                write!(f, "Too many callbacks in one transaction (max {})", max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a node or relationship type name
///
/// Type names double as REST path segments, so they are restricted to
/// ASCII letters, digits and underscores.
pub fn validate_type_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyTypeName);
    }
    if name.len() > MAX_TYPE_NAME_LEN {
        return Err(ValidationError::TypeNameTooLong {
            len: name.len(),
            max: MAX_TYPE_NAME_LEN,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidTypeName(name.to_string()));
    }
    Ok(())
}

/// Validate a property key
pub fn validate_property_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyPropertyKey);
    }
    if key.len() > MAX_PROPERTY_KEY_LEN {
        return Err(ValidationError::PropertyKeyTooLong {
            len: key.len(),
            max: MAX_PROPERTY_KEY_LEN,
        });
    }
    Ok(())
}

/// Validate the number of properties on one entity
pub fn validate_property_count(count: usize) -> Result<(), ValidationError> {
    if count > MAX_PROPERTIES {
        return Err(ValidationError::TooManyProperties {
            count,
            max: MAX_PROPERTIES,
        });
    }
    Ok(())
}

/// Validate the number of capabilities on a node type
pub fn validate_capability_count(count: usize) -> Result<(), ValidationError> {
    if count > MAX_CAPABILITIES {
        return Err(ValidationError::TooManyCapabilities {
            count,
            max: MAX_CAPABILITIES,
        });
    }
    Ok(())
}
