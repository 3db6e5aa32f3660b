//! Error types for the physics system

use thiserror::Error;

/// Physics system errors
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Invalid configuration
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// The worker pool backing the simulation step could not be created
    #[error("Failed to create physics worker pool: {0}")]
    ThreadPool(String),

    /// Shape creation failed
    #[error("Failed to create collision shape: {0}")]
    ShapeCreationFailed(String),

    /// A local offset could not be composed around a shape
    #[error("Failed to compose offset shape: {0}")]
    OffsetCompositionFailed(String),
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
