//! Sync engine error types.

/// Host precondition violations raised by the sync engine.
///
/// Expected absences (unknown remote ids, duplicate deliveries) are not
/// errors; the engine treats them as no-ops.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The handle does not refer to a live entity in the host scene.
    #[error("entity {0} is not part of the scene")]
    UnknownEntity(String),

    /// Shared entities are matched across clients by their stable id.
    #[error("shared entity {0} has no stable id")]
    SharedWithoutId(String),
}
