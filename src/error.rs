use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceError {
    TagNotFound(String),
    PageNotFound(String),
    BlockNotFound(String),
    InvalidSchema(String),
    InvalidValue(String),
    Cycle(String),
    Inactive,
}

impl fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceError::TagNotFound(id) => write!(f, "Super tag '{}' not found", id),
            WorkspaceError::PageNotFound(id) => write!(f, "Page '{}' not found", id),
            WorkspaceError::BlockNotFound(id) => write!(f, "Block '{}' not found", id),
            WorkspaceError::InvalidSchema(msg) => write!(f, "Invalid schema: {}", msg),
            WorkspaceError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            WorkspaceError::Cycle(msg) => write!(f, "Page hierarchy cycle: {}", msg),
            WorkspaceError::Inactive => write!(f, "Please sign in to access your workspace"),
        }
    }
}

impl std::error::Error for WorkspaceError {}

impl WorkspaceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WorkspaceError::TagNotFound(_)
                | WorkspaceError::PageNotFound(_)
                | WorkspaceError::BlockNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
