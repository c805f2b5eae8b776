use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Failure of an update call, always reported against the lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactError {
    pub path: String,
    pub message: String,
}

/// One entry of the ordered result of an update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactResult {
    File { path: String, contents: Vec<u8> },
    Deleted { path: String },
    Error(ArtifactError),
}

impl ArtifactResult {
    pub fn file(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self::File {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self::Deleted { path: path.into() }
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ArtifactError {
            path: path.into(),
            message: message.into(),
        })
    }

    pub fn path(&self) -> &str {
        match self {
            Self::File { path, .. } | Self::Deleted { path } => path,
            Self::Error(err) => &err.path,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

// Deletions carry their own path as the contents payload.
impl Serialize for ArtifactResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::File { path, contents } => {
                let mut state = serializer.serialize_struct("FileArtifact", 2)?;
                state.serialize_field("path", path)?;
                state.serialize_field("contents", &String::from_utf8_lossy(contents))?;
                state.end()
            }
            Self::Deleted { path } => {
                let mut state = serializer.serialize_struct("DeletedArtifact", 3)?;
                state.serialize_field("path", path)?;
                state.serialize_field("contents", path)?;
                state.serialize_field("isDeleted", &true)?;
                state.end()
            }
            Self::Error(err) => {
                let mut state = serializer.serialize_struct("ArtifactError", 2)?;
                state.serialize_field("path", &err.path)?;
                state.serialize_field("error", &err.message)?;
                state.end()
            }
        }
    }
}
