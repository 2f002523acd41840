use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DropError, DropResult};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CollectionFile {
    pub name: String,
    pub path: PathBuf,
    pub len: u64,
}

/// Files published under one handle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CollectionMetadata {
    pub header: [u8; 13], // Must contain "CollectionV0."
    pub files: Vec<CollectionFile>,
}

impl CollectionMetadata {
    pub const HEADER: [u8; 13] = *b"CollectionV0.";

    pub fn new(files: Vec<CollectionFile>) -> Self {
        Self {
            header: Self::HEADER,
            files,
        }
    }

    pub fn to_bytes(&self) -> DropResult<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| DropError::InvalidMetadata(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> DropResult<Self> {
        let metadata: CollectionMetadata = postcard::from_bytes(bytes)
            .map_err(|e| DropError::InvalidMetadata(e.to_string()))?;
        if metadata.header != Self::HEADER {
            return Err(DropError::InvalidMetadata(
                "unknown collection header".to_string(),
            ));
        }
        Ok(metadata)
    }

    pub fn total_len(&self) -> u64 {
        self.files.iter().map(|f| f.len).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let metadata = CollectionMetadata::new(vec![CollectionFile {
            name: "a.txt".into(),
            path: "/tmp/a.txt".into(),
            len: 8,
        }]);
        let bytes = metadata.to_bytes().unwrap();
        assert_eq!(CollectionMetadata::from_bytes(&bytes).unwrap(), metadata);
    }

    #[test]
    fn test_rejects_foreign_header() {
        let mut metadata = CollectionMetadata::new(vec![]);
        metadata.header = *b"SomethingV9.x";
        let bytes = metadata.to_bytes().unwrap();
        assert!(matches!(
            CollectionMetadata::from_bytes(&bytes),
            Err(DropError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(CollectionMetadata::from_bytes(&[0xff; 3]).is_err());
    }
}
