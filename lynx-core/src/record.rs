//! Record types stored by the database.

use serde::{Deserialize, Serialize};

/// Unique identifier for a vector in the index.
pub type VectorId = u64;

/// A vector with its identifier and optional metadata.
///
/// Records are owned by the database and cloned on retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier.
    pub id: VectorId,
    /// Vector data; its length must match the database dimension.
    pub vector: Vec<f32>,
    /// Opaque metadata attached to the vector.
    pub metadata: Option<String>,
}

impl VectorRecord {
    /// Creates a record without metadata.
    pub fn new(id: VectorId, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector,
            metadata: None,
        }
    }

    /// Attaches metadata. Chainable.
    pub fn with_metadata<S: Into<String>>(mut self, metadata: S) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Returns the dimension (length) of the vector.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new() {
        let r = VectorRecord::new(7, vec![1.0, 2.0, 3.0]);
        assert_eq!(r.id, 7);
        assert_eq!(r.dimension(), 3);
        assert!(r.metadata.is_none());
    }

    #[test]
    fn test_record_with_metadata() {
        let r = VectorRecord::new(1, vec![0.5]).with_metadata("doc-42");
        assert_eq!(r.metadata.as_deref(), Some("doc-42"));
    }
}
