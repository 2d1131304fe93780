//! Vector index for job embeddings. Matching compares a freshly embedded
//! resume against the job's stored point.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod qdrant;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector backend request failed: {0}")]
    Backend(String),

    #[error("embedding vector is empty")]
    EmptyVector,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        point_id: Uuid,
        vector: Vec<f32>,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<(), VectorError>;

    /// Cosine similarity between `vector` and the stored point.
    /// `None` when the point does not exist for this vector's dimension.
    async fn similarity(&self, point_id: Uuid, vector: Vec<f32>) -> Result<Option<f32>, VectorError>;

    async fn delete(&self, point_id: Uuid) -> Result<(), VectorError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryVectorIndex;
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn mismatched_or_zero_vectors_have_no_similarity() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
    }

    #[tokio::test]
    async fn memory_index_scores_stored_point() {
        let index = MemoryVectorIndex::default();
        let point = Uuid::new_v4();
        index
            .upsert(point, vec![1.0, 0.0], Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        let sim = index.similarity(point, vec![1.0, 0.0]).await.unwrap();
        assert_eq!(sim, Some(1.0));

        index.delete(point).await.unwrap();
        assert_eq!(index.similarity(point, vec![1.0, 0.0]).await.unwrap(), None);
    }
}
