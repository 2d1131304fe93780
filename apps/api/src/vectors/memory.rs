use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{cosine_similarity, VectorError, VectorIndex};

#[derive(Default)]
pub struct MemoryVectorIndex {
    points: Mutex<HashMap<Uuid, Vec<f32>>>,
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(
        &self,
        point_id: Uuid,
        vector: Vec<f32>,
        _tenant_id: Uuid,
        _job_id: Uuid,
    ) -> Result<(), VectorError> {
        if vector.is_empty() {
            return Err(VectorError::EmptyVector);
        }
        self.points.lock().unwrap().insert(point_id, vector);
        Ok(())
    }

    async fn similarity(&self, point_id: Uuid, vector: Vec<f32>) -> Result<Option<f32>, VectorError> {
        let points = self.points.lock().unwrap();
        Ok(points
            .get(&point_id)
            .and_then(|stored| cosine_similarity(stored, &vector)))
    }

    async fn delete(&self, point_id: Uuid) -> Result<(), VectorError> {
        self.points.lock().unwrap().remove(&point_id);
        Ok(())
    }
}
