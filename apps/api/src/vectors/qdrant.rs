use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::info;
use uuid::Uuid;

use super::{VectorError, VectorIndex};

/// Qdrant-backed job index. Embedding sizes differ between providers, so
/// there is one cosine collection per dimension (`{prefix}_{dim}`).
pub struct QdrantVectorIndex {
    client: Qdrant,
    prefix: String,
}

impl QdrantVectorIndex {
    pub fn connect(url: &str, api_key: Option<String>, prefix: &str) -> Result<Self, VectorError> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VectorError::Backend(format!("failed to connect to Qdrant: {e}")))?;

        Ok(Self {
            client,
            prefix: prefix.to_string(),
        })
    }

    fn collection_name(&self, dimension: usize) -> String {
        format!("{}_{}", self.prefix, dimension)
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<String, VectorError> {
        let name = self.collection_name(dimension);
        let exists = self
            .client
            .collection_exists(name.clone())
            .await
            .map_err(backend)?;

        if !exists {
            let created = self
                .client
                .create_collection(
                    CreateCollectionBuilder::new(name.clone())
                        .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
                )
                .await;
            match created {
                Ok(_) => info!("Created Qdrant collection {name}"),
                // another request created it first
                Err(e) if e.to_string().contains("already exists") => {}
                Err(e) => return Err(backend(e)),
            }
        }

        Ok(name)
    }
}

fn backend(e: impl std::fmt::Display) -> VectorError {
    VectorError::Backend(e.to_string())
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(
        &self,
        point_id: Uuid,
        vector: Vec<f32>,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<(), VectorError> {
        if vector.is_empty() {
            return Err(VectorError::EmptyVector);
        }
        let collection = self.ensure_collection(vector.len()).await?;

        let mut payload = Payload::new();
        payload.insert("tenant_id", tenant_id.to_string());
        payload.insert("job_id", job_id.to_string());

        let point = PointStruct::new(point_id.to_string(), vector, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn similarity(&self, point_id: Uuid, vector: Vec<f32>) -> Result<Option<f32>, VectorError> {
        if vector.is_empty() {
            return Err(VectorError::EmptyVector);
        }
        let collection = self.collection_name(vector.len());
        if !self
            .client
            .collection_exists(collection.clone())
            .await
            .map_err(backend)?
        {
            return Ok(None);
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector, 1)
                    .filter(Filter::must([Condition::has_id([point_id.to_string()])])),
            )
            .await
            .map_err(backend)?;

        Ok(response.result.first().map(|p| p.score))
    }

    async fn delete(&self, point_id: Uuid) -> Result<(), VectorError> {
        let collections = self.client.list_collections().await.map_err(backend)?;
        let own_prefix = format!("{}_", self.prefix);

        for collection in collections
            .collections
            .into_iter()
            .filter(|c| c.name.starts_with(&own_prefix))
        {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection.name)
                        .points(vec![PointId::from(point_id.to_string())])
                        .wait(true),
                )
                .await
                .map_err(backend)?;
        }
        Ok(())
    }
}
