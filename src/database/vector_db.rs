use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config, Condition, CountPointsBuilder,
        CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance,
        FieldType, Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value,
        VectorParamsBuilder,
    },
    Payload, Qdrant,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::qdrant_config::create_qdrant_client;
use super::traits::{IndexEntry, ScoredPassage, VectorDBError, VectorIndex};

const UPSERT_BATCH: usize = 64;

/// [`VectorIndex`] backed by one Qdrant collection.
#[derive(Clone)]
pub struct VectorDB {
    client: Arc<Qdrant>,
    collection: String,
}

impl VectorDB {
    pub async fn new(
        url: &str,
        collection: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url, api_key, timeout).await?;
        Ok(Self {
            client: Arc::new(client),
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn document_filter(document_id: &str) -> Filter {
        Filter::must([Condition::matches("document_id", document_id.to_string())])
    }

    async fn existing_dimension(&self) -> Result<Option<usize>, VectorDBError> {
        let info = self.client.collection_info(&self.collection)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let config = info.result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        Ok(match config {
            Some(vectors_config::Config::Params(params)) => Some(params.size as usize),
            _ => None,
        })
    }

    fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn payload_index(payload: &HashMap<String, Value>) -> usize {
        match payload.get("chunk_index").and_then(|v| v.kind.as_ref()) {
            Some(Kind::IntegerValue(i)) => *i as usize,
            Some(Kind::DoubleValue(d)) => *d as usize,
            _ => 0,
        }
    }
}

#[async_trait]
impl VectorIndex for VectorDB {
    async fn ping(&self) -> Result<(), VectorDBError> {
        self.client.list_collections()
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDBError> {
        let exists = self.client.collection_exists(&self.collection)
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;

        if exists {
            if let Some(expected) = self.existing_dimension().await? {
                if expected != dimension {
                    return Err(VectorDBError::DimensionMismatch { expected, actual: dimension });
                }
            }
            log::info!("Collection {} already exists, skipping creation", self.collection);
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        // Filtered deletes and counts go through this index
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                "document_id",
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        log::info!("Created collection {} ({} dimensions)", self.collection, dimension);
        Ok(())
    }

    async fn upsert(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<(), VectorDBError> {
        // Drop whatever an earlier ingestion left behind, including chunks
        // past the new chunk count
        self.remove_document(document_id).await?;

        let mut points = Vec::with_capacity(entries.len());
        for entry in entries {
            let payload = Payload::try_from(json!({
                "text": entry.text,
                "document_id": document_id,
                "chunk_index": entry.chunk_index,
            }))
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

            points.push(PointStruct::new(entry.chunk_id, entry.vector, payload));
        }

        for batch in points.chunks(UPSERT_BATCH) {
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, batch.to_vec()).wait(true))
                .await
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        }

        log::debug!("Upserted {} points for {}", points.len(), document_id);
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, VectorDBError> {
        let response = self.client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let passages = response.result
            .into_iter()
            .filter_map(|point| {
                let text = Self::payload_string(&point.payload, "text")?;
                let document_id = Self::payload_string(&point.payload, "document_id")?;
                if let Some(PointIdOptions::Uuid(id)) = point.id.and_then(|id| id.point_id_options) {
                    log::trace!("hit {} score {:.3}", id, point.score);
                }
                Some(ScoredPassage {
                    text,
                    document_id,
                    chunk_index: Self::payload_index(&point.payload),
                    score: point.score,
                })
            })
            .collect();

        Ok(passages)
    }

    async fn remove_document(&self, document_id: &str) -> Result<(), VectorDBError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Self::document_filter(document_id))
                    .wait(true),
            )
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> Result<usize, VectorDBError> {
        let response = self.client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn count_document(&self, document_id: &str) -> Result<usize, VectorDBError> {
        let response = self.client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(Self::document_filter(document_id))
                    .exact(true),
            )
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}
