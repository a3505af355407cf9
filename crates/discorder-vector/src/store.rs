//! Per-server Qdrant-backed vector collections, one collection per Discord
//! server, named `{collection_prefix}{server_id}`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Direction, Distance, OrderByBuilder, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use discorder_core::types::ServerId;

use crate::error::{Result, VectorError};

/// Namespace used to derive deterministic Qdrant point UUIDs from message
/// IDs, so re-ingesting the same message replaces its point rather than
/// duplicating it.
const POINT_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6d, 0x73, 0x67, 0x2d, 0x70, 0x6f, 0x69, 0x6e, 0x74, 0x2d, 0x6e, 0x73, 0x00, 0x00, 0x00, 0x00,
]);

#[derive(Debug, Clone)]
pub struct PointMetadata {
    pub author_id: String,
    pub author_display_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QueryHit {
    pub message_id: String,
    pub content: String,
    pub metadata: PointMetadata,
    pub distance: f32,
}

pub struct VectorStore {
    client: Qdrant,
    collection_prefix: String,
}

impl VectorStore {
    pub fn new(endpoint: &str, collection_prefix: &str) -> Result<Self> {
        let client = Qdrant::from_url(endpoint)
            .build()
            .map_err(|e| VectorError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            collection_prefix: collection_prefix.to_string(),
        })
    }

    fn collection_name(&self, server_id: &ServerId) -> String {
        format!("{}{}", self.collection_prefix, server_id.as_str())
    }

    fn point_id(message_id: &str) -> String {
        Uuid::new_v5(&POINT_ID_NAMESPACE, message_id.as_bytes()).to_string()
    }

    /// Idempotent collection creation, mirroring the
    /// check-then-create pattern used for per-agent vector collections.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, server_id: &ServerId, vector_dim: u64) -> Result<()> {
        let name = self.collection_name(server_id);
        let exists = self
            .client
            .collection_exists(&name)
            .await
            .map_err(|e| VectorError::Store(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&name)
                        .vectors_config(VectorParamsBuilder::new(vector_dim, Distance::Cosine)),
                )
                .await
                .map_err(|e| VectorError::Store(e.to_string()))?;
            info!(collection = name, "vector collection created");
        }
        Ok(())
    }

    /// At-most-once write keyed on `message_id`; re-ingest replaces the point
    /// in place since the point ID is derived deterministically.
    #[instrument(skip(self, vector, content))]
    pub async fn upsert(
        &self,
        server_id: &ServerId,
        message_id: &str,
        content: &str,
        vector: Vec<f32>,
        metadata: PointMetadata,
    ) -> Result<()> {
        let collection = self.collection_name(server_id);
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("message_id".to_string(), message_id.to_string().into());
        payload.insert("content".to_string(), content.to_string().into());
        payload.insert("author_id".to_string(), metadata.author_id.into());
        payload.insert(
            "author_display_name".to_string(),
            metadata.author_display_name.into(),
        );
        payload.insert("channel_id".to_string(), metadata.channel_id.into());
        payload.insert("channel_name".to_string(), metadata.channel_name.into());
        payload.insert(
            "timestamp".to_string(),
            metadata.timestamp.to_rfc3339().into(),
        );

        let point = PointStruct::new(Self::point_id(message_id), vector, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&collection, vec![point]))
            .await
            .map_err(|e| VectorError::Store(e.to_string()))?;
        Ok(())
    }

    /// Nearest-neighbor search by precomputed embedding vector. Collections
    /// use `Distance::Cosine`, so `QueryHit::distance` is really a cosine
    /// *similarity* (higher = more relevant); relevance filtering
    /// (`distance >= cutoff`) is the caller's responsibility (the Agent
    /// Runner applies the workspace-wide 0.1 cutoff).
    #[instrument(skip(self, vector))]
    pub async fn query(
        &self,
        server_id: &ServerId,
        vector: Vec<f32>,
        k: u64,
    ) -> Result<Vec<QueryHit>> {
        let collection = self.collection_name(server_id);
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&collection, vector, k).with_payload(true),
            )
            .await
            .map_err(|e| VectorError::Store(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                let get_str = |k: &str| -> String {
                    point
                        .payload
                        .get(k)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                let message_id = get_str("message_id");
                if message_id.is_empty() {
                    return None;
                }
                let timestamp = get_str("timestamp");
                Some(QueryHit {
                    message_id,
                    content: get_str("content"),
                    metadata: PointMetadata {
                        author_id: get_str("author_id"),
                        author_display_name: get_str("author_display_name"),
                        channel_id: get_str("channel_id"),
                        channel_name: get_str("channel_name"),
                        timestamp: DateTime::parse_from_rfc3339(&timestamp)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                    },
                    distance: point.score,
                })
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn count(&self, server_id: &ServerId) -> Result<u64> {
        let collection = self.collection_name(server_id);
        let info = self
            .client
            .collection_info(&collection)
            .await
            .map_err(|e| VectorError::Store(e.to_string()))?;
        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0))
    }

    /// Used to decide resumption vs. full historical scan: the max
    /// `timestamp` payload value across all points in the collection, or
    /// `None` if the collection is absent, empty, or has no parseable
    /// timestamp.
    #[instrument(skip(self))]
    pub async fn latest_indexed_timestamp(
        &self,
        server_id: &ServerId,
    ) -> Result<Option<DateTime<Utc>>> {
        let collection = self.collection_name(server_id);
        let exists = self
            .client
            .collection_exists(&collection)
            .await
            .map_err(|e| VectorError::Store(e.to_string()))?;
        if !exists {
            return Ok(None);
        }

        let scrolled = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&collection)
                    .limit(1)
                    .with_payload(true)
                    .order_by(OrderByBuilder::new("timestamp").direction(Direction::Desc)),
            )
            .await
            .map_err(|e| VectorError::Store(e.to_string()))?;

        let Some(point) = scrolled.result.into_iter().next() else {
            debug!(collection, "no points indexed yet");
            return Ok(None);
        };

        let ts_str = point
            .payload
            .get("timestamp")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(DateTime::parse_from_rfc3339(&ts_str)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)))
    }
}
