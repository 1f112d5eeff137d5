//! HTTP client for the Qdrant REST API.
//!
//! Only the calls the pipeline needs are wrapped: collection bootstrap, batched upserts with
//! `wait=true`, and the universal `points/query` search.

use crate::config::Config;
use crate::qdrant::VectorStore;
use crate::qdrant::types::{
    PointInsert, QdrantError, QueryResponse, QueryResponseResult, ScoredPoint,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Value, json};

/// Maximum number of points sent in one upsert request.
pub const UPSERT_BATCH_SIZE: usize = 128;

/// Qdrant client bound to the configured collection.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
    pub(crate) vector_size: u64,
}

impl QdrantService {
    /// Build a client from the `QDRANT_*` settings.
    pub fn new(config: &Config) -> Result<Self, QdrantError> {
        let base_url = Url::parse(&config.qdrant_url)
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .map_err(|err| QdrantError::InvalidUrl(err.to_string()))?;
        let api_key = config
            .qdrant_api_key
            .clone()
            .filter(|key| !key.trim().is_empty());
        let client = Client::builder().user_agent("idp-pipeline/0.1").build()?;

        tracing::debug!(
            url = %base_url,
            collection = %config.qdrant_collection,
            authenticated = api_key.is_some(),
            "Qdrant client ready"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection: config.qdrant_collection.clone(),
            vector_size: config.qdrant_vector_size,
        })
    }

    /// Create `collection` with cosine distance unless it already exists.
    pub async fn create_collection_if_not_exists(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let response = self
            .call(Method::GET, &format!("collections/{collection}"))
            .send()
            .await?;
        if response.status() == StatusCode::OK {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(rejected(response, "collection lookup").await);
        }

        tracing::info!(collection, vector_size, "Creating Qdrant collection");
        let response = self
            .call(Method::PUT, &format!("collections/{collection}"))
            .json(&json!({ "vectors": { "size": vector_size, "distance": "Cosine" } }))
            .send()
            .await?;
        accepted(response, "collection create").await.map(drop)
    }

    /// Upsert `points` in batches of [`UPSERT_BATCH_SIZE`] and return their ids in input order.
    pub async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointInsert>,
    ) -> Result<Vec<String>, QdrantError> {
        let path = format!("collections/{collection}/points");
        let mut ids = Vec::with_capacity(points.len());

        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            let response = self
                .call(Method::PUT, &path)
                .query(&[("wait", true)])
                .json(&json!({ "points": batch }))
                .send()
                .await?;
            accepted(response, "upsert").await?;

            tracing::debug!(collection, points = batch.len(), "Upserted batch");
            ids.extend(batch.iter().map(|point| point.id.clone()));
        }

        Ok(ids)
    }

    /// Nearest-neighbour query returning payloads with their scores.
    pub async fn search_points(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let response = self
            .call(
                Method::POST,
                &format!("collections/{collection}/points/query"),
            )
            .json(&json!({ "query": vector, "limit": limit, "with_payload": true }))
            .send()
            .await?;
        let body: QueryResponse = accepted(response, "search").await?.json().await?;

        let points = match body.result {
            QueryResponseResult::Points(points) | QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredPoint {
                id: point_id_text(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    fn call(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }
}

async fn accepted(response: Response, operation: &'static str) -> Result<Response, QdrantError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(rejected(response, operation).await)
    }
}

async fn rejected(response: Response, operation: &'static str) -> QdrantError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(operation, %status, body = %body, "Qdrant rejected request");
    QdrantError::UnexpectedStatus { status, body }
}

#[async_trait]
impl VectorStore for QdrantService {
    async fn ensure_collection(&self) -> Result<(), QdrantError> {
        self.create_collection_if_not_exists(&self.collection, self.vector_size)
            .await
    }

    async fn upsert(&self, points: Vec<PointInsert>) -> Result<Vec<String>, QdrantError> {
        self.upsert_points(&self.collection, points).await
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<ScoredPoint>, QdrantError> {
        self.search_points(&self.collection, vector, limit).await
    }
}

fn point_id_text(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qdrant::payload::point_id_for;
    use crate::qdrant::types::ChunkPayload;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn service(base_url: String) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("idp-pipeline-test")
                .build()
                .expect("client"),
            base_url,
            api_key: None,
            collection: "demo".into(),
            vector_size: 2,
        }
    }

    fn point(index: usize) -> PointInsert {
        PointInsert {
            id: point_id_for("job-1", index),
            vector: vec![0.1, 0.2],
            payload: ChunkPayload {
                job_id: "job-1".into(),
                filename: "doc.pdf".into(),
                route: "structured".into(),
                chunk_index: index,
                chunk_id: index,
                text: format!("chunk {index}"),
                page: 1,
                start: 0,
                end: 7,
                used_route: "structured".into(),
                ocr_score: None,
                chunk_hash: "hash".into(),
                indexed_at: "2025-01-01T00:00:00Z".into(),
            },
        }
    }

    #[tokio::test]
    async fn search_points_emits_expected_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .body_contains("\"with_payload\":true");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "point-1",
                                "score": 0.42,
                                "payload": { "text": "Example", "job_id": "job-1" }
                            }
                        ]
                    }
                }));
            })
            .await;

        let results = service(server.base_url())
            .search(vec![0.1, 0.2], 3)
            .await
            .expect("search request");

        mock.assert();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.id, "point-1");
        assert!((hit.score - 0.42).abs() < f32::EPSILON);
        let payload = hit.payload.as_ref().expect("payload");
        assert_eq!(payload["job_id"], Value::String("job-1".into()));
    }

    #[tokio::test]
    async fn upsert_splits_into_batches_and_preserves_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/demo/points")
                    .query_param("wait", "true");
                then.status(200)
                    .json_body(json!({ "status": "ok", "result": { "status": "completed" } }));
            })
            .await;

        let points: Vec<_> = (0..UPSERT_BATCH_SIZE + 2).map(point).collect();
        let expected: Vec<_> = points.iter().map(|point| point.id.clone()).collect();

        let ids = service(server.base_url())
            .upsert(points)
            .await
            .expect("upsert");

        mock.assert_hits(2);
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn missing_collection_is_created_with_cosine_distance() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/demo");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/demo")
                    .json_body(json!({ "vectors": { "size": 2, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        service(server.base_url())
            .ensure_collection()
            .await
            .expect("ensure collection");

        exists.assert();
        create.assert();
    }

    #[tokio::test]
    async fn failed_upsert_reports_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo/points");
                then.status(400).body("wrong vector size");
            })
            .await;

        let error = service(server.base_url())
            .upsert(vec![point(0)])
            .await
            .expect_err("rejected upsert");
        assert!(matches!(
            error,
            QdrantError::UnexpectedStatus { status, .. } if status == StatusCode::BAD_REQUEST
        ));
    }
}
