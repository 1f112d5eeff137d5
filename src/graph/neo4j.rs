//! Neo4j client speaking the HTTP transactional Cypher API.

use super::{GraphChunk, GraphDocument, GraphError, GraphHit, GraphStore};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const UPSERT_DOCUMENT: &str = "\
MERGE (d:Document {job_id: $job_id})
ON CREATE SET d.created_at = timestamp()
SET d.filename = $filename, d.input_path = $input_path, d.route = $route
WITH d
UNWIND $chunks AS c
MERGE (ch:Chunk {job_id: $job_id, chunk_id: c.chunk_id})
SET ch.text = c.text, ch.qdrant_point_id = c.qdrant_point_id, ch.page = c.page,
    ch.start = c.start, ch.end = c.end
MERGE (d)-[:HAS_CHUNK]->(ch)";

const FIND_BY_KEYWORD: &str = "\
MATCH (d:Document)-[:HAS_CHUNK]->(c:Chunk)
WHERE toLower(c.text) CONTAINS toLower($keyword)
RETURN {filename: d.filename, chunk_id: c.chunk_id, text: c.text, qdrant_point_id: c.qdrant_point_id} AS hit
ORDER BY d.created_at DESC, c.chunk_id ASC
LIMIT $limit";

const TOP_CHUNKS_FOR_FILENAME: &str = "\
MATCH (d:Document {filename: $filename})-[:HAS_CHUNK]->(c:Chunk)
RETURN {filename: d.filename, chunk_id: c.chunk_id, text: c.text, qdrant_point_id: c.qdrant_point_id} AS hit
ORDER BY c.chunk_id ASC
LIMIT $limit";

const TOP_CHUNKS_FOR_LATEST: &str = "\
MATCH (d:Document)-[:HAS_CHUNK]->(:Chunk)
WITH DISTINCT d ORDER BY d.created_at DESC
LIMIT 1
MATCH (d)-[:HAS_CHUNK]->(c:Chunk)
RETURN {filename: d.filename, chunk_id: c.chunk_id, text: c.text, qdrant_point_id: c.qdrant_point_id} AS hit
ORDER BY c.chunk_id ASC
LIMIT $limit";

/// Lightweight HTTP client for Neo4j.
pub struct Neo4jService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) database: String,
    pub(crate) user: String,
    pub(crate) password: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<CypherError>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<ResultRow>,
}

#[derive(Deserialize)]
struct ResultRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct CypherError {
    code: String,
    message: String,
}

impl Neo4jService {
    /// Construct a client from the graph settings in `config`.
    pub fn new(config: &Config) -> Result<Self, GraphError> {
        let client = Client::builder().user_agent("idp-pipeline/0.1").build()?;
        tracing::debug!(url = %config.neo4j_url, database = %config.neo4j_database, "Initialized Neo4j HTTP client");
        Ok(Self {
            client,
            base_url: config.neo4j_url.trim_end_matches('/').to_string(),
            database: config.neo4j_database.clone(),
            user: config.neo4j_user.clone(),
            password: config.neo4j_password.clone(),
        })
    }

    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Vec<Value>>, GraphError> {
        let url = format!("{}/db/{}/tx/commit", self.base_url, self.database);
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let response = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = GraphError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Neo4j request failed");
            return Err(error);
        }

        let payload: CommitResponse = response.json().await?;
        if let Some(error) = payload.errors.into_iter().next() {
            let error = GraphError::Query {
                code: error.code,
                message: error.message,
            };
            tracing::error!(error = %error, "Cypher statement failed");
            return Err(error);
        }

        Ok(payload
            .results
            .into_iter()
            .flat_map(|result| result.data)
            .map(|row| row.row)
            .collect())
    }

    async fn query_hits(&self, statement: &str, parameters: Value) -> Result<Vec<GraphHit>, GraphError> {
        self.run(statement, parameters)
            .await?
            .into_iter()
            .map(first_column::<GraphHit>)
            .collect()
    }
}

fn first_column<T: DeserializeOwned>(row: Vec<Value>) -> Result<T, GraphError> {
    let value = row
        .into_iter()
        .next()
        .ok_or_else(|| GraphError::InvalidRow("empty row".into()))?;
    serde_json::from_value(value).map_err(|error| GraphError::InvalidRow(error.to_string()))
}

#[async_trait]
impl GraphStore for Neo4jService {
    async fn upsert_document(
        &self,
        document: &GraphDocument,
        chunks: &[GraphChunk],
    ) -> Result<(), GraphError> {
        self.run(
            UPSERT_DOCUMENT,
            json!({
                "job_id": document.job_id,
                "filename": document.filename,
                "input_path": document.input_path,
                "route": document.route,
                "chunks": chunks,
            }),
        )
        .await?;
        tracing::debug!(job_id = %document.job_id, chunks = chunks.len(), "Graph document merged");
        Ok(())
    }

    async fn find_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<GraphHit>, GraphError> {
        self.query_hits(FIND_BY_KEYWORD, json!({ "keyword": keyword, "limit": limit }))
            .await
    }

    async fn fallback_top_chunks(
        &self,
        limit: usize,
        filename: Option<&str>,
    ) -> Result<Vec<GraphHit>, GraphError> {
        match filename {
            Some(filename) => {
                self.query_hits(
                    TOP_CHUNKS_FOR_FILENAME,
                    json!({ "filename": filename, "limit": limit }),
                )
                .await
            }
            None => {
                self.query_hits(TOP_CHUNKS_FOR_LATEST, json!({ "limit": limit }))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn service(base_url: String) -> Neo4jService {
        Neo4jService {
            client: Client::builder()
                .user_agent("idp-pipeline-test")
                .build()
                .expect("client"),
            base_url,
            database: "neo4j".into(),
            user: "neo4j".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn upsert_sends_chunks_with_basic_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/db/neo4j/tx/commit")
                    .header_exists("authorization")
                    .body_contains("HAS_CHUNK")
                    .body_contains("\"job_id\":\"job-1\"")
                    .body_contains("\"qdrant_point_id\":\"p-0\"");
                then.status(200)
                    .json_body(json!({ "results": [{ "columns": [], "data": [] }], "errors": [] }));
            })
            .await;

        let document = GraphDocument {
            job_id: "job-1".into(),
            filename: "doc.pdf".into(),
            input_path: "/data/uploads/job-1__doc.pdf".into(),
            route: "structured".into(),
        };
        let chunks = vec![GraphChunk {
            chunk_id: 0,
            text: "hello".into(),
            qdrant_point_id: Some("p-0".into()),
            page: 1,
            start: 10,
            end: 15,
        }];

        service(server.base_url())
            .upsert_document(&document, &chunks)
            .await
            .expect("upsert");
        mock.assert();
    }

    #[tokio::test]
    async fn keyword_rows_are_decoded_into_hits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/db/neo4j/tx/commit")
                    .body_contains("\"keyword\":\"invoice\"");
                then.status(200).json_body(json!({
                    "results": [{
                        "columns": ["hit"],
                        "data": [
                            { "row": [{ "filename": "a.pdf", "chunk_id": 2, "text": "Invoice total", "qdrant_point_id": "p-2" }], "meta": [null] },
                            { "row": [{ "filename": "b.pdf", "chunk_id": 0, "text": "invoice no.", "qdrant_point_id": null }], "meta": [null] }
                        ]
                    }],
                    "errors": []
                }));
            })
            .await;

        let hits = service(server.base_url())
            .find_by_keyword("invoice", 5)
            .await
            .expect("hits");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].filename, "a.pdf");
        assert_eq!(hits[0].chunk_id, 2);
        assert_eq!(hits[1].qdrant_point_id, None);
    }

    #[tokio::test]
    async fn cypher_errors_in_body_are_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/db/neo4j/tx/commit");
                then.status(200).json_body(json!({
                    "results": [],
                    "errors": [{ "code": "Neo.ClientError.Statement.SyntaxError", "message": "bad" }]
                }));
            })
            .await;

        let error = service(server.base_url())
            .fallback_top_chunks(5, None)
            .await
            .expect_err("cypher error");
        assert!(matches!(error, GraphError::Query { .. }));
    }

    #[tokio::test]
    async fn filename_fallback_uses_named_document() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/db/neo4j/tx/commit")
                    .body_contains("\"filename\":\"report.pdf\"");
                then.status(200)
                    .json_body(json!({ "results": [{ "columns": ["hit"], "data": [] }], "errors": [] }));
            })
            .await;

        let hits = service(server.base_url())
            .fallback_top_chunks(3, Some("report.pdf"))
            .await
            .expect("hits");
        mock.assert();
        assert!(hits.is_empty());
    }
}
