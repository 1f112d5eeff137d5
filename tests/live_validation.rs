use std::{env, sync::Once};

use idp_pipeline::{
    config,
    embedding::{EmbeddingClient, get_embedding_client},
    graph::{GraphStore, Neo4jService},
    qdrant::{QdrantService, VectorStore},
    upstream::{RetryPolicy, RetryingClient},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("QDRANT_COLLECTION", "idp_docs_live");
        set_default_env("NEO4J_URL", "http://127.0.0.1:7474");
        config::init_config(None).expect("live configuration");
    });
    config::get_config()
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_collection_is_ensured() {
    let config = config_once();
    let qdrant = QdrantService::new(config).expect("qdrant client");
    qdrant.ensure_collection().await.expect("collection ensured");
    let hits = qdrant
        .search(vec![0.0; config.qdrant_vector_size as usize], 1)
        .await
        .expect("search on live collection");
    assert!(hits.len() <= 1);
}

#[tokio::test]
#[ignore = "Requires live embedding service"]
async fn live_embedding_roundtrip() {
    let config = config_once();
    let http = RetryingClient::new(RetryPolicy::default()).expect("http client");
    let client = get_embedding_client(config, http);
    let vectors = client
        .generate_embeddings(vec!["idp-pipeline live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len() as u64,
        config.qdrant_vector_size,
        "embedding dimension must match the collection"
    );
}

#[tokio::test]
#[ignore = "Requires live Neo4j"]
async fn live_neo4j_fallback_query_runs() {
    let config = config_once();
    let graph = Neo4jService::new(config).expect("neo4j client");
    let hits = graph
        .fallback_top_chunks(3, None)
        .await
        .expect("fallback query");
    assert!(hits.len() <= 3);
}
