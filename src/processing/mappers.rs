//! Boundary mappings between canonical chunk records and collaborator shapes.

use crate::{
    graph::{GraphChunk, GraphHit},
    processing::types::{ChunkRecord, Strategy},
    qdrant::{
        ChunkPayload, PointInsert, compute_content_hash, payload::current_timestamp_rfc3339,
        point_id_for,
    },
};

/// Job-level fields copied onto every vector payload.
pub(crate) struct PayloadContext<'a> {
    pub(crate) job_id: &'a str,
    pub(crate) filename: &'a str,
    pub(crate) route: Strategy,
}

/// Pair each chunk with its vector, producing points keyed by `(job_id, chunk_id)`.
pub(crate) fn build_points(
    context: &PayloadContext<'_>,
    chunks: &[ChunkRecord],
    vectors: Vec<Vec<f32>>,
) -> Vec<PointInsert> {
    let indexed_at = current_timestamp_rfc3339();
    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| PointInsert {
            id: point_id_for(context.job_id, chunk.chunk_id),
            vector,
            payload: ChunkPayload {
                job_id: context.job_id.to_string(),
                filename: context.filename.to_string(),
                route: context.route.as_str().to_string(),
                chunk_index: chunk.chunk_id,
                chunk_id: chunk.chunk_id,
                text: chunk.text.clone(),
                page: chunk.page,
                start: chunk.start,
                end: chunk.end,
                used_route: chunk.used_route.as_str().to_string(),
                ocr_score: chunk.ocr_score,
                chunk_hash: compute_content_hash(chunk.text.as_bytes()),
                indexed_at: indexed_at.clone(),
            },
        })
        .collect()
}

pub(crate) fn to_graph_chunk(chunk: &ChunkRecord) -> GraphChunk {
    GraphChunk {
        chunk_id: chunk.chunk_id,
        text: chunk.text.clone(),
        qdrant_point_id: chunk.qdrant_point_id.clone(),
        page: chunk.page,
        start: chunk.start,
        end: chunk.end,
    }
}

/// Context block handed to the text generator, one labelled section per hit.
pub(crate) fn graphrag_context(hits: &[GraphHit]) -> String {
    hits.iter()
        .map(|hit| format!("[{}#chunk{}]\n{}", hit.filename, hit.chunk_id, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn graphrag_prompt(keyword: &str, context: &str) -> String {
    format!(
        "你是一個文件助理。\n\
         根據以下內容回答問題；若內容不足請說明。\n\n\
         問題：請解釋與「{keyword}」相關的內容\n\n\
         內容：\n{context}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(chunk_id: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id,
            page: 2,
            start: 10,
            end: 10 + text.len(),
            text: text.to_string(),
            qdrant_point_id: None,
            used_route: Strategy::Vision,
            ocr_score: Some(0.3),
        }
    }

    #[test]
    fn points_carry_page_metadata_and_stable_ids() {
        let context = PayloadContext {
            job_id: "job-9",
            filename: "scan.pdf",
            route: Strategy::Structured,
        };
        let chunks = vec![chunk(0, "alpha"), chunk(1, "beta")];

        let points = build_points(&context, &chunks, vec![vec![0.1], vec![0.2]]);

        assert_eq!(points.len(), 2);
        assert_eq!(points[1].id, point_id_for("job-9", 1));
        let payload = &points[1].payload;
        assert_eq!(payload.route, "structured");
        assert_eq!(payload.used_route, "vision");
        assert_eq!(payload.ocr_score, Some(0.3));
        assert_eq!(payload.page, 2);
        assert_eq!(payload.chunk_hash, compute_content_hash(b"beta"));
    }

    #[test]
    fn short_vector_list_limits_points() {
        let context = PayloadContext {
            job_id: "job-9",
            filename: "scan.pdf",
            route: Strategy::Ocr,
        };
        let chunks = vec![chunk(0, "alpha"), chunk(1, "beta"), chunk(2, "gamma")];
        let points = build_points(&context, &chunks, vec![vec![0.1]]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].payload.chunk_index, 0);
    }

    #[test]
    fn graph_chunks_keep_point_ids() {
        let mut record = chunk(4, "delta");
        record.qdrant_point_id = Some("pid".into());
        let node = to_graph_chunk(&record);
        assert_eq!(node.chunk_id, 4);
        assert_eq!(node.qdrant_point_id.as_deref(), Some("pid"));
    }

    #[test]
    fn context_labels_each_hit() {
        let hits = vec![
            GraphHit {
                filename: "a.pdf".into(),
                chunk_id: 0,
                text: "first".into(),
                qdrant_point_id: None,
            },
            GraphHit {
                filename: "b.pdf".into(),
                chunk_id: 3,
                text: "second".into(),
                qdrant_point_id: None,
            },
        ];
        assert_eq!(
            graphrag_context(&hits),
            "[a.pdf#chunk0]\nfirst\n\n[b.pdf#chunk3]\nsecond"
        );
        let prompt = graphrag_prompt("invoice", "ctx");
        assert!(prompt.starts_with("你是一個文件助理。\n"));
        assert!(prompt.contains("問題：請解釋與「invoice」相關的內容\n\n"));
        assert!(prompt.ends_with("內容：\nctx\n"));
    }
}
