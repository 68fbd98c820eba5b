use super::*;

pub(crate) fn metadata(title: &str, category: &str, snapshot: &str) -> ItemMetadata {
    ItemMetadata {
        title: title.to_string(),
        abstract_text: format!("{title} abstract"),
        authors: vec!["Author".to_string()],
        primary_category: category.to_string(),
        categories: vec![category.to_string()],
        published_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:00:00Z".to_string(),
        link_abs: "https://arxiv.org/abs/0000.0000".to_string(),
        link_pdf: "https://arxiv.org/pdf/0000.0000.pdf".to_string(),
        ingest_snapshot: snapshot.to_string(),
    }
}

fn item(id: &str, vector: Vec<f32>) -> IndexItem {
    IndexItem {
        id: id.to_string(),
        vector,
        metadata: metadata(id, "cs.AI", "snap"),
    }
}

#[test]
fn memory_index_ranks_by_distance() {
    let index = MemoryVectorIndex::new();
    index
        .upsert(&[
            item("identical", vec![1.0, 0.0]),
            item("close", vec![0.9, 0.1]),
            item("orthogonal", vec![0.0, 1.0]),
        ])
        .expect("upsert");

    let neighbors = index.search(&[1.0, 0.0], 2).expect("search");
    assert_eq!(neighbors.len(), 2);
    assert_eq!(neighbors[0].id, "identical");
    assert_eq!(neighbors[1].id, "close");
    assert!(neighbors[0].distance < neighbors[1].distance);
    assert!(neighbors[0].metadata.is_some());
}

#[test]
fn memory_index_upsert_overwrites() {
    let index = MemoryVectorIndex::new();
    index.upsert(&[item("a", vec![1.0, 0.0])]).expect("upsert");
    index.upsert(&[item("a", vec![0.0, 1.0])]).expect("upsert");

    assert_eq!(index.len(), 1);
    let fetched = index.fetch(&["a".to_string()]).expect("fetch");
    assert_eq!(fetched["a"].vector, vec![0.0, 1.0]);
}

#[test]
fn memory_index_fetch_skips_missing_ids() {
    let index = MemoryVectorIndex::new();
    index.upsert(&[item("present", vec![1.0])]).expect("upsert");

    let fetched = index
        .fetch(&["present".to_string(), "absent".to_string()])
        .expect("fetch");
    assert_eq!(fetched.len(), 1);
    assert!(fetched.contains_key("present"));
}

#[test]
fn neighbor_result_serializes_metadata_with_abstract_key() {
    let neighbor = NeighborResult {
        id: "1234.5678".to_string(),
        distance: 0.25,
        metadata: Some(metadata("Paper", "cs.AI", "snap")),
    };
    let json = serde_json::to_value(&neighbor).expect("serialize");
    assert_eq!(json["metadata"]["abstract"], "Paper abstract");
    assert_eq!(json["distance"], 0.25);
}
