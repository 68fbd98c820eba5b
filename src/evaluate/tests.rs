use super::*;

fn record(base_id: &str, abstract_text: &str, category: &str, published_at: &str) -> CanonicalRecord {
    CanonicalRecord {
        arxiv_id: format!("{base_id}v1"),
        base_id: base_id.to_string(),
        version: 1,
        title: format!("Paper {base_id}"),
        abstract_text: abstract_text.to_string(),
        authors: vec!["Author".to_string()],
        primary_category: category.to_string(),
        categories: vec![category.to_string()],
        published_at: published_at.to_string(),
        updated_at: published_at.to_string(),
        link_abs: format!("https://arxiv.org/abs/{base_id}"),
        link_pdf: format!("https://arxiv.org/pdf/{base_id}.pdf"),
        ingest_snapshot: "snap".to_string(),
    }
}

#[test]
fn metrics_are_bounded_and_cover_test_categories() {
    let rows = vec![
        record(
            "1111.0001",
            "neural networks for image recognition",
            "cs.CV",
            "2024-01-01T00:00:00Z",
        ),
        record(
            "1111.0002",
            "transformer language models for translation",
            "cs.CL",
            "2024-01-02T00:00:00Z",
        ),
        record(
            "1111.0003",
            "image segmentation with convolutional networks",
            "cs.CV",
            "2024-01-03T00:00:00Z",
        ),
        record(
            "1111.0004",
            "image recognition using deep convolutional networks",
            "cs.CV",
            "2024-01-04T00:00:00Z",
        ),
    ];

    let outcome = evaluate(&rows, 2, 0.75).expect("evaluate");

    assert_eq!(outcome.train_size, 3);
    assert_eq!(outcome.test_size, 1);
    assert!((0.0..=1.0).contains(&outcome.overall.hit_rate));
    assert!((0.0..=1.0).contains(&outcome.overall.ndcg));
    assert!(outcome.by_category.contains_key("cs.CV"));
    for group in outcome.by_category.values() {
        assert!((0.0..=1.0).contains(&group.hit_rate));
        assert!((0.0..=1.0).contains(&group.ndcg));
    }
}

#[test]
fn matching_vocabulary_ranks_same_category_first() {
    let rows = vec![
        record(
            "2222.0001",
            "robot arm grasping and manipulation planning",
            "cs.RO",
            "2024-01-01T00:00:00Z",
        ),
        record(
            "2222.0002",
            "quantum error correction codes for qubits",
            "quant-ph",
            "2024-01-02T00:00:00Z",
        ),
        record(
            "2222.0003",
            "grasping and manipulation with a robot arm",
            "cs.RO",
            "2024-01-03T00:00:00Z",
        ),
    ];

    let outcome = evaluate(&rows, 1, 0.67).expect("evaluate");

    // The held-out robotics query shares its vocabulary with the robotics
    // training document, so the single retrieved neighbor is relevant.
    assert!((outcome.overall.hit_rate - 1.0).abs() < 1e-9);
    assert!((outcome.overall.ndcg - 1.0).abs() < 1e-9);
}

#[test]
fn unparseable_dates_are_dropped_before_splitting() {
    let rows = vec![
        record("3333.0001", "valid abstract one", "cs.AI", "2024-01-01T00:00:00Z"),
        record("3333.0002", "valid abstract two", "cs.AI", "not-a-date"),
        record("3333.0003", "valid abstract three", "cs.AI", "2024-01-03T00:00:00Z"),
    ];

    let outcome = evaluate(&rows, 2, 0.5).expect("evaluate");
    assert_eq!(outcome.train_size + outcome.test_size, 2);
}

#[test]
fn too_few_dated_records_is_an_error() {
    let rows = vec![record("4444.0001", "lonely abstract", "cs.AI", "2024-01-01T00:00:00Z")];
    let err = evaluate(&rows, 5, 0.8).expect_err("must fail");
    match err {
        HubError::Malformed(message) => assert!(message.contains("at least 2")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn split_keeps_at_least_one_row_on_each_side() {
    let rows = vec![
        record("5555.0001", "first abstract text", "cs.AI", "2024-01-01T00:00:00Z"),
        record("5555.0002", "second abstract text", "cs.AI", "2024-01-02T00:00:00Z"),
    ];

    let extreme_high = evaluate(&rows, 1, 1.0).expect("evaluate");
    assert_eq!(extreme_high.train_size, 1);
    assert_eq!(extreme_high.test_size, 1);

    let extreme_low = evaluate(&rows, 1, 0.0).expect("evaluate");
    assert_eq!(extreme_low.train_size, 1);
    assert_eq!(extreme_low.test_size, 1);
}

#[test]
fn empty_query_category_yields_no_relevant_neighbors() {
    let rows = vec![
        record("6666.0001", "shared vocabulary terms here", "cs.AI", "2024-01-01T00:00:00Z"),
        record("6666.0002", "shared vocabulary terms here", "cs.AI", "2024-01-02T00:00:00Z"),
        record("6666.0003", "shared vocabulary terms here", "", "2024-01-03T00:00:00Z"),
    ];

    let outcome = evaluate(&rows, 2, 0.67).expect("evaluate");
    assert_eq!(outcome.overall.hit_rate, 0.0);
    assert_eq!(outcome.overall.ndcg, 0.0);
}

#[test]
fn ndcg_rewards_relevant_results_ranked_earlier() {
    let early = ndcg(&[1, 0]);
    let late = ndcg(&[0, 1]);
    assert!((early - 1.0).abs() < 1e-9);
    assert!(late < early);
    assert!(late > 0.0);
}

#[test]
fn tokenizer_drops_stop_words_and_short_tokens() {
    let tokens = tokenize("The cat is on a mat, obviously!");
    assert_eq!(tokens, vec!["cat", "mat", "obviously"]);
}
