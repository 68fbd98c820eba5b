use super::*;

fn record(base_id: &str, category: &str) -> CanonicalRecord {
    CanonicalRecord {
        arxiv_id: format!("{base_id}v1"),
        base_id: base_id.to_string(),
        version: 1,
        title: "Title".to_string(),
        abstract_text: "Abstract".to_string(),
        authors: vec![],
        primary_category: category.to_string(),
        categories: vec![category.to_string()],
        published_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:00:00Z".to_string(),
        link_abs: String::new(),
        link_pdf: String::new(),
        ingest_snapshot: "snap".to_string(),
    }
}

#[test]
fn large_share_changes_are_flagged() {
    let reference = vec![
        record("1", "cs.AI"),
        record("2", "cs.AI"),
        record("3", "cs.CV"),
    ];
    let new = vec![
        record("4", "cs.AI"),
        record("5", "cs.CV"),
        record("6", "cs.CV"),
    ];

    let report = check_drift(&reference, &new, 0.1);

    let expected_diff = 1.0 / 3.0;
    assert!((report.scores["cs.AI"] - expected_diff).abs() < 1e-9);
    assert!((report.scores["cs.CV"] - expected_diff).abs() < 1e-9);
    assert_eq!(report.flagged, vec!["cs.AI", "cs.CV"]);
}

#[test]
fn stable_distributions_are_not_flagged() {
    let reference = vec![record("1", "cs.AI"), record("2", "cs.CV")];
    let new = vec![record("3", "cs.AI"), record("4", "cs.CV")];

    let report = check_drift(&reference, &new, 0.2);
    assert!(report.flagged.is_empty());
    assert!(report.scores.values().all(|diff| *diff == 0.0));
}

#[test]
fn union_covers_categories_absent_from_one_side() {
    let reference = vec![record("1", "cs.AI")];
    let new = vec![record("2", "cs.RO")];

    let report = check_drift(&reference, &new, 0.5);
    assert_eq!(report.scores.len(), 2);
    assert!((report.scores["cs.AI"] - 1.0).abs() < 1e-9);
    assert!((report.scores["cs.RO"] - 1.0).abs() < 1e-9);
    assert_eq!(report.flagged, vec!["cs.AI", "cs.RO"]);
}

#[test]
fn empty_primary_category_counts_as_unknown() {
    let reference = vec![record("1", "")];
    let new = vec![record("2", "")];

    let report = check_drift(&reference, &new, 0.2);
    assert!(report.scores.contains_key("<unknown>"));
    assert!(report.flagged.is_empty());
}
