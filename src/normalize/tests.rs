use super::*;
use crate::harvest::HarvestManifest;
use crate::storage::{BlobStore, LocalBlobStore};
use tempfile::TempDir;

fn write_manifest(store: &LocalBlobStore, snapshot: &str, pages: usize) {
    let manifest = HarvestManifest {
        snapshot: snapshot.to_string(),
        search_query: "(cat:cs.AI)".to_string(),
        pages,
        count: 0,
        duration_seconds: 0.1,
        bucket: "bucket".to_string(),
        prefix: format!("harvest/{snapshot}"),
        mode: "incremental".to_string(),
        categories: vec!["cs.AI".to_string()],
        start_offset_days: 1,
    };
    store
        .put_json(&format!("harvest/{snapshot}/manifest.json"), &manifest)
        .expect("manifest");
}

fn entry_xml(id: &str, title: &str, summary: &str, published: &str, category: &str) -> String {
    format!(
        r#"<entry>
            <id>http://arxiv.org/abs/{id}</id>
            <title>{title}</title>
            <summary>{summary}</summary>
            <published>{published}</published>
            <updated>{published}</updated>
            <category term="{category}" />
        </entry>"#
    )
}

fn feed_xml(entries: &[String]) -> String {
    format!(
        r#"<feed xmlns="http://www.w3.org/2005/Atom">{}</feed>"#,
        entries.join("")
    )
}

#[test]
fn dedup_keeps_highest_version() {
    let dir = TempDir::new().expect("tempdir");
    let store = LocalBlobStore::new(dir.path());
    write_manifest(&store, "snap", 1);

    let xml = feed_xml(&[
        entry_xml(
            "1234.5678v1",
            "First Paper",
            "First abstract",
            "2024-01-01T00:00:00Z",
            "cs.AI",
        ),
        entry_xml(
            "1234.5678v2",
            "First Paper Revision",
            "Revised abstract",
            "2024-01-02T00:00:00Z",
            "cs.AI",
        ),
        entry_xml(
            "2345.6789v1",
            "Second Paper",
            "Second abstract",
            "2024-01-03T00:00:00Z",
            "cs.CV",
        ),
    ]);
    store
        .put_text("harvest/snap/page_00000.xml", &xml)
        .expect("page");

    let output = normalize(&store, "snap", None).expect("normalize");
    assert_eq!(output, "normalized/snap/records.parquet");

    let data = store.get_bytes(&output).expect("read output");
    let records = records::from_parquet_bytes(&data).expect("decode");
    assert_eq!(records.len(), 2);

    let first = records
        .iter()
        .find(|record| record.base_id == "1234.5678")
        .expect("deduped record");
    assert_eq!(first.version, 2);
    assert_eq!(first.title, "First Paper Revision");
    assert_eq!(first.abstract_text, "Revised abstract");
    assert_eq!(first.ingest_snapshot, "snap");
    // Missing links default from the base identifier.
    assert_eq!(first.link_abs, "https://arxiv.org/abs/1234.5678");
    assert_eq!(first.link_pdf, "https://arxiv.org/pdf/1234.5678.pdf");

    let categories: Vec<&str> = records
        .iter()
        .map(|record| record.primary_category.as_str())
        .collect();
    assert!(categories.contains(&"cs.AI"));
    assert!(categories.contains(&"cs.CV"));
}

#[test]
fn dedup_spans_pages_and_ties_are_last_seen() {
    let dir = TempDir::new().expect("tempdir");
    let store = LocalBlobStore::new(dir.path());
    write_manifest(&store, "snap", 2);

    store
        .put_text(
            "harvest/snap/page_00000.xml",
            &feed_xml(&[entry_xml(
                "1111.2222v1",
                "Early page copy",
                "abstract one",
                "2024-02-01T00:00:00Z",
                "cs.AI",
            )]),
        )
        .expect("page");
    store
        .put_text(
            "harvest/snap/page_00001.xml",
            &feed_xml(&[entry_xml(
                "1111.2222v1",
                "Later page copy",
                "abstract two",
                "2024-02-01T00:00:00Z",
                "cs.AI",
            )]),
        )
        .expect("page");

    let output = normalize(&store, "snap", None).expect("normalize");
    let records =
        records::from_parquet_bytes(&store.get_bytes(&output).expect("read")).expect("decode");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Later page copy");
}

#[test]
fn empty_abstract_fails_before_write() {
    let dir = TempDir::new().expect("tempdir");
    let store = LocalBlobStore::new(dir.path());
    write_manifest(&store, "snap", 1);

    store
        .put_text(
            "harvest/snap/page_00000.xml",
            &feed_xml(&[entry_xml(
                "1234.5678v1",
                "Paper",
                "",
                "2024-01-01T00:00:00Z",
                "cs.AI",
            )]),
        )
        .expect("page");

    let err = normalize(&store, "snap", None).expect_err("must fail");
    assert!(matches!(err, crate::HubError::Consistency(_)));
    assert!(store.get_bytes("normalized/snap/records.parquet").is_err());
}

#[test]
fn unparseable_published_at_fails_before_write() {
    let dir = TempDir::new().expect("tempdir");
    let store = LocalBlobStore::new(dir.path());
    write_manifest(&store, "snap", 1);

    store
        .put_text(
            "harvest/snap/page_00000.xml",
            &feed_xml(&[entry_xml(
                "1234.5678v1",
                "Paper",
                "Fine abstract",
                "not-a-date",
                "cs.AI",
            )]),
        )
        .expect("page");

    let err = normalize(&store, "snap", None).expect_err("must fail");
    assert!(matches!(err, crate::HubError::Consistency(_)));
    assert!(store.get_bytes("normalized/snap/records.parquet").is_err());
}

#[test]
fn output_blob_override_is_respected() {
    let dir = TempDir::new().expect("tempdir");
    let store = LocalBlobStore::new(dir.path());
    write_manifest(&store, "snap", 1);
    store
        .put_text(
            "harvest/snap/page_00000.xml",
            &feed_xml(&[entry_xml(
                "1234.5678v1",
                "Paper",
                "Fine abstract",
                "2024-01-01T00:00:00Z",
                "cs.AI",
            )]),
        )
        .expect("page");

    let output = normalize(&store, "snap", Some("normalized/custom.parquet")).expect("normalize");
    assert_eq!(output, "normalized/custom.parquet");
    assert!(store.get_bytes("normalized/custom.parquet").is_ok());
}

#[test]
fn parquet_round_trip_preserves_lists() {
    let record = CanonicalRecord {
        arxiv_id: "1234.5678v2".to_string(),
        base_id: "1234.5678".to_string(),
        version: 2,
        title: "Title".to_string(),
        abstract_text: "Abstract".to_string(),
        authors: vec!["A. Author".to_string(), "B. Author".to_string()],
        primary_category: "cs.AI".to_string(),
        categories: vec!["cs.AI".to_string(), "cs.LG".to_string()],
        published_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-02T00:00:00Z".to_string(),
        link_abs: "https://arxiv.org/abs/1234.5678".to_string(),
        link_pdf: "https://arxiv.org/pdf/1234.5678.pdf".to_string(),
        ingest_snapshot: "snap".to_string(),
    };

    let data = records::to_parquet_bytes(std::slice::from_ref(&record)).expect("encode");
    let decoded = records::from_parquet_bytes(&data).expect("decode");
    assert_eq!(decoded, vec![record]);
}
