// Canonical record columnar I/O
// One row per unique base identifier per snapshot, persisted as parquet.
// Authors and categories are JSON-encoded strings so the arrow schema stays
// flat; query-time consumers decode them back into lists.

use std::sync::Arc;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::{HubError, Result};

/// Deduplicated, validated, latest-version row for one paper.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub arxiv_id: String,
    pub base_id: String,
    pub version: i64,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub primary_category: String,
    pub categories: Vec<String>,
    pub published_at: String,
    pub updated_at: String,
    pub link_abs: String,
    pub link_pdf: String,
    /// Provenance pointer back to the harvest manifest this row came from.
    pub ingest_snapshot: String,
}

fn record_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("arxiv_id", DataType::Utf8, false),
        Field::new("base_id", DataType::Utf8, false),
        Field::new("version", DataType::Int64, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("abstract", DataType::Utf8, false),
        Field::new("authors", DataType::Utf8, false),
        Field::new("primary_category", DataType::Utf8, false),
        Field::new("categories", DataType::Utf8, false),
        Field::new("published_at", DataType::Utf8, false),
        Field::new("updated_at", DataType::Utf8, false),
        Field::new("link_abs", DataType::Utf8, false),
        Field::new("link_pdf", DataType::Utf8, false),
        Field::new("ingest_snapshot", DataType::Utf8, false),
    ]))
}

/// Serialize records into parquet bytes.
#[inline]
pub fn to_parquet_bytes(records: &[CanonicalRecord]) -> Result<Vec<u8>> {
    let schema = record_schema();

    let json_list = |items: &[String]| -> Result<String> {
        serde_json::to_string(items)
            .map_err(|e| HubError::Storage(format!("failed to encode list column: {e}")))
    };

    let mut authors = Vec::with_capacity(records.len());
    let mut categories = Vec::with_capacity(records.len());
    for record in records {
        authors.push(json_list(&record.authors)?);
        categories.push(json_list(&record.categories)?);
    }

    let string_column = |extract: fn(&CanonicalRecord) -> &str| -> Arc<StringArray> {
        Arc::new(StringArray::from(
            records.iter().map(extract).collect::<Vec<_>>(),
        ))
    };

    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            string_column(|record| &record.arxiv_id),
            string_column(|record| &record.base_id),
            Arc::new(Int64Array::from(
                records.iter().map(|record| record.version).collect::<Vec<_>>(),
            )),
            string_column(|record| &record.title),
            string_column(|record| &record.abstract_text),
            Arc::new(StringArray::from(authors)),
            string_column(|record| &record.primary_category),
            Arc::new(StringArray::from(categories)),
            string_column(|record| &record.published_at),
            string_column(|record| &record.updated_at),
            string_column(|record| &record.link_abs),
            string_column(|record| &record.link_pdf),
            string_column(|record| &record.ingest_snapshot),
        ],
    )
    .map_err(|e| HubError::Storage(format!("failed to build record batch: {e}")))?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)
        .map_err(|e| HubError::Storage(format!("failed to create parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| HubError::Storage(format!("failed to write parquet batch: {e}")))?;
    writer
        .close()
        .map_err(|e| HubError::Storage(format!("failed to finish parquet file: {e}")))?;
    Ok(buffer)
}

/// Deserialize records from parquet bytes.
#[inline]
pub fn from_parquet_bytes(data: &[u8]) -> Result<Vec<CanonicalRecord>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(data))
        .map_err(|e| HubError::Storage(format!("failed to open parquet data: {e}")))?
        .build()
        .map_err(|e| HubError::Storage(format!("failed to read parquet data: {e}")))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch =
            batch.map_err(|e| HubError::Storage(format!("failed to decode parquet batch: {e}")))?;
        decode_batch(&batch, &mut records)?;
    }
    Ok(records)
}

fn decode_batch(batch: &RecordBatch, records: &mut Vec<CanonicalRecord>) -> Result<()> {
    let strings = |name: &str| -> Result<&StringArray> {
        batch
            .column_by_name(name)
            .and_then(|column| column.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| HubError::Storage(format!("missing string column '{name}'")))
    };
    let versions = batch
        .column_by_name("version")
        .and_then(|column| column.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| HubError::Storage("missing int column 'version'".to_string()))?;

    let arxiv_ids = strings("arxiv_id")?;
    let base_ids = strings("base_id")?;
    let titles = strings("title")?;
    let abstracts = strings("abstract")?;
    let authors = strings("authors")?;
    let primary_categories = strings("primary_category")?;
    let categories = strings("categories")?;
    let published = strings("published_at")?;
    let updated = strings("updated_at")?;
    let links_abs = strings("link_abs")?;
    let links_pdf = strings("link_pdf")?;
    let snapshots = strings("ingest_snapshot")?;

    let decode_list = |raw: &str| -> Result<Vec<String>> {
        serde_json::from_str(raw)
            .map_err(|e| HubError::Storage(format!("invalid list column value '{raw}': {e}")))
    };

    for row in 0..batch.num_rows() {
        records.push(CanonicalRecord {
            arxiv_id: arxiv_ids.value(row).to_string(),
            base_id: base_ids.value(row).to_string(),
            version: versions.value(row),
            title: titles.value(row).to_string(),
            abstract_text: abstracts.value(row).to_string(),
            authors: decode_list(authors.value(row))?,
            primary_category: primary_categories.value(row).to_string(),
            categories: decode_list(categories.value(row))?,
            published_at: published.value(row).to_string(),
            updated_at: updated.value(row).to_string(),
            link_abs: links_abs.value(row).to_string(),
            link_pdf: links_pdf.value(row).to_string(),
            ingest_snapshot: snapshots.value(row).to_string(),
        });
    }
    Ok(())
}
