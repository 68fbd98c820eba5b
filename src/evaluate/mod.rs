// Offline retrieval evaluation
// Chronological train/test split over a canonical snapshot, a TF-IDF sparse
// index over training abstracts, and hit-rate / nDCG against same-category
// relevance, overall and per query category.

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};

use chrono::DateTime;
use tracing::{debug, info};

use crate::normalize::CanonicalRecord;
use crate::{HubError, Result};

pub const DEFAULT_K: usize = 10;
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Words ignored by the abstract tokenizer.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "was", "we", "with",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricGroup {
    /// Fraction of queries with at least one relevant neighbor.
    pub hit_rate: f64,
    pub ndcg: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub overall: MetricGroup,
    pub by_category: BTreeMap<String, MetricGroup>,
    pub train_size: usize,
    pub test_size: usize,
}

/// Evaluate retrieval quality over one canonical snapshot.
///
/// Rows with unparseable publish timestamps are dropped before the split;
/// the earliest `train_fraction` of the remainder trains the index and the
/// rest queries it. A neighbor is relevant iff its primary category equals
/// the query's non-empty primary category.
#[inline]
pub fn evaluate(
    rows: &[CanonicalRecord],
    k: usize,
    train_fraction: f64,
) -> Result<EvaluationOutcome> {
    let (train, test) = chronological_split(rows, train_fraction)?;
    info!("Evaluation split: train={} test={}", train.len(), test.len());

    let index = TfIdfIndex::build(&train);

    let mut overall: Vec<Vec<u32>> = Vec::new();
    let mut per_category: BTreeMap<String, Vec<Vec<u32>>> = BTreeMap::new();

    for query in &test {
        if query.abstract_text.trim().is_empty() {
            continue;
        }
        let neighbors = index.top_k(&query.abstract_text, k);
        let category = &query.primary_category;
        let relevances: Vec<u32> = neighbors
            .iter()
            .map(|train_row| {
                u32::from(!category.is_empty() && train[*train_row].primary_category == *category)
            })
            .collect();
        per_category
            .entry(category.clone())
            .or_default()
            .push(relevances.clone());
        overall.push(relevances);
    }

    let outcome = EvaluationOutcome {
        overall: metric_group(&overall),
        by_category: per_category
            .into_iter()
            .map(|(category, relevances)| (category, metric_group(&relevances)))
            .collect(),
        train_size: train.len(),
        test_size: test.len(),
    };
    info!(
        "Overall hit_rate@{k}={:.4} ndcg@{k}={:.4}",
        outcome.overall.hit_rate, outcome.overall.ndcg
    );
    Ok(outcome)
}

/// Sort by publish timestamp and split with at least one row on each side.
fn chronological_split(
    rows: &[CanonicalRecord],
    train_fraction: f64,
) -> Result<(Vec<CanonicalRecord>, Vec<CanonicalRecord>)> {
    let mut dated: Vec<(i64, &CanonicalRecord)> = rows
        .iter()
        .filter_map(|row| {
            DateTime::parse_from_rfc3339(&row.published_at)
                .ok()
                .map(|timestamp| (timestamp.timestamp(), row))
        })
        .collect();
    if dated.len() < 2 {
        return Err(HubError::Malformed(format!(
            "evaluation needs at least 2 dated records, found {}",
            dated.len()
        )));
    }
    dated.sort_by_key(|(timestamp, _)| *timestamp);

    let split_at = ((dated.len() as f64 * train_fraction) as usize)
        .max(1)
        .min(dated.len() - 1);
    debug!("Chronological split at index {split_at} of {}", dated.len());

    let train = dated
        .iter()
        .take(split_at)
        .map(|(_, row)| (*row).clone())
        .collect();
    let test = dated
        .iter()
        .skip(split_at)
        .map(|(_, row)| (*row).clone())
        .collect();
    Ok((train, test))
}

/// Sparse TF-IDF index over training abstracts with smoothed idf and
/// l2-normalized document vectors.
struct TfIdfIndex {
    idf: HashMap<String, f64>,
    documents: Vec<HashMap<String, f64>>,
}

impl TfIdfIndex {
    fn build(train: &[CanonicalRecord]) -> Self {
        let tokenized: Vec<Vec<String>> = train
            .iter()
            .map(|row| tokenize(&row.abstract_text))
            .collect();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&String> = tokens.iter().collect();
            seen.sort();
            seen.dedup();
            for token in seen {
                *document_frequency.entry(token.clone()).or_insert(0) += 1;
            }
        }

        let document_count = train.len() as f64;
        let idf: HashMap<String, f64> = document_frequency
            .into_iter()
            .map(|(token, frequency)| {
                let value = ((1.0 + document_count) / (1.0 + frequency as f64)).ln() + 1.0;
                (token, value)
            })
            .collect();

        let documents = tokenized
            .iter()
            .map(|tokens| vectorize(tokens, &idf))
            .collect();
        Self { idf, documents }
    }

    /// Indices of the top-k training documents by cosine similarity.
    fn top_k(&self, query_text: &str, k: usize) -> Vec<usize> {
        let query = vectorize(&tokenize(query_text), &self.idf);
        let mut scored: Vec<(usize, f64)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(position, document)| (position, dot(&query, document)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored.into_iter().map(|(position, _)| position).collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 1 && !STOP_WORDS.contains(token))
        .map(ToString::to_string)
        .collect()
}

/// l2-normalized tf-idf vector for one token list.
fn vectorize(tokens: &[String], idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    let mut weights: HashMap<String, f64> = HashMap::new();
    for token in tokens {
        if let Some(token_idf) = idf.get(token) {
            *weights.entry(token.clone()).or_insert(0.0) += token_idf;
        }
    }
    let norm = weights.values().map(|value| value * value).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in weights.values_mut() {
            *value /= norm;
        }
    }
    weights
}

fn dot(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(token, value)| large.get(token).map(|other| value * other))
        .sum()
}

fn metric_group(relevances: &[Vec<u32>]) -> MetricGroup {
    if relevances.is_empty() {
        return MetricGroup {
            hit_rate: 0.0,
            ndcg: 0.0,
        };
    }
    let hits = relevances
        .iter()
        .filter(|query| query.iter().any(|rel| *rel > 0))
        .count();
    let ndcg_sum: f64 = relevances.iter().map(|query| ndcg(query)).sum();
    MetricGroup {
        hit_rate: hits as f64 / relevances.len() as f64,
        ndcg: ndcg_sum / relevances.len() as f64,
    }
}

fn dcg(relevances: &[u32]) -> f64 {
    relevances
        .iter()
        .enumerate()
        .map(|(rank, rel)| {
            (f64::from(2u32.pow(*rel)) - 1.0) / ((rank as f64 + 2.0).log2())
        })
        .sum()
}

fn ndcg(relevances: &[u32]) -> f64 {
    if relevances.is_empty() {
        return 0.0;
    }
    let mut ideal = relevances.to_vec();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let ideal_dcg = dcg(&ideal);
    if ideal_dcg == 0.0 {
        return 0.0;
    }
    dcg(relevances) / ideal_dcg
}
