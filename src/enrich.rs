use crate::cache::CacheStore;
use crate::extract::Extractor;
use crate::models::{CatalogRow, EnrichMode, EnrichSummary};
use crate::probe::Prechecker;
use crate::reconcile::{Reconciled, reconcile};
use crate::schema::{AttributeBag, lookup, template};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub mode: EnrichMode,
    /// Fixed delay between successive inference calls. A courtesy to the
    /// provider, not a correctness mechanism.
    pub pacing: Duration,
    /// Checkpoint the output buffer after this many new records.
    pub checkpoint_every: usize,
    pub checkpoint_path: Option<PathBuf>,
}

impl EnrichOptions {
    pub fn from_env(mode: EnrichMode) -> Self {
        let pacing_ms = std::env::var("ROW_PACING_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(100);
        let checkpoint_every = std::env::var("CHECKPOINT_EVERY_ROWS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(20);
        let checkpoint_path = std::env::var("CHECKPOINT_PATH").ok().map(PathBuf::from);
        Self {
            mode,
            pacing: Duration::from_millis(pacing_ms),
            checkpoint_every,
            checkpoint_path,
        }
    }
}

/// Drives the per-row pipeline (probe, extract, reconcile) over a corpus and
/// left-merges the results back in. Owns its transport, probe and cache for
/// the lifetime of one run.
pub struct Enricher<E, P> {
    extractor: E,
    probe: P,
    cache: Option<CacheStore>,
}

impl<E: Extractor, P: Prechecker> Enricher<E, P> {
    pub fn new(extractor: E, probe: P, cache: Option<CacheStore>) -> Self {
        Self {
            extractor,
            probe,
            cache,
        }
    }

    /// Enriches `corpus` in place and reports outcome counters. Row-level
    /// failures are counted and logged, never propagated; the merged corpus
    /// is always produced, with partial coverage on a bad day.
    pub async fn enrich(
        &mut self,
        corpus: Vec<CatalogRow>,
        options: &EnrichOptions,
    ) -> (Vec<CatalogRow>, EnrichSummary) {
        let mut summary = EnrichSummary {
            mode: Some(options.mode),
            rows_total: corpus.len(),
            started_at: Some(Utc::now()),
            ..EnrichSummary::default()
        };

        let mut rows = deduplicate(corpus);
        summary.rows_deduplicated = summary.rows_total - rows.len();
        self.classify_untagged(&mut rows, options, &mut summary).await;

        let mut buffer: Vec<(String, AttributeBag)> = Vec::new();
        let mut since_checkpoint = 0usize;

        for (tag, indexes) in group_by_meta(&rows) {
            let template = match lookup(&tag) {
                Ok(template) => template,
                Err(err) => {
                    warn!(
                        target = "stylist.enrich",
                        tag = %tag,
                        rows = indexes.len(),
                        "skipping group: {err}"
                    );
                    summary.rows_skipped_unknown_meta += indexes.len();
                    continue;
                }
            };
            let cache_key = match self.cache.as_mut() {
                Some(store) => match store.ensure(template.metacategory_name) {
                    Ok(key) => Some(key.to_string()),
                    Err(err) => {
                        warn!(target = "stylist.enrich", "cache id unavailable: {err}");
                        None
                    }
                },
                None => None,
            };

            for index in indexes {
                let row = &rows[index];
                if already_enriched(row, options.mode) {
                    summary.rows_already_enriched += 1;
                    continue;
                }

                let extracted = match options.mode {
                    EnrichMode::Text => {
                        if row.name.trim().is_empty() {
                            summary.rows_skipped_no_name += 1;
                            continue;
                        }
                        self.extractor
                            .extract_from_text(&row.name, template, cache_key.as_deref())
                            .await
                    }
                    EnrichMode::Image => {
                        if row.image_url.trim().is_empty() {
                            summary.rows_skipped_no_asset += 1;
                            continue;
                        }
                        if !self.probe.is_reachable(&row.image_url).await {
                            summary.rows_skipped_unreachable += 1;
                            continue;
                        }
                        self.extractor
                            .extract_from_image(
                                &row.image_url,
                                &row.name,
                                template,
                                cache_key.as_deref(),
                            )
                            .await
                    }
                };

                match extracted {
                    Ok(bag) => {
                        let merged = match options.mode {
                            EnrichMode::Text => Reconciled::Keep(bag),
                            EnrichMode::Image => reconcile(row.extracted.clone(), Some(bag)),
                        };
                        match merged {
                            Reconciled::Keep(bag) => {
                                buffer.push((row.good_id.clone(), bag));
                                summary.rows_enriched += 1;
                                since_checkpoint += 1;
                            }
                            Reconciled::Dropped => summary.rows_dropped_missing_item += 1,
                        }
                    }
                    Err(err) => {
                        warn!(
                            target = "stylist.enrich",
                            good_id = %row.good_id,
                            "row extraction failed: {err}"
                        );
                        summary.rows_failed += 1;
                    }
                }

                if since_checkpoint >= options.checkpoint_every {
                    checkpoint(&buffer, options);
                    since_checkpoint = 0;
                }
                sleep(options.pacing).await;
            }
        }

        if since_checkpoint > 0 {
            checkpoint(&buffer, options);
        }
        merge(&mut rows, buffer);
        summary.finished_at = Some(Utc::now());
        info!(
            target = "stylist.enrich",
            enriched = summary.rows_enriched,
            failed = summary.rows_failed,
            "enrichment run finished"
        );
        (rows, summary)
    }

    /// Fills `meta_category` for rows the corpus export left untagged,
    /// classifying each from its name. Rows carrying an explicit tag are
    /// left alone even when the tag is unknown; those stay with the
    /// log-and-skip path. Classification failures leave the row untagged.
    async fn classify_untagged(
        &mut self,
        rows: &mut [CatalogRow],
        options: &EnrichOptions,
        summary: &mut EnrichSummary,
    ) {
        for row in rows.iter_mut() {
            let tagged = row
                .meta_category
                .as_deref()
                .map(str::trim)
                .is_some_and(|tag| !tag.is_empty());
            if tagged || row.name.trim().is_empty() {
                continue;
            }
            match self.extractor.classify_meta(&row.name).await {
                Ok(meta) => {
                    row.meta_category = Some(template(meta).metacategory_name.to_string());
                    summary.rows_classified += 1;
                }
                Err(err) => {
                    warn!(
                        target = "stylist.enrich",
                        good_id = %row.good_id,
                        "meta classification failed: {err}"
                    );
                }
            }
            sleep(options.pacing).await;
        }
    }
}

/// Idempotence policy: in text mode any existing record means the row is
/// done; in image mode only a record that went through image reconciliation
/// (it carries a verdict) counts.
fn already_enriched(row: &CatalogRow, mode: EnrichMode) -> bool {
    match (&row.extracted, mode) {
        (None, _) => false,
        (Some(_), EnrichMode::Text) => true,
        (Some(bag), EnrichMode::Image) => bag.verdict().is_some(),
    }
}

/// Drops duplicate rows by image URL, then by `(good_id, store_id)`,
/// keeping the first occurrence. Rows without an image URL are only subject
/// to the composite-key pass.
fn deduplicate(corpus: Vec<CatalogRow>) -> Vec<CatalogRow> {
    let mut seen_urls = HashSet::new();
    let mut seen_keys = HashSet::new();
    corpus
        .into_iter()
        .filter(|row| {
            let url = row.image_url.trim();
            if !url.is_empty() && !seen_urls.insert(url.to_string()) {
                return false;
            }
            seen_keys.insert((row.good_id.clone(), row.store_id.clone()))
        })
        .collect()
}

/// Groups row indexes by meta-category tag, preserving first-seen order of
/// both groups and rows. Grouping keeps same-schema calls adjacent so
/// provider-side prompt caching stays warm.
fn group_by_meta(rows: &[CatalogRow]) -> Vec<(String, Vec<usize>)> {
    let mut order: Vec<(String, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        let tag = row
            .meta_category
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        let position = *positions.entry(tag.clone()).or_insert_with(|| {
            order.push((tag, Vec::new()));
            order.len() - 1
        });
        order[position].1.push(index);
    }
    order
}

fn merge(rows: &mut [CatalogRow], buffer: Vec<(String, AttributeBag)>) {
    let mut by_key: HashMap<String, AttributeBag> = buffer.into_iter().collect();
    for row in rows {
        if let Some(bag) = by_key.remove(&row.good_id) {
            row.extracted = Some(bag);
        }
    }
}

fn checkpoint(buffer: &[(String, AttributeBag)], options: &EnrichOptions) {
    let Some(path) = &options.checkpoint_path else {
        return;
    };
    let result = serde_json::to_string(buffer)
        .map_err(std::io::Error::other)
        .and_then(|raw| std::fs::write(path, raw));
    if let Err(err) = result {
        warn!(target = "stylist.enrich", "checkpoint write failed: {err}");
    }
}
