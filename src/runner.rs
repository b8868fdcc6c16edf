use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::{ReportMode, SiteConfig, SubSiteConfig};
use crate::decoders::{decoder_for, Decoder};
use crate::enrich::enrich_figures;
use crate::error::WatchError;
use crate::http_client::Fetch;
use crate::matcher::SearchSpec;
use crate::models::{Figure, Service};
use crate::notify::{Notification, Notifier, Reporter};
use crate::paginate::{collect_parallel, collect_sequential};
use crate::reconcile::FigureStore;
use crate::snapshot::SnapshotStore;

/// Drives the poll → extract → reconcile → match → notify pipeline for one
/// monitored sub-site. Each runner owns its own previous/current listing
/// state; nothing is shared across sub-sites.
pub struct SubSiteRunner {
    service: Service,
    decoder: Arc<dyn Decoder>,
    url: String,
    sub_site: SubSiteConfig,
    specs: Vec<SearchSpec>,
    store: FigureStore,
    snapshot_key: String,
    page_concurrency: usize,
    detail_concurrency: usize,
    cycle: u64,
}

impl SubSiteRunner {
    pub fn build(
        site: &SiteConfig,
        sub_index: usize,
        page_concurrency: usize,
        detail_concurrency: usize,
        snapshots: &SnapshotStore,
    ) -> Result<Self> {
        let sub_site = site.sub_sites[sub_index].clone();
        let snapshot_key = format!("{}-{}", site.service, sub_index);

        let mut specs = Vec::with_capacity(sub_site.searches.len());
        for search in &sub_site.searches {
            specs.push(
                SearchSpec::compile(search)
                    .with_context(|| format!("Failed to compile search '{}'", search.name))?,
            );
        }

        let store = match snapshots.load(&snapshot_key)? {
            Some(figures) => {
                tracing::info!(
                    "Restored {} figures from snapshot '{}'",
                    figures.len(),
                    snapshot_key
                );
                FigureStore::with_baseline(figures)
            }
            None => FigureStore::new(),
        };

        Ok(Self {
            service: site.service,
            decoder: decoder_for(site.service),
            url: format!("{}{}", site.base_url, sub_site.url),
            sub_site,
            specs,
            store,
            snapshot_key,
            page_concurrency,
            detail_concurrency,
            cycle: 0,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// True until the first baseline exists. A data-corruption failure while
    /// this holds is fatal for the whole process, since there is no previous
    /// state to fall back to.
    pub fn is_first_run(&self) -> bool {
        !self.store.has_baseline()
    }

    pub fn baseline(&self) -> Option<&[Figure]> {
        self.store.baseline()
    }

    pub fn next_delay(&self) -> std::time::Duration {
        self.sub_site.schedule.next_delay(Utc::now())
    }

    pub async fn run_cycle(
        &mut self,
        fetcher: &Arc<dyn Fetch>,
        notifier: &dyn Notifier,
        snapshots: &SnapshotStore,
    ) -> Result<(), WatchError> {
        self.cycle += 1;
        tracing::info!("Polling {} ({} cycle {})", self.url, self.service, self.cycle);

        let first_html = match &self.sub_site.local_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| WatchError::FetchFailure {
                url: path.clone(),
                reason: e.to_string(),
            })?,
            None => fetcher.fetch(&self.url).await?,
        };

        let harvest = match &self.sub_site.prototype_url {
            Some(prototype) => {
                collect_parallel(
                    &self.decoder,
                    fetcher,
                    &first_html,
                    &self.url,
                    prototype,
                    self.page_concurrency,
                )
                .await?
            }
            None => {
                collect_sequential(self.decoder.as_ref(), fetcher.as_ref(), first_html, &self.url)
                    .await?
            }
        };

        if harvest.pages_ok == 0 {
            tracing::warn!(
                "No pages succeeded for {} on cycle {}, keeping previous baseline",
                self.url,
                self.cycle
            );
            return Ok(());
        }
        tracing::info!(
            "Collected {} figures from {} pages of {}",
            harvest.figures.len(),
            harvest.pages_ok,
            self.url
        );

        let outcome = self.store.reconcile(harvest.figures);
        for figure in &outcome.deleted {
            tracing::info!("Figure '{}' no longer listed on {}", figure.name, self.url);
        }

        let mut discovered = outcome.discovered;
        if !discovered.is_empty() {
            tracing::info!("Found {} new figures on {}", discovered.len(), self.url);
            enrich_figures(&self.decoder, fetcher, &mut discovered, self.detail_concurrency).await;
            self.report_discoveries(&discovered, notifier).await;
        }

        if let Some(baseline) = self.store.baseline() {
            if let Err(e) = snapshots.save(&self.snapshot_key, baseline) {
                tracing::warn!("Failed to save snapshot '{}': {}", self.snapshot_key, e);
            }
        }

        Ok(())
    }

    async fn report_discoveries(&self, discovered: &[Figure], notifier: &dyn Notifier) {
        let mut matched_reporter =
            Reporter::new(notifier, self.sub_site.report.matched, "Matched Figures");
        // One push per unmatched figure would be pure noise; treat it as off.
        let unmatched_mode = match self.sub_site.report.unmatched {
            ReportMode::Individually => ReportMode::None,
            mode => mode,
        };
        let mut unmatched_reporter = Reporter::new(notifier, unmatched_mode, "Unmatched Figures");

        for figure in discovered {
            let mut matched_any = false;
            for spec in &self.specs {
                let outcome = spec.evaluate(&figure.extended_name, self.sub_site.min_confidence);
                tracing::info!(
                    "Search '{}' vs '{}': score {} via {:?}, matched: {}",
                    spec.name,
                    figure.extended_name,
                    outcome.score,
                    outcome.method,
                    outcome.matched
                );
                if outcome.matched {
                    matched_any = true;
                    matched_reporter
                        .report(Notification {
                            title: format!("Found: {}", spec.name),
                            message: figure.format_push_message(),
                            image_url: Some(figure.pic_link.clone()),
                            link_url: Some(figure.link.clone()),
                            priority: 0,
                        })
                        .await;
                }
            }
            if !matched_any {
                unmatched_reporter
                    .report(Notification {
                        title: "New Figure Available".to_string(),
                        message: figure.format_push_message(),
                        image_url: Some(figure.pic_link.clone()),
                        link_url: Some(figure.link.clone()),
                        priority: -1,
                    })
                    .await;
            }
        }

        matched_reporter.flush().await;
        unmatched_reporter.flush().await;
    }
}

/// Run every sub-site once, in order. Used by the scheduler loop and by the
/// `--once` CLI mode.
pub async fn run_all_once(
    runners: &mut [SubSiteRunner],
    fetcher: &Arc<dyn Fetch>,
    notifier: &dyn Notifier,
    snapshots: &SnapshotStore,
) -> Result<()> {
    for runner in runners.iter_mut() {
        let first_run = runner.is_first_run();
        if let Err(e) = runner.run_cycle(fetcher, notifier, snapshots).await {
            if first_run && e.is_corruption() {
                return Err(e).with_context(|| {
                    format!("First run failed for {} with no baseline to fall back to", runner.url())
                });
            }
            tracing::error!(
                "Cycle {} failed for {}: {}",
                runner.cycle(),
                runner.url(),
                e
            );
        }
    }
    Ok(())
}

/// The top-level polling loop: sleeps until the next sub-site is due, runs
/// its cycle, and reschedules it.
pub async fn run_loop(
    mut runners: Vec<SubSiteRunner>,
    fetcher: Arc<dyn Fetch>,
    notifier: Arc<dyn Notifier>,
    snapshots: SnapshotStore,
) -> Result<()> {
    if runners.is_empty() {
        anyhow::bail!("No sub-sites configured");
    }

    let now = Instant::now();
    let mut due: Vec<Instant> = runners.iter().map(|_| now).collect();

    loop {
        let next = due
            .iter()
            .enumerate()
            .min_by_key(|(_, when)| **when)
            .map(|(index, when)| (index, *when))
            .expect("runners is non-empty");
        let (index, when) = next;
        tokio::time::sleep_until(when).await;

        let runner = &mut runners[index];
        let first_run = runner.is_first_run();
        if let Err(e) = runner.run_cycle(&fetcher, notifier.as_ref(), &snapshots).await {
            if first_run && e.is_corruption() {
                return Err(e).with_context(|| {
                    format!("First run failed for {} with no baseline to fall back to", runner.url())
                });
            }
            tracing::error!("Cycle {} failed for {}: {}", runner.cycle(), runner.url(), e);
        }

        due[index] = Instant::now() + runner.next_delay();
    }
}
