use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::decoders::Decoder;
use crate::error::WatchError;
use crate::http_client::Fetch;
use crate::models::Figure;

/// Resolve full names for figures whose index-page name was truncated (or
/// omitted), by fetching each figure's own detail page through a bounded
/// worker pool. Condition metadata embedded in the full name is split out and
/// assigned when the figure has none yet. Failures are logged and the figure
/// keeps its truncated name; enrichment never fails the cycle.
pub async fn enrich_figures(
    decoder: &Arc<dyn Decoder>,
    fetcher: &Arc<dyn Fetch>,
    figures: &mut [Figure],
    concurrency: usize,
) {
    let wanted: Vec<usize> = figures
        .iter()
        .enumerate()
        .filter(|(_, f)| decoder.always_enrich() || f.needs_enrichment())
        .map(|(i, _)| i)
        .collect();
    if wanted.is_empty() {
        return;
    }
    tracing::debug!("Resolving full names for {} figures", wanted.len());

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for index in wanted {
        let url = figures[index].link.clone();
        let name = figures[index].name.clone();
        let decoder = Arc::clone(decoder);
        let fetcher = Arc::clone(fetcher);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = resolve_one(&*decoder, &*fetcher, &url, &name).await;
            (index, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let Ok((index, result)) = joined else {
            tracing::warn!("Name resolution task panicked");
            continue;
        };
        match result {
            Ok((condition, full_name)) => {
                let figure = &mut figures[index];
                tracing::debug!("Resolved '{}' -> '{}'", figure.name, full_name);
                figure.extended_name = full_name;
                if let Some(condition) = condition {
                    if figure.condition().is_none() {
                        // set_condition cannot fail on an unset figure
                        let _ = figure.set_condition(condition);
                    }
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
}

async fn resolve_one(
    decoder: &dyn Decoder,
    fetcher: &dyn Fetch,
    url: &str,
    name: &str,
) -> Result<(Option<String>, String), WatchError> {
    let enrichment_failure = |detail: String| WatchError::EnrichmentFailure {
        name: name.to_string(),
        detail,
    };

    let html = fetcher
        .fetch(url)
        .await
        .map_err(|e| enrichment_failure(e.to_string()))?;
    let raw = decoder
        .parse_detail_name(&html)
        .map_err(|e| enrichment_failure(e.to_string()))?;
    Ok(decoder.refine_detail_name(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::decoder_for;
    use crate::models::Service;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MapFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl Fetch for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String, WatchError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| WatchError::FetchFailure {
                    url: url.to_string(),
                    reason: "retries exhausted".to_string(),
                })
        }
    }

    fn amiami_figure(name: &str, link: &str) -> Figure {
        Figure::new(
            Service::Amiami,
            name,
            "1,000 JPY".to_string(),
            link.to_string(),
            "https://example.com/pic.jpg".to_string(),
        )
    }

    fn detail_page(full_name: &str) -> String {
        format!("<html><body><h2 class=\"item_name\">{}</h2></body></html>", full_name)
    }

    #[tokio::test]
    async fn test_truncated_name_gets_extended_from_detail_page() {
        let decoder = decoder_for(Service::Amiami);
        let fetcher: Arc<dyn Fetch> = Arc::new(MapFetcher {
            pages: HashMap::from([(
                "https://example.com/detail/1".to_string(),
                detail_page("(Pre-owned ITEM:A/BOX:B)Nendoroid Racing Miku 2019 Ver.(Released)"),
            )]),
        });

        let mut figures = vec![amiami_figure(
            "Nendoroid Racing...",
            "https://example.com/detail/1",
        )];
        enrich_figures(&decoder, &fetcher, &mut figures, 30).await;

        assert_eq!(figures[0].name, "Nendoroid Racing...");
        assert_eq!(figures[0].extended_name, "Nendoroid Racing Miku 2019 Ver.");
        assert_eq!(figures[0].condition(), Some("Item : A Box: B"));
    }

    #[tokio::test]
    async fn test_full_names_are_left_alone() {
        let decoder = decoder_for(Service::Amiami);
        let fetcher: Arc<dyn Fetch> = Arc::new(MapFetcher { pages: HashMap::new() });

        let mut figures = vec![amiami_figure(
            "Nendoroid Racing Miku",
            "https://example.com/detail/1",
        )];
        enrich_figures(&decoder, &fetcher, &mut figures, 30).await;

        assert_eq!(figures[0].extended_name, "Nendoroid Racing Miku");
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_truncated_name() {
        let decoder = decoder_for(Service::Amiami);
        let fetcher: Arc<dyn Fetch> = Arc::new(MapFetcher { pages: HashMap::new() });

        let mut figures = vec![amiami_figure(
            "Nendoroid Racing...",
            "https://example.com/detail/missing",
        )];
        enrich_figures(&decoder, &fetcher, &mut figures, 30).await;

        assert_eq!(figures[0].extended_name, "Nendoroid Racing...");
        assert_eq!(figures[0].condition(), None);
    }

    #[tokio::test]
    async fn test_existing_condition_is_not_overwritten() {
        let decoder = decoder_for(Service::Amiami);
        let fetcher: Arc<dyn Fetch> = Arc::new(MapFetcher {
            pages: HashMap::from([(
                "https://example.com/detail/1".to_string(),
                detail_page("(Pre-owned ITEM:B/BOX:C)Some Figure"),
            )]),
        });

        let mut figures = vec![amiami_figure("Some Fig...", "https://example.com/detail/1")];
        figures[0].set_condition("Item : A Box: A".to_string()).unwrap();
        enrich_figures(&decoder, &fetcher, &mut figures, 30).await;

        assert_eq!(figures[0].extended_name, "Some Figure");
        assert_eq!(figures[0].condition(), Some("Item : A Box: A"));
    }
}
