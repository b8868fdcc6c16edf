use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::decoders::{Decoder, Pagination};
use crate::error::WatchError;
use crate::http_client::Fetch;
use crate::models::Figure;

/// Everything one poll cycle gathered from a sub-site. `pages_ok == 0` means
/// the cycle was inconclusive and the history baseline must not advance.
#[derive(Debug, Default)]
pub struct Harvest {
    pub figures: Vec<Figure>,
    pub pages_ok: usize,
}

/// Walk a sub-site page by page, following each page's next-page link. A
/// fetch failure halts pagination but keeps listings gathered from earlier
/// pages. A missing listing container means "no more listings" on
/// continuation pages; on the entry page it is inconclusive (some legitimate
/// states show zero listings) and yields an empty, non-advancing harvest.
pub async fn collect_sequential(
    decoder: &dyn Decoder,
    fetcher: &dyn Fetch,
    first_html: String,
    first_url: &str,
) -> Result<Harvest, WatchError> {
    let mut harvest = Harvest::default();
    let mut html = first_html;
    let mut url = first_url.to_string();
    let mut first_page = true;

    loop {
        let page = match decoder.parse_page(&html, &url) {
            Ok(page) => page,
            Err(e @ WatchError::StructuralMismatch { .. }) => {
                if first_page {
                    tracing::warn!("Entry page of {} is inconclusive, skipping cycle: {}", first_url, e);
                    return Ok(harvest);
                }
                tracing::debug!("End of pagination at {}: {}", url, e);
                break;
            }
            Err(e) => return Err(e),
        };
        first_page = false;
        harvest.pages_ok += 1;
        harvest.figures.extend(page.figures);

        match page.pagination {
            Pagination::Next(next_url) => match fetcher.fetch(&next_url).await {
                Ok(body) => {
                    html = body;
                    url = next_url;
                }
                Err(e) => {
                    tracing::warn!("Pagination of {} halted early: {}", first_url, e);
                    break;
                }
            },
            Pagination::LastPage(_) => {
                tracing::warn!(
                    "{} reports parallel-style pagination but no prototype_url is configured",
                    first_url
                );
                break;
            }
            Pagination::End => break,
        }
    }

    Ok(harvest)
}

/// Parse the entry page to learn the highest page index, synthesize the
/// remaining page URLs from the prototype template, and fetch them through a
/// bounded worker pool. Any failure fails the whole cycle: a partial page set
/// would silently suppress real listings instead of just delaying them.
pub async fn collect_parallel(
    decoder: &Arc<dyn Decoder>,
    fetcher: &Arc<dyn Fetch>,
    first_html: &str,
    first_url: &str,
    prototype_url: &str,
    concurrency: usize,
) -> Result<Harvest, WatchError> {
    let mut harvest = Harvest::default();

    let first = match decoder.parse_page(first_html, first_url) {
        Ok(page) => page,
        Err(e @ WatchError::StructuralMismatch { .. }) => {
            tracing::warn!("Entry page of {} is inconclusive, skipping cycle: {}", first_url, e);
            return Ok(harvest);
        }
        Err(e) => return Err(e),
    };
    harvest.pages_ok = 1;
    harvest.figures.extend(first.figures);

    let last_page = match first.pagination {
        Pagination::LastPage(last) => last,
        Pagination::End => return Ok(harvest),
        Pagination::Next(_) => {
            return Err(WatchError::DataCorruption {
                context: first_url.to_string(),
                detail: "sequential pagination control on a prototype-URL sub-site".to_string(),
            })
        }
    };

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for index in 2..=last_page {
        let url = prototype_url.replace("{page}", &index.to_string());
        let fetcher = Arc::clone(fetcher);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let body = fetcher.fetch(&url).await?;
            Ok::<_, WatchError>((index, url, body))
        });
    }

    let mut fetched = Vec::new();
    let mut failure: Option<WatchError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(page)) => fetched.push(page),
            Ok(Err(e)) => {
                failure.get_or_insert(WatchError::DataCorruption {
                    context: first_url.to_string(),
                    detail: format!("parallel page fetch failed: {}", e),
                });
            }
            Err(e) => {
                failure.get_or_insert(WatchError::DataCorruption {
                    context: first_url.to_string(),
                    detail: format!("parallel fetch task panicked: {}", e),
                });
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    // Keep the listing order deterministic across the synthesized pages.
    fetched.sort_by_key(|(index, _, _)| *index);
    for (_, url, body) in fetched {
        let page = decoder.parse_page(&body, &url).map_err(|e| match e {
            WatchError::StructuralMismatch { url, detail } => WatchError::DataCorruption {
                context: url,
                detail: format!("synthesized page lost its layout: {}", detail),
            },
            other => other,
        })?;
        harvest.pages_ok += 1;
        harvest.figures.extend(page.figures);
    }

    Ok(harvest)
}
