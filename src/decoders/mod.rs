mod amiami;
mod jungle;

pub use amiami::AmiamiDecoder;
pub use jungle::JungleDecoder;

use std::sync::Arc;
use url::Url;

use crate::error::WatchError;
use crate::models::{Figure, Service};

/// How to reach the rest of a sub-site after parsing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// Sequential: one more page, found in this page's pagination control.
    Next(String),
    /// Parallel: the highest page index present in this page's pagination
    /// control. The paginator synthesizes the remaining URLs from the
    /// configured prototype URL.
    LastPage(u32),
    /// No further pages.
    End,
}

#[derive(Debug)]
pub struct Page {
    pub figures: Vec<Figure>,
    pub pagination: Pagination,
}

/// Per-site markup extractor. One implementation per supported service;
/// malformed individual listings are skipped and logged, while a page whose
/// expected layout is absent entirely surfaces a `StructuralMismatch`.
pub trait Decoder: Send + Sync {
    fn service(&self) -> Service;

    fn parse_page(&self, html: &str, page_url: &str) -> Result<Page, WatchError>;

    /// Extract the full figure name from a listing's own detail page.
    fn parse_detail_name(&self, html: &str) -> Result<String, WatchError>;

    /// Split embedded condition metadata out of a detail-page name, returning
    /// the condition (when present) and the usable name text.
    fn refine_detail_name(&self, raw: &str) -> (Option<String>, String) {
        (None, raw.trim().to_string())
    }

    /// Variants whose index page omits names entirely enrich every listing.
    fn always_enrich(&self) -> bool {
        false
    }
}

pub fn decoder_for(service: Service) -> Arc<dyn Decoder> {
    match service {
        Service::Jungle => Arc::new(JungleDecoder),
        Service::Amiami => Arc::new(AmiamiDecoder),
    }
}

/// Join a possibly-relative href against the page it was found on.
pub(crate) fn absolutize(page_url: &str, href: &str) -> Result<String, WatchError> {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .map_err(|e| WatchError::DataCorruption {
            context: page_url.to_string(),
            detail: format!("unusable link '{}': {}", href, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_for_covers_every_service() {
        assert_eq!(decoder_for(Service::Jungle).service(), Service::Jungle);
        assert_eq!(decoder_for(Service::Amiami).service(), Service::Amiami);
    }

    #[test]
    fn test_absolutize_relative_and_absolute() {
        let page = "http://jungle-scs.co.jp/sale_en/?page_id=116";
        assert_eq!(
            absolutize(page, "?page_id=3377").unwrap(),
            "http://jungle-scs.co.jp/sale_en/?page_id=3377"
        );
        assert_eq!(
            absolutize(page, "http://example.com/x").unwrap(),
            "http://example.com/x"
        );
    }
}
