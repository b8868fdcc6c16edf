use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Selector};

use super::{absolutize, Decoder, Page, Pagination};
use crate::error::WatchError;
use crate::models::{Figure, Service};

/// Decoder for the amiami.com pre-owned listing pages. Index names are often
/// truncated with an ellipsis (the full name comes from the detail page), the
/// condition is embedded as free text inside the name, and pagination is
/// parallel: page one's pager reveals the highest page index and the
/// remaining URLs are synthesized from a configured prototype.
pub struct AmiamiDecoder;

/// Split the `(Pre-owned ITEM:<x>/BOx:<y>)` marker out of a name,
/// case-insensitively. Returns the structured condition string and the name
/// with the matched span removed. No marker means no condition and an
/// unmodified name; this never fails.
pub fn extract_condition(name: &str) -> (Option<String>, String) {
    let pattern = RegexBuilder::new(r"\(pre-owned\s+item:\s*([^/)]*?)\s*/\s*box:\s*([^)]*?)\s*\)")
        .case_insensitive(true)
        .build();
    let Ok(pattern) = pattern else {
        return (None, name.to_string());
    };

    match pattern.captures(name) {
        Some(caps) => {
            let condition = format!("Item : {} Box: {}", &caps[1], &caps[2]);
            let full = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let mut remainder = String::with_capacity(name.len());
            remainder.push_str(&name[..full.start]);
            remainder.push_str(&name[full.end..]);
            (Some(condition), remainder.trim().to_string())
        }
        None => (None, name.to_string()),
    }
}

/// Drop a trailing `(Released)` marker. Applied after condition extraction.
pub fn strip_released(name: &str) -> String {
    let trimmed = name.trim_end();
    match trimmed.strip_suffix("(Released)") {
        Some(rest) => rest.trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Restrict raw price text to grouped-thousands digits plus the currency
/// code. Anything else becomes a single blank string, never a failure.
fn normalize_price(raw: &str) -> String {
    match Regex::new(r"[0-9][0-9,]*\s*JPY") {
        Ok(pattern) => pattern
            .find(raw)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

impl AmiamiDecoder {
    fn parse_item(item: &ElementRef, page_url: &str) -> Result<Figure, WatchError> {
        let malformed = |what: &str| WatchError::DataCorruption {
            context: page_url.to_string(),
            detail: format!("listing block is missing its {} element", what),
        };

        let name_link = Selector::parse(".product_name a")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .ok_or_else(|| malformed("name link"))?;

        let raw_name = name_link.text().collect::<String>();
        let href = name_link
            .value()
            .attr("href")
            .ok_or_else(|| malformed("link"))?;

        let price = Selector::parse(".product_price")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .map(|el| normalize_price(&el.text().collect::<String>()))
            .ok_or_else(|| malformed("price"))?;

        let pic_src = Selector::parse(".product_img img")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .and_then(|el| el.value().attr("src"))
            .ok_or_else(|| malformed("thumbnail"))?;

        let (condition, name) = extract_condition(&raw_name);
        let name = strip_released(&name);

        let mut figure = Figure::new(
            Service::Amiami,
            &name,
            price,
            absolutize(page_url, href)?,
            absolutize(page_url, pic_src)?,
        );
        if let Some(condition) = condition {
            figure.set_condition(condition)?;
        }
        Ok(figure)
    }

    /// Highest page index present in the page's own pagination control.
    fn last_page_index(document: &Html) -> Option<u32> {
        let pager_sel = Selector::parse("div.pager li a").ok()?;
        document
            .select(&pager_sel)
            .filter_map(|el| el.text().collect::<String>().trim().parse::<u32>().ok())
            .max()
    }
}

impl Decoder for AmiamiDecoder {
    fn service(&self) -> Service {
        Service::Amiami
    }

    fn parse_page(&self, html: &str, page_url: &str) -> Result<Page, WatchError> {
        let document = Html::parse_document(html);

        let list = Selector::parse("div.product_list")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .ok_or_else(|| WatchError::StructuralMismatch {
                url: page_url.to_string(),
                detail: "no div.product_list container".to_string(),
            })?;

        let mut figures = Vec::new();
        if let Ok(item_sel) = Selector::parse("div.product_box") {
            for item in list.select(&item_sel) {
                match Self::parse_item(&item, page_url) {
                    Ok(figure) => figures.push(figure),
                    Err(e) => tracing::warn!("Skipping malformed amiami listing: {}", e),
                }
            }
        }

        let pagination = match Self::last_page_index(&document) {
            Some(last) if last > 1 => Pagination::LastPage(last),
            _ => Pagination::End,
        };

        Ok(Page { figures, pagination })
    }

    fn parse_detail_name(&self, html: &str) -> Result<String, WatchError> {
        let document = Html::parse_document(html);
        Selector::parse("h2.item_name")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| WatchError::StructuralMismatch {
                url: "amiami detail page".to_string(),
                detail: "no h2.item_name element".to_string(),
            })
    }

    fn refine_detail_name(&self, raw: &str) -> (Option<String>, String) {
        let (condition, name) = extract_condition(raw);
        (condition, strip_released(&name))
    }
}
