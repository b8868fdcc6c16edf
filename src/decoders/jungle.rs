use scraper::{ElementRef, Html, Selector};

use super::{absolutize, Decoder, Page, Pagination};
use crate::error::WatchError;
use crate::models::{Figure, Service};

/// Decoder for the jungle-scs.co.jp sale pages. Listings live in `li` items
/// under `#products`; the condition is an icon whose filename encodes one of
/// three grades.
pub struct JungleDecoder;

const CONDITION_ICONS: &[(&str, &str)] = &[
    ("conditionicon_s_en.gif", "Sealed"),
    ("conditionicon_a_en.gif", "A"),
    ("conditionicon_b_en.gif", "B"),
];

impl JungleDecoder {
    fn decode_condition(icon_src: &str) -> Result<String, WatchError> {
        let filename = icon_src.rsplit('/').next().unwrap_or(icon_src);
        CONDITION_ICONS
            .iter()
            .find(|(name, _)| *name == filename)
            .map(|(_, grade)| grade.to_string())
            .ok_or_else(|| WatchError::DataCorruption {
                context: "jungle condition icon".to_string(),
                detail: format!("unmapped icon '{}'", filename),
            })
    }

    fn parse_item(item: &ElementRef, page_url: &str) -> Result<Figure, WatchError> {
        let malformed = |what: &str| WatchError::DataCorruption {
            context: page_url.to_string(),
            detail: format!("listing block is missing its {} element", what),
        };

        let name = Selector::parse(".wrapword")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .map(|el| el.text().collect::<String>())
            .ok_or_else(|| malformed("name"))?;

        let price = Selector::parse(".price")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .ok_or_else(|| malformed("price"))?;

        let pic_src = Selector::parse("img")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .and_then(|el| el.value().attr("src"))
            .ok_or_else(|| malformed("thumbnail"))?;

        let href = Selector::parse("a")
            .ok()
            .and_then(|sel| item.select(&sel).next())
            .and_then(|el| el.value().attr("href"))
            .ok_or_else(|| malformed("link"))?;

        // The second image inside the item's text block is the condition icon.
        let icon_src = Selector::parse("p img")
            .ok()
            .and_then(|sel| item.select(&sel).nth(1))
            .and_then(|el| el.value().attr("src"))
            .ok_or_else(|| malformed("condition icon"))?;

        let mut figure = Figure::new(
            Service::Jungle,
            &name,
            price,
            absolutize(page_url, href)?,
            absolutize(page_url, pic_src)?,
        );
        figure.set_condition(Self::decode_condition(icon_src)?)?;
        Ok(figure)
    }

    fn find_next_page(document: &Html, page_url: &str) -> Pagination {
        let paging = Selector::parse("#paging")
            .ok()
            .and_then(|sel| document.select(&sel).next());
        let Some(paging) = paging else {
            return Pagination::End;
        };

        let span_sel = match Selector::parse("span") {
            Ok(sel) => sel,
            Err(_) => return Pagination::End,
        };

        for span in paging.select(&span_sel) {
            let text = span.text().collect::<String>();
            if !text.contains("Next Page") {
                continue;
            }
            let href = Selector::parse("a")
                .ok()
                .and_then(|sel| span.select(&sel).next())
                .and_then(|el| el.value().attr("href"));
            if let Some(href) = href {
                if let Ok(next_url) = absolutize(page_url, href) {
                    return Pagination::Next(next_url);
                }
            }
        }

        Pagination::End
    }
}

impl Decoder for JungleDecoder {
    fn service(&self) -> Service {
        Service::Jungle
    }

    fn parse_page(&self, html: &str, page_url: &str) -> Result<Page, WatchError> {
        let document = Html::parse_document(html);

        let products = Selector::parse("#products")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .ok_or_else(|| WatchError::StructuralMismatch {
                url: page_url.to_string(),
                detail: "no #products container".to_string(),
            })?;

        let mut figures = Vec::new();
        if let Ok(item_sel) = Selector::parse("li") {
            for item in products.select(&item_sel) {
                match Self::parse_item(&item, page_url) {
                    Ok(figure) => figures.push(figure),
                    Err(e) => tracing::warn!("Skipping malformed jungle listing: {}", e),
                }
            }
        }

        Ok(Page {
            figures,
            pagination: Self::find_next_page(&document, page_url),
        })
    }

    fn parse_detail_name(&self, html: &str) -> Result<String, WatchError> {
        let document = Html::parse_document(html);
        Selector::parse("h2.entry-title")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| WatchError::StructuralMismatch {
                url: "jungle detail page".to_string(),
                detail: "no h2.entry-title element".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <div id="products">
            <ul>
                <li>
                    <a href="?page_id=3377"><img src="/sale_en/images/fig1.jpg"></a>
                    <p class="wrapword">Nendoroid Racing Miku 2014 Ver.</p>
                    <p>
                        <img src="/sale_en/images/cart.gif">
                        <img src="http://jungle-scs.co.jp/sale_en/wp-content/themes/jungle_2013en/images/conditionicon_s_en.gif">
                    </p>
                    <p class="price">4,800 JPY</p>
                </li>
                <li>
                    <a href="?page_id=3378"><img src="/sale_en/images/fig2.jpg"></a>
                    <p class="wrapword">figma Saber Alter</p>
                    <p>
                        <img src="/sale_en/images/cart.gif">
                        <img src="http://jungle-scs.co.jp/sale_en/wp-content/themes/jungle_2013en/images/conditionicon_b_en.gif">
                    </p>
                    <p class="price">3,200 JPY</p>
                </li>
            </ul>
        </div>
        <div id="paging">
            <span class="sp04_pl20"><a href="?page_id=116&amp;paged=2">Next Page»</a></span>
        </div>
        </body></html>
    "#;

    const PAGE_URL: &str = "http://jungle-scs.co.jp/sale_en/?page_id=116&cat=313";

    #[test]
    fn test_parse_page_extracts_figures_and_next_page() {
        let page = JungleDecoder.parse_page(PAGE, PAGE_URL).unwrap();
        assert_eq!(page.figures.len(), 2);

        let first = &page.figures[0];
        assert_eq!(first.name, "Nendoroid Racing Miku 2014 Ver.");
        assert_eq!(first.price, "4,800 JPY");
        assert_eq!(first.condition(), Some("Sealed"));
        assert_eq!(first.link, "http://jungle-scs.co.jp/sale_en/?page_id=3377");
        assert_eq!(
            first.pic_link,
            "http://jungle-scs.co.jp/sale_en/images/fig1.jpg"
        );

        assert_eq!(page.figures[1].condition(), Some("B"));
        assert_eq!(
            page.pagination,
            Pagination::Next("http://jungle-scs.co.jp/sale_en/?page_id=116&paged=2".to_string())
        );
    }

    #[test]
    fn test_parse_page_without_paging_control_ends() {
        let html = PAGE.replace(r#"<div id="paging">"#, r#"<div id="other">"#);
        let page = JungleDecoder.parse_page(&html, PAGE_URL).unwrap();
        assert_eq!(page.pagination, Pagination::End);
    }

    #[test]
    fn test_missing_products_container_is_structural_mismatch() {
        let html = "<html><body><div id='content'>maintenance</div></body></html>";
        let result = JungleDecoder.parse_page(html, PAGE_URL);
        assert!(matches!(result, Err(WatchError::StructuralMismatch { .. })));
    }

    #[test]
    fn test_malformed_listing_is_skipped_not_fatal() {
        // Second item has no price element
        let html = PAGE.replace(r#"<p class="price">3,200 JPY</p>"#, "");
        let page = JungleDecoder.parse_page(&html, PAGE_URL).unwrap();
        assert_eq!(page.figures.len(), 1);
        assert_eq!(page.figures[0].name, "Nendoroid Racing Miku 2014 Ver.");
    }

    #[test]
    fn test_unmapped_condition_icon_rejects_listing() {
        let html = PAGE.replace("conditionicon_s_en.gif", "conditionicon_x_en.gif");
        let page = JungleDecoder.parse_page(&html, PAGE_URL).unwrap();
        assert_eq!(page.figures.len(), 1);
        assert_eq!(page.figures[0].name, "figma Saber Alter");
    }

    #[test]
    fn test_decode_condition_table() {
        assert_eq!(
            JungleDecoder::decode_condition("http://x/conditionicon_a_en.gif").unwrap(),
            "A"
        );
        assert!(JungleDecoder::decode_condition("http://x/unknown.gif").is_err());
    }

    #[test]
    fn test_parse_detail_name() {
        let html = "<html><body><h2 class=\"entry-title\">Nendoroid Racing Miku 2014 Ver. [Complete]</h2></body></html>";
        assert_eq!(
            JungleDecoder.parse_detail_name(html).unwrap(),
            "Nendoroid Racing Miku 2014 Ver. [Complete]"
        );
        assert!(matches!(
            JungleDecoder.parse_detail_name("<html></html>"),
            Err(WatchError::StructuralMismatch { .. })
        ));
    }
}
