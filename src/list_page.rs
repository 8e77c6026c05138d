use crate::extract::{absolutize, element_text, normalize_ws};
use crate::http_client::{fetch_with_retry, PageFetcher};
use crate::models::{ListingStub, Location};
use crate::pacing::Pacing;
use crate::tracker::RunTracker;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Collect listing stubs for one location, walking results pages in order.
/// Stops at the target count or the page limit, whichever comes first; a
/// page that fails to load after retries counts as zero stubs and the walk
/// continues, while a page that loads empty ends pagination early.
pub async fn collect_stubs(
    fetcher: &dyn PageFetcher,
    location: &Location,
    target_count: usize,
    max_pages: u32,
    retries: u32,
    pacing: &Pacing,
    tracker: &RunTracker,
) -> Vec<ListingStub> {
    let mut stubs: Vec<ListingStub> = Vec::new();
    let mut seen_links: HashSet<String> = HashSet::new();

    for page in 1..=max_pages {
        let url = location.page_url(page);
        tracker
            .progress(format!(
                "{}: loading results page {}/{}",
                location.name, page, max_pages
            ))
            .await;

        let html = match fetch_with_retry(fetcher, &url, retries).await {
            Ok(html) => html,
            Err(e) => {
                tracker
                    .warn(format!(
                        "{}: page {} yielded no results after retries ({})",
                        location.name, page, e.reason
                    ))
                    .await;
                continue;
            }
        };

        let page_stubs = parse_list_page(&html, location, stubs.len());
        tracker
            .progress(format!(
                "{}: page {} has {} listings",
                location.name,
                page,
                page_stubs.len()
            ))
            .await;

        if page_stubs.is_empty() {
            // Loaded fine but nothing on it: the source has run out.
            break;
        }

        let remaining = target_count.saturating_sub(stubs.len());
        stubs.extend(
            page_stubs
                .into_iter()
                .filter(|s| seen_links.insert(s.link.clone()))
                .take(remaining),
        );

        if stubs.len() >= target_count {
            break;
        }

        if page < max_pages {
            pacing.jitter().await;
        }
    }

    stubs
}

/// Pull listing stubs out of one results page, in document order.
/// `start_index` seeds fallback ids so they stay unique across pages.
pub fn parse_list_page(html: &str, location: &Location, start_index: usize) -> Vec<ListingStub> {
    let document = Html::parse_document(html);

    let anchor_sel = match Selector::parse(r#"a[href*="/item/"][href*="iid-"]"#) {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut stubs: Vec<ListingStub> = Vec::new();

    for anchor in document.select(&anchor_sel) {
        let href = anchor.value().attr("href").unwrap_or("");
        if href.is_empty() {
            continue;
        }
        let link = absolutize(href);
        if !seen.insert(link.clone()) {
            continue;
        }

        let card = find_card(&anchor);

        let title = anchor
            .value()
            .attr("title")
            .map(normalize_ws)
            .filter(|t| !t.is_empty())
            .or_else(|| card.as_ref().and_then(extract_card_title))
            .unwrap_or_default();

        let price = card.as_ref().and_then(extract_card_price).unwrap_or_default();
        let coarse_location = card
            .as_ref()
            .and_then(extract_card_location)
            .unwrap_or_default();

        let index = start_index + stubs.len();
        let ad_id = extract_id_from_link(&link)
            .unwrap_or_else(|| format!("{}_{}", location.key, index));

        stubs.push(ListingStub {
            ad_id,
            title,
            price,
            location: coarse_location,
            link,
        });
    }

    stubs
}

/// Walk up from the anchor to the listing card that holds price/location.
fn find_card<'a>(anchor: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    for node in anchor.ancestors() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        let value = el.value();
        if value.name() == "article"
            || value.attr("aria-label") == Some("Ad")
            || value.attr("data-cy") == Some("l-card")
        {
            return Some(el);
        }
    }
    None
}

fn extract_card_title(card: &ElementRef) -> Option<String> {
    first_text(
        card,
        &["[aria-label='Title']", "h2", "h3", "[data-aut-id='itemTitle']"],
    )
}

fn extract_card_price(card: &ElementRef) -> Option<String> {
    first_text(
        card,
        &[
            "[aria-label='Price'] span",
            "[aria-label='Price']",
            "[data-testid='ad-price']",
            "[data-aut-id='itemPrice']",
        ],
    )
}

fn extract_card_location(card: &ElementRef) -> Option<String> {
    first_text(
        card,
        &[
            "[aria-label='Location'] span",
            "[aria-label='Location']",
            "[data-aut-id='item-location']",
        ],
    )
}

fn first_text(card: &ElementRef, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel_str| {
        Selector::parse(sel_str)
            .ok()
            .and_then(|sel| card.select(&sel).next())
            .map(|el| normalize_ws(&element_text(&el)))
            .filter(|t| !t.is_empty())
    })
}

/// The numeric id OLX embeds in detail links ("...-iid-1089034552").
pub fn extract_id_from_link(link: &str) -> Option<String> {
    Regex::new(r"iid-(\d+)")
        .ok()
        .and_then(|re| re.captures(link))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
