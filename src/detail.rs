use crate::extract::{Lookup, PageDocument};
use crate::http_client::{fetch_with_retry, PageFetcher};
use crate::list_page::extract_id_from_link;
use crate::models::{ListingStub, Location, Record};
use crate::pacing::Pacing;
use crate::tracker::RunTracker;
use std::mem;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

const TITLE_RULES: [Lookup; 4] = [
    Lookup::Embedded("title"),
    Lookup::Selector("h1"),
    Lookup::Selector("[data-testid='ad-title']"),
    Lookup::Selector("h1[itemprop='name']"),
];

const PRICE_RULES: [Lookup; 5] = [
    Lookup::Embedded("price"),
    Lookup::Selector("[aria-label='Price'] span"),
    Lookup::Selector("[data-testid='ad-price']"),
    Lookup::Selector(".price"),
    Lookup::Selector("[itemprop='price']"),
];

const DESCRIPTION_RULES: [Lookup; 6] = [
    Lookup::Embedded("description"),
    Lookup::Selector("[data-aut-id='itemDescriptionContent']"),
    Lookup::Selector("[data-testid='ad-description']"),
    Lookup::Selector("#description"),
    Lookup::Selector(".description"),
    Lookup::Selector("[itemprop='description']"),
];

const LOCATION_RULES: [Lookup; 3] = [
    Lookup::Selector("[data-aut-id='item-location']"),
    Lookup::Selector(".seller-location"),
    Lookup::Selector("[aria-label='Location']"),
];

const SELLER_NAME_RULES: [Lookup; 3] = [
    Lookup::Embedded("seller_name"),
    Lookup::Selector("[data-testid='seller-name']"),
    Lookup::Selector("[data-aut-id='profileCard'] h4"),
];

const SELLER_SINCE_RULES: [Lookup; 2] = [
    Lookup::Selector(".seller-since"),
    Lookup::Selector("[data-aut-id='sellerSince']"),
];

/// Fan detail-page loads for one location's stubs across a bounded worker
/// pool. Workers share nothing but the accumulator; completion order is not
/// stub order. Every stub yields exactly one record, degraded if its page
/// never loaded.
pub async fn collect_details(
    fetcher: Arc<dyn PageFetcher>,
    stubs: Vec<ListingStub>,
    location: &Location,
    workers: usize,
    retries: u32,
    pacing: Arc<Pacing>,
    tracker: &RunTracker,
) -> Vec<Record> {
    let total = stubs.len();
    let results: Arc<Mutex<Vec<Record>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks: JoinSet<bool> = JoinSet::new();

    for (idx, stub) in stubs.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let results = Arc::clone(&results);
        let semaphore = Arc::clone(&semaphore);
        let pacing = Arc::clone(&pacing);
        let location = location.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return false;
            };
            pacing.pause_before(idx).await;
            let (record, degraded) =
                fetch_detail(fetcher.as_ref(), &stub, &location, retries).await;
            results.lock().await.push(record);
            degraded
        });
    }

    let mut processed = 0usize;
    let mut degraded_count = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(true) => degraded_count += 1,
            Ok(false) => {}
            Err(e) => tracing::error!("Detail worker failed: {}", e),
        }
        processed += 1;
        if processed % 5 == 0 || processed == total {
            tracker
                .progress(format!(
                    "{}: processed {}/{} detail pages",
                    location.name, processed, total
                ))
                .await;
        }
    }

    if degraded_count > 0 {
        tracker
            .warn(format!(
                "{}: {} detail pages degraded to stub data",
                location.name, degraded_count
            ))
            .await;
    }

    let mut guard = results.lock().await;
    mem::take(&mut *guard)
}

/// Load and extract one detail page. A load failure after retries produces
/// a stub-only record with the incomplete marker set, never an error.
async fn fetch_detail(
    fetcher: &dyn PageFetcher,
    stub: &ListingStub,
    location: &Location,
    retries: u32,
) -> (Record, bool) {
    match fetch_with_retry(fetcher, &stub.link, retries).await {
        Ok(html) => (parse_detail(&html, stub, location), false),
        Err(e) => {
            tracing::warn!("Detail page failed for {}: {}", stub.link, e.reason);
            let mut record = Record::from_stub(stub, location);
            record.incomplete = true;
            (record, true)
        }
    }
}

/// Extract the full record from a loaded detail page: fixed fields through
/// the fallback rules, a dynamic pass over the specification table, and the
/// stub filling any gaps.
pub fn parse_detail(html: &str, stub: &ListingStub, location: &Location) -> Record {
    let doc = PageDocument::parse(html);

    let mut record = Record {
        ad_id: doc
            .ad_id()
            .or_else(|| extract_id_from_link(&stub.link))
            .unwrap_or_else(|| stub.ad_id.clone()),
        title: doc.extract(&TITLE_RULES),
        price: doc.extract(&PRICE_RULES),
        location: doc.extract(&LOCATION_RULES),
        link: stub.link.clone(),
        description: doc.extract(&DESCRIPTION_RULES),
        images: doc.images(),
        seller_name: doc.extract(&SELLER_NAME_RULES),
        seller_since: doc.extract(&SELLER_SINCE_RULES),
        seller_profile: doc.seller_profile(),
        specs: doc.specs(),
        contact: None,
        scraped_location: location.name.clone(),
        location_key: location.key.clone(),
        incomplete: false,
    };
    record.fill_from_stub(stub);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageLoadError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn location() -> Location {
        Location {
            key: "model_town".to_string(),
            name: "Model Town".to_string(),
            url: "https://www.olx.com.pk/model-town_g4060717/cars_c84".to_string(),
            enabled: true,
        }
    }

    fn stub(id: u64) -> ListingStub {
        ListingStub {
            ad_id: id.to_string(),
            title: format!("Suzuki Alto {}", id),
            price: "Rs 2,450,000".to_string(),
            location: "Model Town, Lahore".to_string(),
            link: format!("https://www.olx.com.pk/item/suzuki-alto-iid-{}", id),
        }
    }

    const DETAIL_HTML: &str = r#"<html><head>
        <script type="application/ld+json">
        {
            "@type": "Product",
            "name": "Suzuki Alto VXL AGS 2021",
            "description": "Bumper to bumper genuine, Lahore registered.",
            "offers": {"price": 2450000, "priceCurrency": "PKR"},
            "seller": {"name": "Bilal Autos"}
        }
        </script>
    </head><body>
        <span data-aut-id="adId">Ad ID: 1089034552</span>
        <div data-aut-id="item-location">Model Town, Lahore</div>
        <span class="seller-since">Member since Mar 2020</span>
        <a href="/profile/bilal-autos-8812">Bilal Autos</a>
        <img src="https://images.olx.com.pk/alto-front.webp">
        <ul>
            <li><span>Fuel</span><span>Petrol</span></li>
            <li><span>KM's driven</span><span>31,500 km</span></li>
            <li><span>Transmission</span><span>Automatic</span></li>
        </ul>
    </body></html>"#;

    struct FixedFetcher {
        body: Option<String>,
    }

    #[async_trait]
    impl PageFetcher for FixedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, PageLoadError> {
            self.body
                .clone()
                .ok_or_else(|| PageLoadError::new(url, "timeout"))
        }
    }

    struct GaugeFetcher {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for GaugeFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, PageLoadError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("<html><body><h1>Car</h1></body></html>".to_string())
        }
    }

    #[test]
    fn test_parse_detail_full_page() {
        let record = parse_detail(DETAIL_HTML, &stub(1089034552), &location());
        assert_eq!(record.ad_id, "1089034552");
        assert_eq!(record.title.as_deref(), Some("Suzuki Alto VXL AGS 2021"));
        assert_eq!(record.price.as_deref(), Some("PKR 2450000"));
        assert_eq!(
            record.description.as_deref(),
            Some("Bumper to bumper genuine, Lahore registered.")
        );
        assert_eq!(record.seller_name.as_deref(), Some("Bilal Autos"));
        assert_eq!(
            record.seller_since.as_deref(),
            Some("Member since Mar 2020")
        );
        assert_eq!(
            record.seller_profile.as_deref(),
            Some("https://www.olx.com.pk/profile/bilal-autos-8812")
        );
        assert_eq!(record.specs.get("fuel").map(String::as_str), Some("Petrol"));
        assert_eq!(
            record.specs.get("transmission").map(String::as_str),
            Some("Automatic")
        );
        assert!(record.images.iter().any(|u| u.contains("alto-front")));
        assert_eq!(record.scraped_location, "Model Town");
        assert_eq!(record.location_key, "model_town");
        assert!(!record.incomplete);
    }

    #[test]
    fn test_parse_detail_sparse_page_keeps_absent_fields() {
        let record = parse_detail(
            "<html><body><p>almost empty</p></body></html>",
            &stub(42),
            &location(),
        );
        // Stub fills title and price; truly absent fields stay None
        assert_eq!(record.title.as_deref(), Some("Suzuki Alto 42"));
        assert_eq!(record.price.as_deref(), Some("Rs 2,450,000"));
        assert_eq!(record.description, None);
        assert_eq!(record.seller_name, None);
        assert!(record.specs.is_empty());
        assert_eq!(record.ad_id, "42");
    }

    #[tokio::test]
    async fn test_collect_details_one_record_per_stub() {
        let fetcher = Arc::new(FixedFetcher {
            body: Some(DETAIL_HTML.to_string()),
        });
        let tracker = RunTracker::new();
        let stubs: Vec<_> = (1..=12).map(stub).collect();

        let records = collect_details(
            fetcher,
            stubs,
            &location(),
            3,
            1,
            Arc::new(Pacing::none()),
            &tracker,
        )
        .await;
        assert_eq!(records.len(), 12);
        assert!(records.iter().all(|r| !r.incomplete));
    }

    #[tokio::test]
    async fn test_collect_details_degrades_on_load_failure() {
        let fetcher = Arc::new(FixedFetcher { body: None });
        let tracker = RunTracker::new();
        let stubs: Vec<_> = (1..=4).map(stub).collect();

        let records = collect_details(
            fetcher,
            stubs,
            &location(),
            2,
            1,
            Arc::new(Pacing::none()),
            &tracker,
        )
        .await;
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.incomplete));
        // Stub data survives into the degraded records
        assert!(records.iter().all(|r| r.title.is_some()));

        let state = tracker.snapshot().await;
        assert_eq!(state.warnings.len(), 1);
        assert!(state.warnings[0].contains("4 detail pages degraded"));
    }

    #[tokio::test]
    async fn test_collect_details_respects_worker_bound() {
        let fetcher = Arc::new(GaugeFetcher {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let tracker = RunTracker::new();
        let stubs: Vec<_> = (1..=20).map(stub).collect();

        let records = collect_details(
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            stubs,
            &location(),
            3,
            1,
            Arc::new(Pacing::none()),
            &tracker,
        )
        .await;
        assert_eq!(records.len(), 20);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_collect_details_empty_batch() {
        let fetcher = Arc::new(FixedFetcher { body: None });
        let tracker = RunTracker::new();
        let records = collect_details(
            fetcher,
            Vec::new(),
            &location(),
            3,
            1,
            Arc::new(Pacing::none()),
            &tracker,
        )
        .await;
        assert!(records.is_empty());
    }
}
