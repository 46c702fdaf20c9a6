//! Menu scraping by network response capture while scrolling.
//!
//! The CDP response handler parses matching responses and publishes the
//! batches onto a channel. The scroll loop drains the channel between steps,
//! so captured items are appended in arrival order by a single consumer.

use anyhow::Result;
use headless_chrome::Tab;
use headless_chrome::protocol::cdp::Network::GetResponseBodyReturnObject;
use headless_chrome::protocol::cdp::Network::events::ResponseReceivedEventParams;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::NetworkResponseParseError;
use crate::session::BrowserSession;

const HANDLER_NAME: &str = "menu-capture";

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfig {
    /// Substring selecting which response URLs carry menu items
    pub response_filter: String,
    pub poll_interval: Duration,
    /// Extra wait after scrolling converges, for late responses
    pub settle_delay: Duration,
    pub max_height_checks: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            response_filter: "graphql/itemPage".to_string(),
            poll_interval: Duration::from_millis(1500),
            settle_delay: Duration::from_millis(5000),
            max_height_checks: 200,
        }
    }
}

/// One captured menu item. Items are not deduplicated across responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(default, deserialize_with = "scalar_string")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    price: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<RawImage>,
}

#[derive(Deserialize)]
struct RawImage {
    #[serde(default)]
    url: Option<String>,
}

/// Ids and prices show up both as strings and as numbers.
fn scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl From<RawItem> for MenuItem {
    fn from(raw: RawItem) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            price: raw.price,
            description: raw.description,
            image: raw.image.and_then(|i| i.url),
        }
    }
}

/// Extract items from an item-page response body (`data.itemPage.store.items`).
/// A payload without that path yields no items.
pub fn parse_item_response(body: &str) -> Result<Vec<MenuItem>, NetworkResponseParseError> {
    let json: serde_json::Value = serde_json::from_str(body)?;
    let Some(items) = json.pointer("/data/itemPage/store/items") else {
        return Ok(Vec::new());
    };
    if items.is_null() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawItem> = Vec::deserialize(items)?;
    Ok(raw.into_iter().map(MenuItem::from).collect())
}

type Batch = Result<Vec<MenuItem>, NetworkResponseParseError>;

/// Producer half, owned by the response handler.
#[derive(Clone)]
pub struct ResponseCapture {
    filter: String,
    tx: mpsc::UnboundedSender<Batch>,
}

impl ResponseCapture {
    /// Handle one response. `fetch_body` is only called for matching URLs.
    /// Returns whether the response was captured.
    pub fn on_response(
        &self,
        url: &str,
        fetch_body: impl FnOnce() -> Result<String, NetworkResponseParseError>,
    ) -> bool {
        if !url.contains(&self.filter) {
            return false;
        }
        debug!(url, "intercepted item response");
        let batch = fetch_body().and_then(|body| parse_item_response(&body));
        // The collector is gone once scraping finished; late responses are dropped.
        self.tx.send(batch).is_ok()
    }
}

/// Consumer half, drained by the scroll loop.
pub struct MenuCollector {
    rx: mpsc::UnboundedReceiver<Batch>,
    items: Vec<MenuItem>,
    failed_responses: usize,
}

impl MenuCollector {
    /// Move everything published so far into the item list.
    pub fn drain(&mut self) -> usize {
        let mut added = 0;
        while let Ok(batch) = self.rx.try_recv() {
            match batch {
                Ok(items) => {
                    added += items.len();
                    self.items.extend(items);
                }
                Err(e) => {
                    warn!("skipping item response: {}", e);
                    self.failed_responses += 1;
                }
            }
        }
        added
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn failed_responses(&self) -> usize {
        self.failed_responses
    }

    pub fn into_items(self) -> Vec<MenuItem> {
        self.items
    }
}

pub fn capture_channel(filter: impl Into<String>) -> (ResponseCapture, MenuCollector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ResponseCapture {
            filter: filter.into(),
            tx,
        },
        MenuCollector {
            rx,
            items: Vec::new(),
            failed_responses: 0,
        },
    )
}

/// A page that can report its height and scroll.
pub trait ScrollSurface {
    fn scroll_height(&self) -> Result<u64>;
    fn scroll_by_viewport(&self) -> Result<()>;
}

impl ScrollSurface for Tab {
    fn scroll_height(&self) -> Result<u64> {
        let result = self.evaluate("document.body.scrollHeight", false)?;
        result
            .value
            .and_then(|v| v.as_f64())
            .map(|h| h as u64)
            .ok_or_else(|| anyhow::anyhow!("page height is not a number"))
    }

    fn scroll_by_viewport(&self) -> Result<()> {
        self.evaluate("window.scrollBy(0, window.innerHeight)", false)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub height_checks: usize,
    pub final_height: Option<u64>,
    /// False when the check budget ran out before two readings matched
    pub converged: bool,
}

/// Scroll one viewport at a time until two consecutive height readings match.
///
/// `after_step` runs after every scroll and poll sleep.
pub fn scroll_until_stable<S: ScrollSurface + ?Sized>(
    surface: &S,
    poll_interval: Duration,
    max_height_checks: usize,
    mut after_step: impl FnMut(),
) -> Result<ScrollOutcome> {
    let mut previous = None;
    let mut height_checks = 0;

    while height_checks < max_height_checks {
        let height = surface.scroll_height()?;
        height_checks += 1;

        if previous == Some(height) {
            return Ok(ScrollOutcome {
                height_checks,
                final_height: previous,
                converged: true,
            });
        }
        previous = Some(height);

        surface.scroll_by_viewport()?;
        std::thread::sleep(poll_interval);
        after_step();
    }

    warn!(height_checks, "page height never settled");
    Ok(ScrollOutcome {
        height_checks,
        final_height: previous,
        converged: false,
    })
}

/// Open `start_url` and collect menu items from matching network responses.
///
/// Blocking; run it inside `spawn_blocking`.
pub fn scrape_menu(
    session: &BrowserSession,
    start_url: &str,
    config: &ScrapeConfig,
) -> Result<Vec<MenuItem>> {
    let tab: &Arc<Tab> = &session.tab;
    let (capture, mut collector) = capture_channel(config.response_filter.clone());

    tab.register_response_handling(
        HANDLER_NAME,
        Box::new(
            move |params: ResponseReceivedEventParams,
                  fetch_body: &dyn Fn() -> Result<GetResponseBodyReturnObject>| {
                capture.on_response(&params.response.url, || {
                    let body = fetch_body()
                        .map_err(|e| NetworkResponseParseError::Body(format!("{:#}", e)))?;
                    if body.base_64_encoded {
                        return Err(NetworkResponseParseError::Encoded);
                    }
                    Ok(body.body)
                });
            },
        ),
    )?;

    let outcome = collect(tab, start_url, config, &mut collector);
    if let Err(e) = tab.deregister_response_handling(HANDLER_NAME) {
        warn!("could not remove response handler: {:#}", e);
    }
    outcome?;

    info!(
        items = collector.items().len(),
        failed = collector.failed_responses(),
        "scraped menu"
    );
    Ok(collector.into_items())
}

fn collect(
    tab: &Arc<Tab>,
    start_url: &str,
    config: &ScrapeConfig,
    collector: &mut MenuCollector,
) -> Result<()> {
    tab.navigate_to(start_url)?;
    tab.wait_until_navigated()?;

    info!("scrolling to load menu items...");
    let outcome = scroll_until_stable(
        &**tab,
        config.poll_interval,
        config.max_height_checks,
        || {
            collector.drain();
        },
    )?;
    debug!(?outcome, "scrolling finished");

    std::thread::sleep(config.settle_delay);
    collector.drain();
    Ok(())
}
