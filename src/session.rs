use anyhow::Result;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::driver::{AutomationDriver, ResolvedTarget};
use crate::error::SessionError;
use crate::selector::{SelectorCandidate, Syntax};

/// Browser plus the tab automation runs in.
///
/// Dropping the session closes the tab and, for launched browsers, the
/// Chrome process, so resources are released on every exit path.
pub struct BrowserSession {
    browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    /// Attach to `cdp_url` when configured, otherwise launch a local Chrome.
    pub fn acquire(config: &BrowserConfig) -> Result<Self, SessionError> {
        match &config.cdp_url {
            Some(url) => Self::connect(url),
            None => Self::launch(config),
        }
    }

    pub fn connect(url: &str) -> Result<Self, SessionError> {
        info!(url, "attaching to running browser");
        let browser = Browser::connect(url.to_string()).map_err(|e| SessionError::Connect {
            url: url.to_string(),
            message: format!("{:#}", e),
        })?;

        // Reuse the first open tab if there is one.
        let existing = {
            let tabs = browser.get_tabs();
            let tabs = tabs
                .lock()
                .map_err(|_| SessionError::Tab("tab list lock poisoned".into()))?;
            tabs.first().cloned()
        };
        let tab = match existing {
            Some(tab) => {
                debug!("using existing tab");
                tab
            }
            None => browser
                .new_tab()
                .map_err(|e| SessionError::Tab(format!("{:#}", e)))?,
        };

        Ok(Self { browser, tab })
    }

    pub fn launch(config: &BrowserConfig) -> Result<Self, SessionError> {
        let chrome_path = match &config.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome().ok_or(SessionError::ChromeNotFound)?,
        };
        let profile_dir = config.profile_dir.clone().or_else(default_profile_dir);
        if let Some(dir) = &profile_dir {
            std::fs::create_dir_all(dir).map_err(|e| SessionError::Launch(e.to_string()))?;
        }

        let options = LaunchOptions {
            headless: config.headless,
            path: Some(chrome_path.clone()),
            user_data_dir: profile_dir,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };

        info!(path = %chrome_path.display(), headless = config.headless, "launching Chrome");
        let browser = Browser::new(options).map_err(|e| SessionError::Launch(format!("{:#}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| SessionError::Tab(format!("{:#}", e)))?;

        Ok(Self { browser, tab })
    }

    /// Replace the working tab with a fresh one.
    pub fn new_tab(&mut self) -> Result<()> {
        self.tab = self.browser.new_tab()?;
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!("tab already gone on release: {:#}", e);
        }
        info!("browser session released");
    }
}

fn default_profile_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("trajectory-compiler").join("profile"))
}

fn find_chrome() -> Option<PathBuf> {
    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| headless_chrome::browser::default_executable().ok())
}

/// JavaScript returning whether the element matched by a candidate is visible.
fn visibility_check(candidate: &SelectorCandidate) -> String {
    let expr = serde_json::Value::from(candidate.expression.as_str());
    let lookup = match candidate.strategy.syntax() {
        Syntax::Css => format!("document.querySelector({expr})"),
        Syntax::XPath => format!(
            "document.evaluate({expr}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        ),
    };
    format!(
        "(() => {{ const el = {lookup}; if (!el) return false; \
         const r = el.getBoundingClientRect(); const s = getComputedStyle(el); \
         return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()"
    )
}

/// [`AutomationDriver`] over a headless_chrome session.
pub struct ChromeDriver {
    session: BrowserSession,
    resolve_timeout: Duration,
    /// Set after `close()`; the next `open()` starts a new tab
    closed: bool,
}

impl ChromeDriver {
    pub fn new(session: BrowserSession, resolve_timeout: Duration) -> Self {
        Self {
            session,
            resolve_timeout,
            closed: false,
        }
    }

    fn tab(&self) -> Result<&Arc<Tab>> {
        if self.closed {
            anyhow::bail!("tab was closed; navigate to open a new one");
        }
        Ok(&self.session.tab)
    }

    fn wait_until_visible(&self, candidate: &SelectorCandidate) -> Result<bool> {
        let tab = self.tab()?;
        let script = visibility_check(candidate);
        let deadline = std::time::Instant::now() + self.resolve_timeout;

        loop {
            let visible = tab
                .evaluate(&script, false)?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if visible {
                return Ok(true);
            }
            if std::time::Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn with_element<T>(
        &self,
        target: &ResolvedTarget,
        f: impl FnOnce(&headless_chrome::Element<'_>) -> Result<T>,
    ) -> Result<T> {
        let tab = self.tab()?;
        let expression = &target.candidate.expression;
        let element = match target.candidate.strategy.syntax() {
            Syntax::Css => tab.find_element(expression)?,
            Syntax::XPath => tab.find_element_by_xpath(expression)?,
        };
        f(&element)
    }
}

impl AutomationDriver for ChromeDriver {
    fn open(&mut self, url: &str) -> Result<()> {
        if self.closed {
            self.session.new_tab()?;
            self.closed = false;
        }
        self.tab()?.navigate_to(url)?;
        Ok(())
    }

    fn wait_for_load(&mut self) -> Result<()> {
        let tab = self.tab()?;
        tab.wait_until_navigated()?;
        tab.wait_for_element("body")?;
        debug!(url = %tab.get_url(), title = %page_title(tab), "page loaded");
        Ok(())
    }

    fn resolve(&mut self, candidates: &[SelectorCandidate]) -> Result<Option<ResolvedTarget>> {
        for (index, candidate) in candidates.iter().enumerate() {
            if self.wait_until_visible(candidate)? {
                debug!(index, strategy = ?candidate.strategy, "resolved target");
                return Ok(Some(ResolvedTarget {
                    index,
                    candidate: candidate.clone(),
                }));
            }
            debug!(index, strategy = ?candidate.strategy, "candidate not visible");
        }
        Ok(None)
    }

    fn click(&mut self, target: &ResolvedTarget) -> Result<()> {
        self.with_element(target, |el| {
            el.scroll_into_view()?;
            el.click()?;
            Ok(())
        })
    }

    fn fill(&mut self, target: &ResolvedTarget, text: &str) -> Result<()> {
        self.with_element(target, |el| {
            el.click()?;
            // Clear any prefilled value before typing.
            el.call_js_fn("function() { this.value = ''; }", vec![], false)?;
            el.type_into(text)?;
            Ok(())
        })
    }

    fn scroll_to_bottom(&mut self) -> Result<()> {
        self.tab()?
            .evaluate("window.scrollTo(0, document.body.scrollHeight)", false)?;
        Ok(())
    }

    fn wait(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            warn!("close requested but tab is already closed");
            return Ok(());
        }
        self.session.tab.close(false)?;
        self.closed = true;
        Ok(())
    }
}

fn page_title(tab: &Tab) -> String {
    tab.evaluate("document.title", false)
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "untitled".to_string())
}
