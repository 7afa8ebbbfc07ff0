use crate::driver::{
    ElementHandle, Locator, NavigationDriver, OptionChoice, SelectOption, SessionFactory,
};
use crate::error::{BrowserError, Result};
use bhunaksha_core::BrowserConfig as SessionSettings;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Element, Page};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

const LIST_OPTIONS_FN: &str =
    "function() { return JSON.stringify(Array.from(this.options).map(o => o.text)); }";

/// Map a CDP failure onto the adapter's error classes.
fn classify(err: CdpError, what: &str) -> BrowserError {
    match err {
        CdpError::NotFound => BrowserError::ElementNotFound(what.to_string()),
        CdpError::Timeout => BrowserError::Timeout(what.to_string()),
        other => {
            let message = other.to_string();
            let lower = message.to_lowercase();
            if lower.contains("no node")
                || lower.contains("could not find node")
                || lower.contains("detached")
            {
                BrowserError::StaleElement(format!("{what}: {message}"))
            } else if lower.contains("not clickable") || lower.contains("intercept") {
                BrowserError::ClickIntercepted(format!("{what}: {message}"))
            } else {
                BrowserError::ChromiumError(format!("{what}: {message}"))
            }
        }
    }
}

/// Script committing a `<select>` option and firing the change event the
/// portal listens to. Returns whether an option matched.
fn select_fn(choice: &OptionChoice) -> Result<String> {
    let matcher = match choice {
        OptionChoice::Index(index) => format!("i === {index}"),
        OptionChoice::Text(text) => {
            let literal = serde_json::to_string(text)
                .map_err(|e| BrowserError::ScriptError(e.to_string()))?;
            format!("this.options[i].text === {literal}")
        }
    };
    Ok(format!(
        "function() {{ \
            for (let i = 0; i < this.options.length; i++) {{ \
                if ({matcher}) {{ \
                    this.selectedIndex = i; \
                    this.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                    return true; \
                }} \
            }} \
            return false; \
        }}"
    ))
}

/// Resolved elements keyed by handle id.
///
/// Holds at most one element per locator: resolving a locator again
/// replaces the previous entry, so polling does not accumulate nodes and an
/// outdated handle reads as stale.
#[derive(Debug)]
struct HandleTable<T> {
    next_id: u64,
    by_id: HashMap<u64, Arc<T>>,
    by_locator: HashMap<Locator, u64>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            by_id: HashMap::new(),
            by_locator: HashMap::new(),
        }
    }
}

impl<T> HandleTable<T> {
    fn insert(&mut self, locator: &Locator, element: T) -> ElementHandle {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(replaced) = self.by_locator.insert(locator.clone(), id) {
            self.by_id.remove(&replaced);
        }
        self.by_id.insert(id, Arc::new(element));
        ElementHandle {
            id,
            locator: locator.clone(),
        }
    }

    fn get(&self, handle: &ElementHandle) -> Option<Arc<T>> {
        self.by_id.get(&handle.id).cloned()
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_locator.clear();
    }
}

/// A navigation session backed by its own Chromium process.
pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    elements: Mutex<HandleTable<Element>>,
    closed: AtomicBool,
}

impl ChromiumDriver {
    /// Launch a browser with the given settings and open a blank page.
    pub async fn launch(settings: &SessionSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(settings.window_width, settings.window_height);
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            page,
            handler,
            elements: Mutex::new(HandleTable::default()),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrowserError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn element(&self, handle: &ElementHandle) -> Result<Arc<Element>> {
        self.elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .ok_or_else(|| BrowserError::StaleElement(handle.locator.to_string()))
    }

    async fn call_on(&self, handle: &ElementHandle, function: String) -> Result<serde_json::Value> {
        self.ensure_open()?;
        let element = self.element(handle)?;
        let what = handle.locator.to_string();
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|e| classify(e, &what))?;
        if let Some(exception) = returns.exception_details {
            return Err(BrowserError::ScriptError(format!("{what}: {}", exception.text)));
        }
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait::async_trait]
impl NavigationDriver for ChromiumDriver {
    async fn open(&self, url: &str) -> Result<()> {
        self.ensure_open()?;
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationError(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementHandle> {
        self.ensure_open()?;
        let element = self
            .page
            .find_element(locator.to_css())
            .await
            .map_err(|e| classify(e, &locator.to_string()))?;

        let mut elements = self.elements.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = elements.insert(locator, element);
        tracing::trace!("{} live element handles", elements.len());
        Ok(handle)
    }

    async fn options_of(&self, handle: &ElementHandle) -> Result<Vec<SelectOption>> {
        let value = self.call_on(handle, LIST_OPTIONS_FN.to_string()).await?;
        let encoded = value.as_str().ok_or_else(|| {
            BrowserError::ScriptError(format!("{}: option list was not a string", handle.locator))
        })?;
        let texts: Vec<String> = serde_json::from_str(encoded)
            .map_err(|e| BrowserError::ScriptError(format!("{}: {e}", handle.locator)))?;
        Ok(texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| SelectOption { index, text })
            .collect())
    }

    async fn select_option(&self, handle: &ElementHandle, choice: &OptionChoice) -> Result<bool> {
        let value = self.call_on(handle, select_fn(choice)?).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| match classify(e, "script") {
                BrowserError::ChromiumError(message) => BrowserError::ScriptError(message),
                other => other,
            })?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn read_text(&self, handle: &ElementHandle) -> Result<String> {
        self.ensure_open()?;
        let element = self.element(handle)?;
        let text = element
            .inner_text()
            .await
            .map_err(|e| classify(e, &handle.locator.to_string()))?;
        Ok(text.unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let mut browser = self.browser.lock().await;
        let closed = browser
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()));
        if let Err(e) = browser.wait().await {
            tracing::debug!("browser process wait failed: {}", e);
        }
        self.handler.abort();
        closed.map(|_| ())
    }
}

/// Launches one Chromium process per navigation session.
pub struct ChromiumSessionFactory {
    settings: SessionSettings,
}

impl ChromiumSessionFactory {
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open_session(&self) -> Result<Box<dyn NavigationDriver>> {
        let driver = ChromiumDriver::launch(&self.settings).await?;
        Ok(Box::new(driver))
    }
}
