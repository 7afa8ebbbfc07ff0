//! Scripted in-memory portal for crawler tests.
//!
//! Models the dependent selector hierarchy, the map layer, the plot list
//! and the detail panel with its mutation flag. Each session is a
//! [`FakeDriver`] with its own selection state; the script is shared.

#![allow(dead_code)]

use bhunaksha_browser::{
    BrowserError, ElementHandle, Locator, NavigationDriver, OptionChoice, Result, SelectOption,
    SessionFactory,
};
use bhunaksha_core::AppConfig;
use bhunaksha_crawler::waiter::UPDATE_FLAG;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const LEVELS: [&str; 5] = ["level_0", "level_1", "level_2", "level_3", "level_4"];
const PLOT_LIST: &str = "surveyNumber";
const DETAIL_PANEL: &str = "plotinfo";
const MAP_VIEWPORT: &str = "ol-viewport";

/// One plot of a village.
#[derive(Debug, Clone)]
pub struct FakePlot {
    pub label: String,
    pub detail: String,
    /// Every select attempt is obstructed
    pub obstructed: bool,
    /// The panel updates without the observer noticing
    pub silent: bool,
    /// Selecting the plot kills the browser
    pub crashing: bool,
}

impl FakePlot {
    pub fn new(label: &str, detail: &str) -> Self {
        Self {
            label: label.to_string(),
            detail: detail.to_string(),
            obstructed: false,
            silent: false,
            crashing: false,
        }
    }

    pub fn obstructed(mut self) -> Self {
        self.obstructed = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn crashing(mut self) -> Self {
        self.crashing = true;
        self
    }
}

/// Detail panel text for one parcel.
pub fn detail(survey_no: &str, area: &str, owner: &str) -> String {
    format!(
        "Survey No.: {survey_no}\nTotal Area: {area}\nPot kharaba: 0.00\nOwner Name: {owner}\nKhata No.: 1"
    )
}

/// Everything the fake portal serves.
#[derive(Debug, Default)]
pub struct PortalScript {
    pub districts: Vec<String>,
    pub talukas: Vec<String>,
    pub villages: Vec<String>,
    pub plots: HashMap<String, Vec<FakePlot>>,
    pub map_missing: HashSet<String>,
    /// Stale-handle failures to inject on plot selection, shared by all sessions
    pub stale_plot_selects: AtomicU32,
    /// Village selections in commit order, across sessions
    pub visits: Mutex<Vec<String>>,
    /// 1-based observer installs, counted across sessions, whose script throws
    pub failing_arms: HashSet<u32>,
    arms: AtomicU32,
}

impl PortalScript {
    /// Portal with one district ("07 Amravati") and one taluka ("03 Achalpur").
    pub fn with_villages(villages: &[&str]) -> Self {
        let mut options = vec!["--Select Village--".to_string()];
        options.extend(villages.iter().map(|v| (*v).to_string()));
        Self {
            districts: vec!["--Select District--".into(), "07 Amravati".into()],
            talukas: vec!["--Select Taluka--".into(), "03 Achalpur".into()],
            villages: options,
            ..Self::default()
        }
    }

    pub fn plots(mut self, village: &str, plots: Vec<FakePlot>) -> Self {
        self.plots.insert(village.to_string(), plots);
        self
    }

    pub fn failing_arm(mut self, call: u32) -> Self {
        self.failing_arms.insert(call);
        self
    }

    pub fn without_map(mut self, village: &str) -> Self {
        self.map_missing.insert(village.to_string());
        self
    }

    pub fn visits_of(&self, village: &str) -> usize {
        self.visits
            .lock()
            .expect("visits lock")
            .iter()
            .filter(|v| v.as_str() == village)
            .count()
    }

    fn level_options(&self, depth: usize) -> Vec<String> {
        match depth {
            0 => vec!["Maharashtra".to_string()],
            1 => vec!["Rural".to_string(), "Urban".to_string()],
            2 => self.districts.clone(),
            3 => self.talukas.clone(),
            _ => self.villages.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    opened: bool,
    selected: [Option<usize>; 5],
    village: Option<String>,
    panel: String,
    flag: bool,
    armed: bool,
    closed: bool,
}

/// One scripted session.
pub struct FakeDriver {
    script: Arc<PortalScript>,
    state: Mutex<SessionState>,
    closes: Arc<AtomicUsize>,
}

impl FakeDriver {
    fn plots(&self, state: &SessionState) -> Vec<FakePlot> {
        state
            .village
            .as_ref()
            .and_then(|v| self.script.plots.get(v))
            .cloned()
            .unwrap_or_default()
    }

    fn present(&self, state: &SessionState, locator: &Locator) -> bool {
        match locator {
            Locator::Id(id) => {
                if let Some(depth) = LEVELS.iter().position(|l| l == id) {
                    state.opened && (depth == 0 || state.selected[depth - 1].is_some())
                } else {
                    (id == PLOT_LIST || id == DETAIL_PANEL) && state.village.is_some()
                }
            }
            Locator::Class(class) => {
                class == MAP_VIEWPORT
                    && state
                        .village
                        .as_ref()
                        .is_some_and(|v| !self.script.map_missing.contains(v))
            }
            Locator::Css(_) => false,
        }
    }

    fn options(&self, state: &SessionState, locator: &Locator) -> Vec<String> {
        match locator {
            Locator::Id(id) if id == PLOT_LIST => {
                let mut options = vec!["Select Plot No".to_string()];
                options.extend(self.plots(state).into_iter().map(|p| p.label));
                options
            }
            Locator::Id(id) => LEVELS
                .iter()
                .position(|l| l == id)
                .map(|depth| self.script.level_options(depth))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl NavigationDriver for FakeDriver {
    async fn open(&self, _url: &str) -> Result<()> {
        let mut state = self.state.lock().expect("session lock");
        if state.closed {
            return Err(BrowserError::SessionClosed);
        }
        state.opened = true;
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementHandle> {
        let state = self.state.lock().expect("session lock");
        if state.closed {
            return Err(BrowserError::SessionClosed);
        }
        if self.present(&state, locator) {
            Ok(ElementHandle {
                id: 1,
                locator: locator.clone(),
            })
        } else {
            Err(BrowserError::ElementNotFound(locator.to_string()))
        }
    }

    async fn options_of(&self, handle: &ElementHandle) -> Result<Vec<SelectOption>> {
        let state = self.state.lock().expect("session lock");
        Ok(self
            .options(&state, &handle.locator)
            .into_iter()
            .enumerate()
            .map(|(index, text)| SelectOption { index, text })
            .collect())
    }

    async fn select_option(&self, handle: &ElementHandle, choice: &OptionChoice) -> Result<bool> {
        let mut state = self.state.lock().expect("session lock");
        if state.closed {
            return Err(BrowserError::SessionClosed);
        }
        let options = self.options(&state, &handle.locator);
        let index = match choice {
            OptionChoice::Index(i) => (*i < options.len()).then_some(*i),
            OptionChoice::Text(text) => options.iter().position(|o| o == text),
        };
        let Some(index) = index else {
            return Ok(false);
        };

        let Locator::Id(id) = &handle.locator else {
            return Ok(false);
        };

        if id == PLOT_LIST {
            let Some(plot) = index.checked_sub(1).and_then(|i| self.plots(&state).get(i).cloned())
            else {
                return Ok(true);
            };
            if plot.obstructed {
                return Err(BrowserError::ClickIntercepted(plot.label));
            }
            if plot.crashing {
                return Err(BrowserError::ChromiumError("target crashed".to_string()));
            }
            let stale = &self.script.stale_plot_selects;
            if stale
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BrowserError::StaleElement(PLOT_LIST.to_string()));
            }
            state.panel = plot.detail;
            if state.armed && !plot.silent {
                state.flag = true;
            }
            return Ok(true);
        }

        if let Some(depth) = LEVELS.iter().position(|l| l == id) {
            state.selected[depth] = Some(index);
            for deeper in &mut state.selected[depth + 1..] {
                *deeper = None;
            }
            if depth == 4 {
                let village = options[index].clone();
                self.script
                    .visits
                    .lock()
                    .expect("visits lock")
                    .push(village.clone());
                state.village = Some(village);
                state.panel.clear();
            } else {
                state.village = None;
            }
        }
        Ok(true)
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value> {
        let mut state = self.state.lock().expect("session lock");
        if state.closed {
            return Err(BrowserError::SessionClosed);
        }
        if script.contains("MutationObserver") {
            let call = self.script.arms.fetch_add(1, Ordering::SeqCst) + 1;
            if self.script.failing_arms.contains(&call) {
                return Err(BrowserError::ScriptError("observer unavailable".to_string()));
            }
            state.flag = false;
            state.armed = state.village.is_some();
            return Ok(serde_json::Value::Bool(state.armed));
        }
        if script.contains(UPDATE_FLAG) {
            return Ok(serde_json::Value::Bool(state.flag));
        }
        Ok(serde_json::Value::Null)
    }

    async fn read_text(&self, handle: &ElementHandle) -> Result<String> {
        let state = self.state.lock().expect("session lock");
        match &handle.locator {
            Locator::Id(id) if id == DETAIL_PANEL => Ok(state.panel.clone()),
            other => Ok(self.options(&state, other).join("\n")),
        }
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().expect("session lock");
        if !state.closed {
            state.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Opens [`FakeDriver`] sessions over a shared script.
pub struct FakeFactory {
    pub script: Arc<PortalScript>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    /// Launches to fail before succeeding
    pub failing_launches: AtomicU32,
}

impl FakeFactory {
    pub fn new(script: PortalScript) -> Self {
        Self {
            script: Arc::new(script),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            failing_launches: AtomicU32::new(0),
        }
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            script: Arc::clone(&self.script),
            state: Mutex::new(SessionState::default()),
            closes: Arc::clone(&self.closed),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionFactory for FakeFactory {
    async fn open_session(&self) -> Result<Box<dyn NavigationDriver>> {
        if self
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BrowserError::ChromiumError("browser failed to start".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.driver()))
    }
}

/// Fast settings over a temporary root.
pub fn test_config(root: &Path, workers: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.portal.url = "http://portal.test/index.html".to_string();
    config.portal.district_index = 1;
    config.portal.taluka_index = 1;
    config.crawler.workers = workers;
    config.crawler.retry_delay_ms = 1;
    config.crawler.poll_interval_ms = 1;
    config.crawler.category_settle_ms = 0;
    config.crawler.page_load_timeout_secs = 1;
    config.crawler.level_timeout_secs = 1;
    config.crawler.detail_timeout_secs = 1;
    config.crawler.map_timeout_secs = 1;
    config.output.data_dir = root.join("data");
    config.output.log_dir = root.join("logs");
    config
}
