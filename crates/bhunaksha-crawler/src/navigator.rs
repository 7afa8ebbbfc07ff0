//! Cascading selector navigator.
//!
//! Drives one browser session through the portal's five dependent selector
//! levels (state, category, district, taluka, village), verifies the map
//! layer and iterates the village's plot list. Every step is a transition
//! of [`NavState`]; out-of-order steps fail with
//! [`CrawlError::InvalidTransition`] before touching the page.

use crate::error::{CrawlError, ErrorClass, Result};
use crate::item_log::ItemLog;
use crate::parser::parse_block;
use crate::progress::WorkerProgress;
use crate::retry::RetryPolicy;
use crate::waiter::ChangeWaiter;
use bhunaksha_browser::{
    wait_for_element, wait_for_options, BrowserError, Locator, NavigationDriver, OptionChoice,
    SelectOption, WaitBounds,
};
use bhunaksha_core::{CrawlTarget, CrawlerConfig, ItemResult, SelectionLevel, WorkItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Element ids and classes of the portal page.
pub mod page {
    /// Select element id of each selector level, by depth.
    pub const LEVEL_IDS: [&str; 5] = ["level_0", "level_1", "level_2", "level_3", "level_4"];
    /// Plot list select element id.
    pub const PLOT_LIST_ID: &str = "surveyNumber";
    /// Plot detail panel id.
    pub const DETAIL_PANEL_ID: &str = "plotinfo";
    /// Class of the rendered map viewport.
    pub const MAP_VIEWPORT_CLASS: &str = "ol-viewport";
}

/// Navigation progress of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavState {
    /// Nothing committed yet
    Start,
    /// State committed
    Level0Selected,
    /// Category options available
    Level1Populated,
    /// Category committed
    Level1Selected,
    /// District options available
    Level2Populated,
    /// District chosen
    Level2Selected,
    /// Taluka options available
    Level3Populated,
    /// Taluka chosen
    Level3Selected,
    /// Village options available
    Level4Populated,
    /// Village chosen
    Level4Selected,
    /// Map layer rendered for the village
    MapVerified,
    /// Plot options available
    PlotListPopulated,
    /// Harvesting one plot
    PlotIterating,
    /// All plots visited
    Complete,
    /// Unrecoverable error for this item
    Failed,
}

impl NavState {
    const ORDER: [NavState; 14] = [
        NavState::Start,
        NavState::Level0Selected,
        NavState::Level1Populated,
        NavState::Level1Selected,
        NavState::Level2Populated,
        NavState::Level2Selected,
        NavState::Level3Populated,
        NavState::Level3Selected,
        NavState::Level4Populated,
        NavState::Level4Selected,
        NavState::MapVerified,
        NavState::PlotListPopulated,
        NavState::PlotIterating,
        NavState::Complete,
    ];

    fn position(self) -> Option<usize> {
        Self::ORDER.iter().position(|s| *s == self)
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, NavState::Complete | NavState::Failed)
    }

    /// Whether `to` may follow this state.
    ///
    /// States advance one step at a time. `Failed` is reachable from any
    /// non-terminal state, `PlotIterating` repeats once per plot, and an
    /// item with a populated plot list may complete without iterating.
    #[must_use]
    pub fn can_advance_to(self, to: NavState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (_, NavState::Failed)
            | (NavState::PlotIterating, NavState::PlotIterating)
            | (NavState::PlotListPopulated, NavState::Complete) => true,
            _ => match (self.position(), to.position()) {
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }

    /// State reached once `level`'s option list is populated.
    #[must_use]
    pub fn populated(level: SelectionLevel) -> Option<NavState> {
        match level {
            SelectionLevel::State => None,
            SelectionLevel::Category => Some(NavState::Level1Populated),
            SelectionLevel::District => Some(NavState::Level2Populated),
            SelectionLevel::Taluka => Some(NavState::Level3Populated),
            SelectionLevel::Village => Some(NavState::Level4Populated),
        }
    }

    /// State reached once an option of `level` is committed.
    #[must_use]
    pub fn selected(level: SelectionLevel) -> NavState {
        match level {
            SelectionLevel::State => NavState::Level0Selected,
            SelectionLevel::Category => NavState::Level1Selected,
            SelectionLevel::District => NavState::Level2Selected,
            SelectionLevel::Taluka => NavState::Level3Selected,
            SelectionLevel::Village => NavState::Level4Selected,
        }
    }
}

/// The work list for one crawl target, with the ancestor labels it was found under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    /// Ancestor selection
    pub target: CrawlTarget,
    /// Label of the selected district
    pub district_name: String,
    /// Label of the selected taluka
    pub taluka_name: String,
    /// Village options in dropdown order, placeholder excluded
    pub items: Vec<WorkItem>,
    /// When the live walk happened
    pub discovered_at: DateTime<Utc>,
}

impl Discovery {
    /// Create a discovery stamped now.
    #[must_use]
    pub fn new(
        target: CrawlTarget,
        district_name: impl Into<String>,
        taluka_name: impl Into<String>,
        items: Vec<WorkItem>,
    ) -> Self {
        Self {
            target,
            district_name: district_name.into(),
            taluka_name: taluka_name.into(),
            items,
            discovered_at: Utc::now(),
        }
    }
}

fn level_locator(level: SelectionLevel) -> Locator {
    Locator::id(page::LEVEL_IDS[level.depth()])
}

/// Walks the selector hierarchy within one session.
pub struct Navigator<'a> {
    driver: &'a dyn NavigationDriver,
    settings: &'a CrawlerConfig,
    progress: &'a WorkerProgress,
    log: &'a ItemLog,
    state: NavState,
    options: [Option<Vec<SelectOption>>; 5],
    path: Vec<String>,
}

impl<'a> Navigator<'a> {
    /// Create a navigator at [`NavState::Start`].
    #[must_use]
    pub fn new(
        driver: &'a dyn NavigationDriver,
        settings: &'a CrawlerConfig,
        progress: &'a WorkerProgress,
        log: &'a ItemLog,
    ) -> Self {
        Self {
            driver,
            settings,
            progress,
            log,
            state: NavState::Start,
            options: Default::default(),
            path: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> NavState {
        self.state
    }

    /// Labels committed so far (district, taluka, village).
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Option list last read for `level`, if still valid.
    #[must_use]
    pub fn cached_options(&self, level: SelectionLevel) -> Option<&[SelectOption]> {
        self.options[level.depth()].as_deref()
    }

    fn ensure(&self, to: NavState) -> Result<()> {
        if self.state.can_advance_to(to) {
            Ok(())
        } else {
            Err(CrawlError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    /// Move to `to`, rejecting out-of-order transitions.
    pub fn advance(&mut self, to: NavState) -> Result<()> {
        self.ensure(to)?;
        self.state = to;
        self.progress.step(format!("{to:?}"));
        Ok(())
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = NavState::Failed;
            self.progress.step(format!("{:?}", NavState::Failed));
        }
    }

    fn level_bounds(&self) -> WaitBounds {
        WaitBounds::new(self.settings.level_timeout(), self.settings.poll_interval())
    }

    fn detail_bounds(&self) -> WaitBounds {
        WaitBounds::new(self.settings.detail_timeout(), self.settings.poll_interval())
    }

    /// Load the portal and wait for the first selector.
    pub async fn open_portal(&mut self, url: &str) -> Result<()> {
        self.ensure(NavState::Level0Selected)?;
        self.driver.open(url).await?;
        self.log.record("Opened the webpage");

        let bounds = WaitBounds::new(self.settings.page_load_timeout(), self.settings.poll_interval());
        wait_for_element(self.driver, &level_locator(SelectionLevel::State), bounds).await?;
        self.log.record("Page loaded");
        Ok(())
    }

    /// Select `choice` in the element at `locator`, re-resolving the element
    /// on every retry. Returns `false` when no option matches.
    async fn select_with_retry(&self, locator: &Locator, choice: &OptionChoice) -> Result<bool> {
        let policy = RetryPolicy::new(self.settings.select_attempts, self.settings.retry_delay());
        let max_attempts = policy.max_attempts.max(1);
        let bounds = self.level_bounds();
        let driver = self.driver;
        let (log, progress) = (self.log, self.progress);

        policy
            .run(
                &format!("select {choice} in {locator}"),
                CrawlError::is_retryable,
                |attempt, e| {
                    let message = format!(
                        "Error selecting option {choice} on attempt {attempt}/{max_attempts}: {e}"
                    );
                    log.record(&message);
                    progress.note(message);
                },
                |attempt| async move {
                    let handle = if attempt == 1 {
                        driver.find_element(locator).await?
                    } else {
                        wait_for_element(driver, locator, bounds).await?
                    };
                    Ok::<_, CrawlError>(driver.select_option(&handle, choice).await?)
                },
            )
            .await
    }

    /// Wait until `level` offers more than its placeholder and cache the list.
    async fn populate(&mut self, level: SelectionLevel) -> Result<Vec<SelectOption>> {
        let state = NavState::populated(level).ok_or(CrawlError::InvalidTransition {
            from: self.state,
            to: NavState::selected(level),
        })?;
        self.ensure(state)?;

        let (_, options) = wait_for_options(self.driver, &level_locator(level), 1, self.level_bounds())
            .await
            .map_err(|e| match e {
                BrowserError::Timeout(_) => CrawlError::EmptyDropdown {
                    level: level.to_string(),
                },
                other => other.into(),
            })?;

        self.options[level.depth()] = Some(options.clone());
        self.advance(state)?;
        Ok(options)
    }

    /// Commit `choice` at `level` and return the committed label.
    async fn commit(&mut self, level: SelectionLevel, choice: OptionChoice) -> Result<String> {
        let to = NavState::selected(level);
        self.ensure(to)?;

        let not_found = || CrawlError::OptionNotFound {
            level: level.to_string(),
            choice: choice.to_string(),
        };
        let label = match (&choice, self.cached_options(level)) {
            (OptionChoice::Text(text), _) => text.clone(),
            (OptionChoice::Index(index), Some(options)) => options
                .iter()
                .find(|o| o.index == *index)
                .map(|o| o.text.clone())
                .ok_or_else(not_found)?,
            (OptionChoice::Index(_), None) => choice.to_string(),
        };

        if !self.select_with_retry(&level_locator(level), &choice).await? {
            return Err(not_found());
        }

        for slot in self.options.iter_mut().skip(level.depth() + 1) {
            *slot = None;
        }
        self.advance(to)?;
        Ok(label)
    }

    fn push_path(&mut self, label: &str) {
        self.path.push(label.to_string());
        self.progress.path(&self.path);
    }

    /// Commit state, category, district and taluka for `target`.
    ///
    /// Returns the district and taluka labels.
    pub async fn select_ancestors(&mut self, target: CrawlTarget) -> Result<(String, String)> {
        self.commit(SelectionLevel::State, OptionChoice::Index(0)).await?;

        wait_for_element(
            self.driver,
            &level_locator(SelectionLevel::Category),
            self.level_bounds(),
        )
        .await?;
        tokio::time::sleep(self.settings.category_settle()).await;
        self.populate(SelectionLevel::Category).await?;
        self.commit(SelectionLevel::Category, OptionChoice::Index(0)).await?;

        self.populate(SelectionLevel::District).await?;
        let district = self
            .commit(SelectionLevel::District, OptionChoice::Index(target.district_index))
            .await?;
        self.push_path(&district);
        self.log.record(format!("District '{district}' selected"));

        self.populate(SelectionLevel::Taluka).await?;
        let taluka = self
            .commit(SelectionLevel::Taluka, OptionChoice::Index(target.taluka_index))
            .await?;
        self.push_path(&taluka);
        self.log.record(format!("Taluka '{taluka}' selected"));

        Ok((district, taluka))
    }

    /// Wait for the village list.
    pub async fn populate_villages(&mut self) -> Result<Vec<SelectOption>> {
        self.populate(SelectionLevel::Village).await
    }

    /// Produce the work list for `target` from a fresh session.
    pub async fn discover(&mut self, url: &str, target: CrawlTarget) -> Result<Discovery> {
        self.open_portal(url).await?;
        let (district, taluka) = self.select_ancestors(target).await?;
        let items: Vec<WorkItem> = self
            .populate_villages()
            .await?
            .into_iter()
            .skip(1)
            .map(|option| WorkItem::new(option.index, option.text))
            .collect();

        self.log
            .record(format!("Discovered {} villages in '{district}' / '{taluka}'", items.len()));
        Ok(Discovery::new(target, district, taluka, items))
    }

    /// Commit the village of `item`.
    pub async fn select_village(&mut self, item: &WorkItem) -> Result<()> {
        match self
            .commit(SelectionLevel::Village, OptionChoice::Text(item.name.clone()))
            .await
        {
            Ok(label) => {
                self.push_path(&label);
                Ok(())
            }
            Err(e @ CrawlError::OptionNotFound { .. }) => {
                self.log.record(format!("Village '{}' not found", item.name));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Wait for the map layer of the selected village.
    pub async fn verify_map(&mut self, village: &str) -> Result<()> {
        self.ensure(NavState::MapVerified)?;
        let bounds = WaitBounds::new(self.settings.map_timeout(), self.settings.poll_interval());
        match wait_for_element(self.driver, &Locator::class(page::MAP_VIEWPORT_CLASS), bounds).await {
            Ok(_) => self.advance(NavState::MapVerified),
            Err(BrowserError::Timeout(_)) => {
                self.log
                    .record(format!("Map layer not loaded for village '{village}'. Skipping..."));
                Err(CrawlError::MapNotLoaded {
                    village: village.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Select every plot in turn and collect the parsed detail records.
    ///
    /// A plot whose detail never updates is skipped. A plot that cannot be
    /// selected ends the loop with an error; records gathered so far stay
    /// in `result`.
    pub async fn harvest_plots(&mut self, village: &str, result: &mut ItemResult) -> Result<()> {
        self.ensure(NavState::PlotListPopulated)?;
        let plot_list = Locator::id(page::PLOT_LIST_ID);
        let (_, options) = wait_for_options(self.driver, &plot_list, 1, self.detail_bounds())
            .await
            .map_err(|e| match e {
                BrowserError::Timeout(_) => CrawlError::EmptyDropdown {
                    level: "plot list".to_string(),
                },
                other => other.into(),
            })?;
        self.advance(NavState::PlotListPopulated)?;

        let waiter = ChangeWaiter::new(Locator::id(page::DETAIL_PANEL_ID), self.detail_bounds());
        let plots = options.len() - 1;
        let mut previous = String::new();

        for (position, option) in options.iter().skip(1).enumerate() {
            self.advance(NavState::PlotIterating)?;
            self.progress
                .step(format!("PlotIterating {}/{}: {}", position + 1, plots, option.text));

            let armed = arm_observer(&waiter, self.driver, self.log).await?;
            let choice = OptionChoice::Text(option.text.clone());
            if !self.select_with_retry(&plot_list, &choice).await? {
                self.log.record(format!(
                    "Plot option '{}' not found for village '{village}'",
                    option.text
                ));
                return Err(CrawlError::OptionNotFound {
                    level: "plot list".to_string(),
                    choice: choice.to_string(),
                });
            }

            let detail = match self.read_detail(&waiter, &previous, armed).await {
                Ok(text) => text,
                Err(e) if e.class() == ErrorClass::Timeout => {
                    self.log.record(format!(
                        "Timeout waiting for plot info for village '{village}', option: {}",
                        option.text
                    ));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let records = parse_block(&detail);
            self.log
                .record(format!("Plot info: {} record(s) for '{}'", records.len(), option.text));
            result.extend(records);
            previous = detail;
        }

        self.advance(NavState::Complete)
    }

    /// Wait for the detail panel, re-arming the observer before each retry.
    ///
    /// Without a working observer only a content change counts.
    async fn read_detail(
        &self,
        waiter: &ChangeWaiter,
        previous: &str,
        armed: bool,
    ) -> Result<String> {
        let policy = RetryPolicy::new(self.settings.detail_wait_attempts, self.settings.retry_delay());
        let max_attempts = policy.max_attempts.max(1);
        let driver = self.driver;
        let (log, progress) = (self.log, self.progress);

        policy
            .run(
                "plot detail update",
                |e| e.class() == ErrorClass::Timeout,
                |attempt, _| {
                    let message = format!(
                        "Timeout waiting for plot info update on attempt {attempt}/{max_attempts}"
                    );
                    log.record(&message);
                    progress.note(message);
                },
                |attempt| async move {
                    let armed = if attempt > 1 {
                        arm_observer(waiter, driver, log).await?
                    } else {
                        armed
                    };
                    if armed {
                        waiter.await_change(driver, previous).await
                    } else {
                        waiter.await_content_change(driver, previous).await
                    }
                },
            )
            .await
    }

    /// Drive one work item from a fresh session to `Complete`.
    ///
    /// Records are accumulated into `result` as they are parsed, so a
    /// failure midway leaves the partial result with the caller. On error
    /// the navigator ends in [`NavState::Failed`].
    pub async fn run_item(
        &mut self,
        url: &str,
        discovery: &Discovery,
        item: &WorkItem,
        result: &mut ItemResult,
    ) -> Result<()> {
        let outcome = self.drive_item(url, discovery, item, result).await;
        if let Err(e) = &outcome {
            self.log.record(format!("Error encountered at {:?}: {e}", self.state));
            self.fail();
        }
        outcome
    }

    async fn drive_item(
        &mut self,
        url: &str,
        discovery: &Discovery,
        item: &WorkItem,
        result: &mut ItemResult,
    ) -> Result<()> {
        self.open_portal(url).await?;
        let (district, taluka) = self.select_ancestors(discovery.target).await?;
        if district != discovery.district_name || taluka != discovery.taluka_name {
            tracing::warn!(
                "Portal now lists '{}' / '{}' where discovery saw '{}' / '{}'",
                district,
                taluka,
                discovery.district_name,
                discovery.taluka_name
            );
        }

        self.populate_villages().await?;
        self.select_village(item).await?;
        self.verify_map(&item.name).await?;
        self.harvest_plots(&item.name, result).await
    }
}

/// Install the detail panel observer.
///
/// Returns `false` when the script failed, in which case the update flag may
/// still be set from the previous plot. Only session-fatal errors propagate.
async fn arm_observer(
    waiter: &ChangeWaiter,
    driver: &dyn NavigationDriver,
    log: &ItemLog,
) -> Result<bool> {
    match waiter.arm(driver).await {
        Ok(_) => Ok(true),
        Err(e) if e.class() == ErrorClass::SessionFatal => Err(e),
        Err(e) => {
            log.record(format!("Could not watch plot info, comparing content instead: {e}"));
            Ok(false)
        }
    }
}
