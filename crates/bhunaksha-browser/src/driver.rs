use crate::error::Result;
use std::fmt;

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Element id attribute
    Id(String),
    /// Single class name
    Class(String),
    /// Raw CSS selector
    Css(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn class(class: impl Into<String>) -> Self {
        Locator::Class(class.into())
    }

    /// CSS selector equivalent of this locator.
    #[must_use]
    pub fn to_css(&self) -> String {
        match self {
            Locator::Id(id) => format!("[id=\"{}\"]", id.replace('"', "\\\"")),
            Locator::Class(class) => format!(".{class}"),
            Locator::Css(css) => css.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{id}"),
            Locator::Class(class) => write!(f, ".{class}"),
            Locator::Css(css) => f.write_str(css),
        }
    }
}

/// A resolved element reference, valid only within the session that
/// produced it and only until the page replaces the underlying node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub id: u64,
    pub locator: Locator,
}

/// One entry of a `<select>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub index: usize,
    pub text: String,
}

/// Which option of a `<select>` to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    Index(usize),
    Text(String),
}

impl fmt::Display for OptionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionChoice::Index(index) => write!(f, "index {index}"),
            OptionChoice::Text(text) => write!(f, "'{text}'"),
        }
    }
}

/// Capabilities the crawler consumes from a browser session.
///
/// Every call is fallible; transient conditions surface as errors for
/// which [`crate::BrowserError::is_transient`] is true. Implementations are
/// stateful only within one open session.
#[async_trait::async_trait]
pub trait NavigationDriver: Send + Sync {
    /// Navigate to a URL
    async fn open(&self, url: &str) -> Result<()>;

    /// Resolve an element, failing immediately if it is absent
    async fn find_element(&self, locator: &Locator) -> Result<ElementHandle>;

    /// List the options of a `<select>` element in order
    async fn options_of(&self, handle: &ElementHandle) -> Result<Vec<SelectOption>>;

    /// Commit an option; `false` when no option matches the choice
    async fn select_option(&self, handle: &ElementHandle, choice: &OptionChoice) -> Result<bool>;

    /// Evaluate a script expression in the page and return its value
    async fn execute_script(&self, script: &str) -> Result<serde_json::Value>;

    /// Rendered text content of an element
    async fn read_text(&self, handle: &ElementHandle) -> Result<String>;

    /// Release the session; later calls fail with `SessionClosed`
    async fn close(&self) -> Result<()>;
}

/// Opens fresh, independent navigation sessions.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn NavigationDriver>>;
}
