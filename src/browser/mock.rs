//! In-memory mock browser driver.
//!
//! Each launch consumes a scripted [`MockBehavior`] describing how pages in
//! that context behave: where navigation lands, which selectors are visible,
//! what JavaScript evaluation returns, and which clicks change the URL. All
//! driver calls are recorded so tests can assert on ordering - notably that
//! storage restoration registers its init script before the first
//! navigation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{BrowserHandle, BrowserLauncher, BrowserPage};
use crate::error::{SessionError, SessionResult};
use crate::snapshot::Cookie;

/// Scripted behavior for every page created inside one launched context.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// URL the page reports after any navigation; `None` means the page
    /// lands on the navigated URL itself. Set this to an identity-provider
    /// URL to simulate the unauthenticated redirect.
    pub url_after_navigate: Option<String>,
    /// URL installed when the given selector is clicked (e.g. the final
    /// redirect after submitting the MFA code).
    pub url_after_click: HashMap<String, String>,
    /// Selectors that report visible; everything else times out quietly.
    pub visible_selectors: Vec<String>,
    /// `(substring, response)` pairs consulted by `evaluate`; the first
    /// entry whose substring occurs in the expression wins.
    pub eval_responses: Vec<(String, serde_json::Value)>,
    /// Cookies already present in the context at launch.
    pub initial_cookies: Vec<Cookie>,
    /// When set, every driver call fails with this message.
    pub fail_with: Option<String>,
}

impl MockBehavior {
    pub fn with_visible(mut self, selector: &str) -> Self {
        self.visible_selectors.push(selector.to_string());
        self
    }

    pub fn with_redirect_on_navigate(mut self, url: &str) -> Self {
        self.url_after_navigate = Some(url.to_string());
        self
    }

    pub fn with_url_after_click(mut self, selector: &str, url: &str) -> Self {
        self.url_after_click
            .insert(selector.to_string(), url.to_string());
        self
    }

    pub fn with_eval_response(mut self, needle: &str, value: serde_json::Value) -> Self {
        self.eval_responses.push((needle.to_string(), value));
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    cookies: Vec<Cookie>,
    init_scripts: Vec<String>,
    calls: Vec<String>,
}

/// A scripted page. Cloning yields another view of the same page.
#[derive(Debug, Clone)]
pub struct MockPage {
    behavior: Arc<MockBehavior>,
    state: Arc<Mutex<PageState>>,
}

impl MockPage {
    fn new(behavior: Arc<MockBehavior>) -> Self {
        let state = PageState {
            url: "about:blank".to_string(),
            cookies: behavior.initial_cookies.clone(),
            ..PageState::default()
        };
        Self {
            behavior,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn check_failure(&self) -> SessionResult<()> {
        match &self.behavior.fail_with {
            Some(message) => Err(SessionError::browser(message.clone())),
            None => Ok(()),
        }
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Every driver call this page received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Init scripts registered on this page, in registration order.
    pub fn init_scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().init_scripts.clone()
    }

    /// The URL the page currently reports (synchronous inspection).
    pub fn url_now(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        self.check_failure()?;
        self.record(format!("navigate:{url}"));
        let landing = self
            .behavior
            .url_after_navigate
            .clone()
            .unwrap_or_else(|| url.to_string());
        self.state.lock().unwrap().url = landing;
        Ok(())
    }

    async fn current_url(&self) -> SessionResult<String> {
        self.check_failure()?;
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn wait_for_visible(&self, selector: &str, _timeout: Duration) -> SessionResult<bool> {
        self.check_failure()?;
        self.record(format!("wait_for_visible:{selector}"));
        Ok(self
            .behavior
            .visible_selectors
            .iter()
            .any(|s| s == selector))
    }

    async fn fill(&self, selector: &str, value: &str) -> SessionResult<()> {
        self.check_failure()?;
        self.record(format!("fill:{selector}={value}"));
        Ok(())
    }

    async fn click(&self, selector: &str) -> SessionResult<()> {
        self.check_failure()?;
        self.record(format!("click:{selector}"));
        if let Some(url) = self.behavior.url_after_click.get(selector) {
            self.state.lock().unwrap().url = url.clone();
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> SessionResult<serde_json::Value> {
        self.check_failure()?;
        self.record("evaluate".to_string());
        for (needle, value) in &self.behavior.eval_responses {
            if expression.contains(needle.as_str()) {
                return Ok(value.clone());
            }
        }
        Ok(serde_json::Value::Null)
    }

    async fn add_init_script(&self, script: &str) -> SessionResult<()> {
        self.check_failure()?;
        self.record("init_script".to_string());
        self.state
            .lock()
            .unwrap()
            .init_scripts
            .push(script.to_string());
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> SessionResult<()> {
        self.check_failure()?;
        self.record(format!("set_cookies:{}", cookies.len()));
        self.state.lock().unwrap().cookies = cookies.to_vec();
        Ok(())
    }

    async fn cookies(&self) -> SessionResult<Vec<Cookie>> {
        self.check_failure()?;
        Ok(self.state.lock().unwrap().cookies.clone())
    }
}

struct MockHandle {
    behavior: Arc<MockBehavior>,
    launcher: Arc<LauncherState>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserHandle for MockHandle {
    async fn new_page(&self) -> SessionResult<Box<dyn BrowserPage>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::browser("context already closed"));
        }
        let page = MockPage::new(Arc::clone(&self.behavior));
        self.launcher.pages.lock().unwrap().push(page.clone());
        Ok(Box::new(page))
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct LauncherState {
    behaviors: Mutex<VecDeque<MockBehavior>>,
    pages: Mutex<Vec<MockPage>>,
    handles: Mutex<Vec<Arc<AtomicBool>>>,
    launches: AtomicUsize,
}

/// Scriptable launcher. Cloning yields another view of the same launcher,
/// so tests can keep one clone for inspection after handing the other to a
/// session manager.
#[derive(Clone, Default)]
pub struct MockLauncher {
    state: Arc<LauncherState>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior for the next launched context. Launches beyond
    /// the queued scripts get `MockBehavior::default()`.
    pub fn push_behavior(&self, behavior: MockBehavior) {
        self.state.behaviors.lock().unwrap().push_back(behavior);
    }

    /// How many browser contexts were launched.
    pub fn launch_count(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    /// Every page created across all launches, in creation order.
    pub fn pages(&self) -> Vec<MockPage> {
        self.state.pages.lock().unwrap().clone()
    }

    /// True when every launched context was closed - the resource-leak
    /// check for disposable validation contexts.
    pub fn all_handles_closed(&self) -> bool {
        self.state
            .handles
            .lock()
            .unwrap()
            .iter()
            .all(|closed| closed.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, _headless: bool) -> SessionResult<Box<dyn BrowserHandle>> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .state
            .behaviors
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        let closed = Arc::new(AtomicBool::new(false));
        self.state.handles.lock().unwrap().push(Arc::clone(&closed));
        Ok(Box::new(MockHandle {
            behavior: Arc::new(behavior),
            launcher: Arc::clone(&self.state),
            closed,
        }))
    }
}
