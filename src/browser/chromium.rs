//! Chrome DevTools Protocol driver backed by chromiumoxide.
//!
//! Launches a headless (or headed, for login debugging) Chromium with a
//! spawned CDP handler loop. Pre-navigation storage seeding maps onto
//! `Page.addScriptToEvaluateOnNewDocument`, which is the only CDP hook that
//! runs before the application's own bootstrap scripts.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use log::debug;
use tokio::task::JoinHandle;

use crate::browser::{BrowserHandle, BrowserLauncher, BrowserPage};
use crate::error::{SessionError, SessionResult};
use crate::snapshot::Cookie;

const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// Launches Chromium instances over CDP.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    /// Extra command-line arguments appended to every launch.
    pub extra_args: Vec<String>,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_string());
        self
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, headless: bool) -> SessionResult<Box<dyn BrowserHandle>> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox");
        if !headless {
            builder = builder.with_head();
        }
        for arg in &self.extra_args {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(SessionError::browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::browser(format!("failed to launch Chromium: {e}")))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Box::new(ChromiumHandle {
            browser,
            handler_task,
        }))
    }
}

struct ChromiumHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserHandle for ChromiumHandle {
    async fn new_page(&self) -> SessionResult<Box<dyn BrowserPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::browser(format!("failed to open page: {e}")))?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&mut self) -> SessionResult<()> {
        let result = self.browser.close().await;
        self.handler_task.abort();
        result.map_err(|e| SessionError::browser(format!("failed to close browser: {e}")))
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| SessionError::browser(format!("navigation to {url} failed: {e}")))?;
        // SPA redirect chains may keep navigating; the initial load is enough
        // here, URL polling handles the rest.
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn current_url(&self) -> SessionResult<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| SessionError::browser(format!("failed to read URL: {e}")))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> SessionResult<bool> {
        let sel = serde_json::to_string(selector)?;
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (el === null) return false; \
             const rect = el.getBoundingClientRect(); \
             return rect.width > 0 && rect.height > 0; }})()"
        );

        let deadline = Instant::now() + timeout;
        loop {
            // Evaluation can fail transiently mid-navigation; treat that the
            // same as "not visible yet" and keep polling until the deadline.
            match self.page.evaluate(expression.clone()).await {
                Ok(result) => {
                    let visible = result
                        .into_value::<serde_json::Value>()
                        .ok()
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    if visible {
                        return Ok(true);
                    }
                }
                Err(e) => debug!("visibility probe for {selector} raced navigation: {e}"),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> SessionResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| SessionError::browser(format!("element {selector} not found: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| SessionError::browser(format!("failed to focus {selector}: {e}")))?;
        element
            .type_str(value)
            .await
            .map_err(|e| SessionError::browser(format!("failed to type into {selector}: {e}")))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> SessionResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| SessionError::browser(format!("element {selector} not found: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| SessionError::browser(format!("failed to click {selector}: {e}")))?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> SessionResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| SessionError::browser(format!("evaluate failed: {e}")))?;
        result
            .into_value::<serde_json::Value>()
            .map_err(|e| SessionError::browser(format!("evaluate result not JSON: {e}")))
    }

    async fn add_init_script(&self, script: &str) -> SessionResult<()> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(|e| SessionError::browser(format!("failed to register init script: {e}")))?;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> SessionResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(&cookie.name)
                .value(&cookie.value)
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            if !cookie.domain.is_empty() {
                builder = builder.domain(&cookie.domain);
            }
            if !cookie.path.is_empty() {
                builder = builder.path(&cookie.path);
            }
            if cookie.expires >= 0.0 {
                builder = builder.expires(TimeSinceEpoch::new(cookie.expires));
            }
            if let Some(same_site) = cookie.same_site.as_deref().and_then(same_site_from_str) {
                builder = builder.same_site(same_site);
            }
            params.push(builder.build().map_err(SessionError::browser)?);
        }

        self.page
            .set_cookies(params)
            .await
            .map_err(|e| SessionError::browser(format!("failed to set cookies: {e}")))?;
        Ok(())
    }

    async fn cookies(&self) -> SessionResult<Vec<Cookie>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| SessionError::browser(format!("failed to read cookies: {e}")))?;

        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: *c.expires.inner(),
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.map(same_site_to_string),
            })
            .collect())
    }
}

fn same_site_from_str(value: &str) -> Option<CookieSameSite> {
    match value {
        "Strict" => Some(CookieSameSite::Strict),
        "Lax" => Some(CookieSameSite::Lax),
        "None" => Some(CookieSameSite::None),
        _ => Option::None,
    }
}

fn same_site_to_string(value: CookieSameSite) -> String {
    match value {
        CookieSameSite::Strict => "Strict".to_string(),
        CookieSameSite::Lax => "Lax".to_string(),
        CookieSameSite::None => "None".to_string(),
    }
}
