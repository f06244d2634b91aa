use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate};
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use log::{debug, info};

use super::SiteDriver;
use super::scrape::{
    EventLink, Locator, TARGET_MARKER, date_label, date_label_pattern, decode_script_result,
    extract_row_time, login_rejected, parse_event_lookup, parse_marked_index, parse_page_extent,
    parse_tee_rows, resolve_href, visible_target_script,
};
use crate::config::{Credentials, SiteConfig};
use crate::slot::{BookMode, Slot};

const USERNAME_FIELDS: [Locator; 3] = [
    Locator::Css(r#"input[name="memberLogin"]"#),
    Locator::Css(r#"input[name="username"]"#),
    Locator::Css(r#"input[type="text"]"#),
];
const PASSWORD_FIELDS: [Locator; 3] = [
    Locator::Css(r#"input[name="memberPassword"]"#),
    Locator::Css(r#"input[name="password"]"#),
    Locator::Css(r#"input[type="password"]"#),
];
const SUBMIT_BUTTONS: [Locator; 3] = [
    Locator::Css(r#"input[type="submit"]"#),
    Locator::Css(r#"button[type="submit"]"#),
    Locator::XPath("//button[contains(normalize-space(.), 'Login')]"),
];
const CONFIRM_BUTTONS: [Locator; 4] = [
    Locator::XPath("//button[contains(normalize-space(.), 'Confirm')]"),
    Locator::XPath("//button[contains(normalize-space(.), 'OK')]"),
    Locator::XPath("//button[contains(normalize-space(.), 'Yes')]"),
    Locator::XPath("//button[contains(normalize-space(.), 'Submit')]"),
];

const CALENDAR_SETTLE: Duration = Duration::from_millis(4000);
const TEE_SHEET_SETTLE: Duration = Duration::from_millis(3000);
const AFTER_CLICK_SETTLE: Duration = Duration::from_millis(2000);
const CONFIRM_WAIT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const RESIZE_SETTLE: Duration = Duration::from_millis(500);

const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

const PAGE_EXTENT_SCRIPT: &str = r#"(() => {
  const doc = document.documentElement;
  const body = document.body || doc;
  return JSON.stringify({
    width: Math.max(doc.scrollWidth, body.scrollWidth, doc.clientWidth),
    height: Math.max(doc.scrollHeight, body.scrollHeight, doc.clientHeight),
  });
})()"#;

const TEE_ROWS_SCRIPT: &str = r#"(() => {
  const visible = el => !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
  const rows = Array.from(document.querySelectorAll('div.row-time')).map(row => {
    const labels = Array.from(row.querySelectorAll('span.btn-label'));
    return {
      text: row.innerText || '',
      cells: row.querySelectorAll('[data-rowid]').length,
      free: labels.length,
      group: visible(row.querySelector('#btn-book-group')),
      bookMe: labels.some(l => visible(l) && /book me/i.test(l.innerText || '')),
    };
  });
  return JSON.stringify(rows);
})()"#;

fn event_lookup_script(label: &str) -> Result<String> {
    let pattern = serde_json::to_string(&date_label_pattern(label))
        .context("failed to encode date label")?;
    Ok(format!(
        r#"(() => {{
  const label = new RegExp({pattern});
  const block = Array.from(document.querySelectorAll('.full'))
    .find(b => label.test(b.innerText || ''));
  if (!block) return JSON.stringify({{ found: false, href: null }});
  const open = block.querySelector('a.eventStatusOpen');
  return JSON.stringify({{ found: true, href: open ? open.getAttribute('href') : null }});
}})()"#
    ))
}

/// Drives the club website in a local Chrome over CDP. The browser closes
/// when the driver is dropped.
pub(crate) struct ChromeDriver {
    _browser: Browser,
    tab: Arc<Tab>,
    site: SiteConfig,
    mode: BookMode,
}

impl ChromeDriver {
    pub(crate) fn launch(site: &SiteConfig, headless: bool, mode: BookMode) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some((1366, 2400)))
            .idle_browser_timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| anyhow!("invalid browser launch options: {err}"))?;
        let browser = Browser::new(options).context("failed to launch Chrome")?;
        let tab = browser.new_tab().context("failed to open browser tab")?;
        tab.set_default_timeout(site.wait);
        debug!("browser launched (headless: {headless})");

        Ok(Self {
            _browser: browser,
            tab,
            site: site.clone(),
            mode,
        })
    }

    fn open(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .with_context(|| format!("failed to load {url}"))?;
        Ok(())
    }

    fn eval_json(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .context("page script failed")?;
        decode_script_result(result.value)
    }

    fn body_text(&self) -> Result<String> {
        let result = self
            .tab
            .evaluate(BODY_TEXT_SCRIPT, false)
            .context("failed to read page text")?;
        Ok(result
            .value
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    /// First visible element matched by the earliest locator that matches
    /// one. Hidden matches are skipped.
    fn first_visible(&self, locators: &[Locator]) -> Result<Option<(usize, Element<'_>)>> {
        let marked = self.eval_json(&visible_target_script(locators)?)?;
        let Some(index) = parse_marked_index(&marked) else {
            return Ok(None);
        };
        let element = self
            .tab
            .find_element(&format!("[{TARGET_MARKER}]"))
            .context("marked element vanished")?;
        Ok(Some((index, element)))
    }

    fn fill_first(&self, locators: &[Locator], value: &str, what: &str) -> Result<()> {
        let Some((index, field)) = self.first_visible(locators)? else {
            bail!("no visible {what} field on the login page");
        };
        field.click()?;
        field
            .type_into(value)
            .with_context(|| format!("failed to type {what}"))?;
        debug!("filled {what} via {:?}", locators[index]);
        Ok(())
    }

    fn submit_login(&self) -> Result<()> {
        let Some((_, button)) = self.first_visible(&SUBMIT_BUTTONS)? else {
            bail!("no visible login button on the login page");
        };
        button.click().context("failed to click login button")?;
        Ok(())
    }

    fn open_event(&self, date: NaiveDate) -> Result<()> {
        self.open(&self.site.booking_url)?;
        thread::sleep(CALENDAR_SETTLE);

        let label = date_label(date);
        info!("Looking for date: {label}");
        self.tab
            .wait_for_element(".full")
            .context("booking calendar did not show any events")?;

        match parse_event_lookup(&self.eval_json(&event_lookup_script(&label)?)?) {
            EventLink::Open(href) => {
                let url = resolve_href(&self.site.booking_url, &href)?;
                info!("Navigating to: {url}");
                self.open(&url)?;
                thread::sleep(TEE_SHEET_SETTLE);
                Ok(())
            }
            EventLink::NotOpen => bail!(
                "{label} is listed but not open for booking (locked or view only)"
            ),
            EventLink::Missing => bail!("{label} is not listed on the booking calendar"),
        }
    }

    fn row_element(&self, slot: &Slot) -> Result<Element<'_>> {
        let rows = self
            .tab
            .find_elements("div.row-time")
            .context("tee sheet rows disappeared")?;
        let count = rows.len();
        let row = rows
            .into_iter()
            .nth(slot.row)
            .ok_or_else(|| anyhow!("tee sheet has {count} rows, row {} is gone", slot.row))?;

        let text = row.get_inner_text().unwrap_or_default();
        if extract_row_time(&text) != Some(slot.time) {
            bail!(
                "tee sheet changed: row {} no longer shows {}",
                slot.row,
                slot.time.format("%H:%M")
            );
        }
        Ok(row)
    }

    fn confirm_if_asked(&self) -> Result<()> {
        let deadline = Instant::now() + CONFIRM_WAIT;
        loop {
            if let Some((index, button)) = self.first_visible(&CONFIRM_BUTTONS)? {
                button.click().context("failed to click confirmation")?;
                self.tab.wait_until_navigated()?;
                info!("Confirmation clicked ({:?})", CONFIRM_BUTTONS[index]);
                return Ok(());
            }
            if Instant::now() >= deadline {
                debug!("no confirmation dialog appeared");
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Grows the window to the document size so the capture covers the
    /// whole page, not just the first screen.
    fn fit_window_to_page(&self) -> Option<Viewport> {
        let extent = match self.eval_json(PAGE_EXTENT_SCRIPT) {
            Ok(value) => parse_page_extent(&value),
            Err(err) => {
                debug!("could not measure page: {err:#}");
                None
            }
        }?;
        let (width, height) = extent;
        let resized = self.tab.set_bounds(Bounds::Normal {
            left: None,
            top: None,
            width: Some(width),
            height: Some(height),
        });
        if let Err(err) = resized {
            debug!("could not resize window to {width}x{height}: {err:#}");
        }
        thread::sleep(RESIZE_SETTLE);
        Some(Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scale: 1.0,
        })
    }
}

impl SiteDriver for ChromeDriver {
    fn sign_in(&mut self, credentials: &Credentials) -> Result<()> {
        info!("Logging in...");
        self.open(&self.site.login_url)?;
        self.fill_first(&USERNAME_FIELDS, &credentials.username, "username")?;
        self.fill_first(&PASSWORD_FIELDS, &credentials.password, "password")?;
        self.submit_login()?;
        self.tab
            .wait_until_navigated()
            .context("login page did not respond")?;

        if login_rejected(&self.body_text()?) {
            bail!("login failed: the site rejected the credentials");
        }
        info!("Logged in successfully.");
        Ok(())
    }

    fn fetch_available_slots(&mut self, date: NaiveDate) -> Result<Vec<Slot>> {
        self.open_event(date)?;
        self.tab
            .wait_for_element("div.row-time")
            .context("tee sheet did not load")?;
        thread::sleep(AFTER_CLICK_SETTLE);

        let rows = self.eval_json(TEE_ROWS_SCRIPT)?;
        let slots = parse_tee_rows(&rows, date.weekday(), self.mode);
        info!(
            "Found {} tee time rows, {} bookable",
            rows.as_array().map(Vec::len).unwrap_or(0),
            slots.len()
        );
        for slot in &slots {
            debug!("  {slot}");
        }
        Ok(slots)
    }

    fn reserve(&mut self, slot: &Slot) -> Result<()> {
        let label = self.mode.button_label();
        let row = self.row_element(slot)?;

        let button = match self.mode {
            BookMode::Group => row
                .find_element("#btn-book-group")
                .context("row has no Book Group button")?,
            BookMode::Join | BookMode::New => row
                .find_elements("span.btn-label")
                .context("row has no booking buttons")?
                .into_iter()
                .find(|el| {
                    el.get_inner_text()
                        .map(|text| text.to_lowercase().contains("book me"))
                        .unwrap_or(false)
                })
                .ok_or_else(|| anyhow!("row has no Book Me button"))?,
        };

        info!("Clicking '{label}' at {}...", slot.time.format("%H:%M"));
        button
            .click()
            .with_context(|| format!("failed to click '{label}'"))?;
        self.tab.wait_until_navigated()?;
        thread::sleep(AFTER_CLICK_SETTLE);

        self.confirm_if_asked()
    }

    fn capture_screenshot(&mut self, path: &Path) -> Result<()> {
        let png = self
            .tab
            .capture_screenshot(
                CaptureScreenshotFormatOption::Png,
                None,
                self.fit_window_to_page(),
                true,
            )
            .context("failed to capture screenshot")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create screenshot directory {}", parent.display())
            })?;
        }
        fs::write(path, png)
            .with_context(|| format!("failed to write screenshot {}", path.display()))?;
        Ok(())
    }
}
