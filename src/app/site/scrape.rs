use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use serde_json::{Value, json};

use crate::slot::{BookMode, Slot, Tee};

static ROW_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(am|pm)\b").expect("row time pattern is valid")
});

static SITE_ORIGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://[^/?#]+)").expect("origin pattern is valid"));

const LOGIN_FAILURE_MARKERS: [&str; 2] = ["invalid password", "login failed"];

/// Attribute the page script sets on the element it picked.
pub(crate) const TARGET_MARKER: &str = "data-teebook-target";

/// Screenshots taller than this are clipped; Chrome refuses larger surfaces.
pub(crate) const MAX_CAPTURE_HEIGHT: f64 = 16_384.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Locator {
    Css(&'static str),
    XPath(&'static str),
}

impl Locator {
    fn to_json(self) -> Value {
        match self {
            Locator::Css(query) => json!({ "kind": "css", "query": query }),
            Locator::XPath(query) => json!({ "kind": "xpath", "query": query }),
        }
    }
}

/// What the booking calendar shows for the target date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventLink {
    Open(String),
    NotOpen,
    Missing,
}

/// Label the calendar uses for a date, e.g. `15 Mar`.
pub(crate) fn date_label(date: NaiveDate) -> String {
    date.format("%-d %b").to_string()
}

/// JS pattern matching `label` only as a whole date, so `5 Mar` does not
/// hit `15 Mar`.
pub(crate) fn date_label_pattern(label: &str) -> String {
    format!(r"(^|[^0-9]){}\b", regex::escape(label))
}

/// Script that marks the first visible element matched by the earliest
/// locator that has one, and reports that locator's index.
pub(crate) fn visible_target_script(locators: &[Locator]) -> Result<String> {
    let candidates: Vec<Value> = locators.iter().map(|loc| loc.to_json()).collect();
    let candidates =
        serde_json::to_string(&candidates).context("failed to encode element locators")?;
    Ok(format!(
        r#"(() => {{
  const marker = '{TARGET_MARKER}';
  const visible = el => !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
  document.querySelectorAll('[' + marker + ']').forEach(el => el.removeAttribute(marker));
  const candidates = {candidates};
  for (let i = 0; i < candidates.length; i++) {{
    const c = candidates[i];
    let nodes = [];
    if (c.kind === 'xpath') {{
      const snap = document.evaluate(c.query, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
      for (let j = 0; j < snap.snapshotLength; j++) nodes.push(snap.snapshotItem(j));
    }} else {{
      nodes = Array.from(document.querySelectorAll(c.query));
    }}
    const hit = nodes.find(visible);
    if (hit) {{
      hit.setAttribute(marker, '1');
      return JSON.stringify({{ index: i }});
    }}
  }}
  return JSON.stringify({{ index: null }});
}})()"#
    ))
}

pub(crate) fn parse_marked_index(value: &Value) -> Option<usize> {
    value
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

/// Full document size as `(width, height)`, height capped.
pub(crate) fn parse_page_extent(value: &Value) -> Option<(f64, f64)> {
    let width = value.get("width").and_then(Value::as_f64)?;
    let height = value.get("height").and_then(Value::as_f64)?;
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some((width.ceil(), height.ceil().min(MAX_CAPTURE_HEIGHT)))
}

pub(crate) fn login_rejected(body: &str) -> bool {
    let body = body.to_lowercase();
    LOGIN_FAILURE_MARKERS
        .iter()
        .any(|marker| body.contains(marker))
}

/// First `h:mm am/pm` in the row text, as a 24-hour time.
pub(crate) fn extract_row_time(text: &str) -> Option<NaiveTime> {
    let caps = ROW_TIME.captures(text)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = caps.get(3)?.as_str().eq_ignore_ascii_case("pm");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub(crate) fn detect_tee(text: &str) -> Tee {
    let lower = text.to_lowercase();
    if lower.contains("10th tee") {
        Tee::Tenth
    } else if lower.contains("1st tee") {
        Tee::First
    } else {
        Tee::Unknown
    }
}

pub(crate) fn site_origin(url: &str) -> Option<&str> {
    SITE_ORIGIN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub(crate) fn resolve_href(base_url: &str, href: &str) -> Result<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(href.to_string());
    }
    let origin = site_origin(base_url)
        .with_context(|| format!("cannot resolve link against `{base_url}`"))?;
    if href.starts_with('/') {
        Ok(format!("{origin}{href}"))
    } else {
        Ok(format!("{origin}/{href}"))
    }
}

/// Scripts hand results back as JSON text; unwrap that into a value.
pub(crate) fn decode_script_result(raw: Option<Value>) -> Result<Value> {
    match raw {
        Some(Value::String(text)) => {
            serde_json::from_str(&text).context("page script returned malformed JSON")
        }
        Some(other) => Ok(other),
        None => Err(anyhow!("page script returned nothing")),
    }
}

pub(crate) fn parse_event_lookup(value: &Value) -> EventLink {
    if !value.get("found").and_then(Value::as_bool).unwrap_or(false) {
        return EventLink::Missing;
    }
    match value.get("href").and_then(Value::as_str).map(str::trim) {
        Some(href) if !href.is_empty() => EventLink::Open(href.to_string()),
        _ => EventLink::NotOpen,
    }
}

/// Turns the scraped `div.row-time` records into slots. Rows without a
/// readable time or without bookable cells are skipped, but `row` keeps
/// the original position so the row can be located again.
pub(crate) fn parse_tee_rows(value: &Value, day: Weekday, mode: BookMode) -> Vec<Slot> {
    let Some(rows) = value.as_array() else {
        return Vec::new();
    };

    let mut slots = Vec::new();
    for (row, record) in rows.iter().enumerate() {
        let text = record.get("text").and_then(Value::as_str).unwrap_or("");
        let Some(time) = extract_row_time(text) else {
            continue;
        };
        let cells = count_field(record, "cells");
        if cells == 0 {
            continue;
        }
        let free = count_field(record, "free").min(cells);
        let available = match mode {
            BookMode::Group => flag_field(record, "group"),
            BookMode::Join | BookMode::New => flag_field(record, "bookMe"),
        };

        slots.push(Slot {
            day,
            time,
            capacity: cells,
            available,
            tee: detect_tee(text),
            booked: cells - free,
            row,
        });
    }
    slots
}

fn count_field(record: &Value, key: &str) -> u8 {
    record
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| u8::try_from(n).unwrap_or(u8::MAX))
        .unwrap_or(0)
}

fn flag_field(record: &Value, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}
