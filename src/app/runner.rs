use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};

use super::site::SiteDriver;
use crate::config::Config;
use crate::slot::{Slot, select_slot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BookingOutcome {
    Booked(Slot),
    NoMatch,
}

#[derive(Debug, Clone)]
pub(crate) struct BookingReport {
    pub(crate) outcome: BookingOutcome,
    pub(crate) slots_seen: usize,
    pub(crate) screenshot: Option<PathBuf>,
}

pub(crate) fn screenshot_name(booked: bool, run_date: NaiveDate) -> String {
    let status = if booked { "success" } else { "failed" };
    format!("booking_{status}_{}.png", run_date.format("%Y%m%d"))
}

/// One booking attempt. A driver failure still leaves a `booking_failed_`
/// screenshot behind when the page can be captured, and the original error
/// is returned.
pub(crate) fn run_booking<D: SiteDriver>(
    driver: &mut D,
    config: &Config,
    run_date: NaiveDate,
) -> Result<BookingReport> {
    match attempt(driver, config) {
        Ok((outcome, slots_seen)) => {
            let booked = matches!(outcome, BookingOutcome::Booked(_));
            let path = config.screenshot_dir.join(screenshot_name(booked, run_date));
            let screenshot = save_screenshot(driver, &path);
            Ok(BookingReport {
                outcome,
                slots_seen,
                screenshot,
            })
        }
        Err(err) => {
            let path = config.screenshot_dir.join(screenshot_name(false, run_date));
            save_screenshot(driver, &path);
            Err(err)
        }
    }
}

/// Signs in and scrapes the tee sheet without reserving anything.
pub(crate) fn list_slots<D: SiteDriver>(driver: &mut D, config: &Config) -> Result<Vec<Slot>> {
    driver
        .sign_in(&config.credentials)
        .context("sign-in failed")?;
    driver
        .fetch_available_slots(config.booking_date)
        .context("failed to read the tee sheet")
}

fn attempt<D: SiteDriver>(driver: &mut D, config: &Config) -> Result<(BookingOutcome, usize)> {
    let slots = list_slots(driver, config)?;

    let Some(slot) = select_slot(&config.preference, &slots) else {
        info!(
            "No eligible slot among {} rows for {}",
            slots.len(),
            config.preference
        );
        return Ok((BookingOutcome::NoMatch, slots.len()));
    };

    info!("Chosen slot: {slot}");
    driver
        .reserve(slot)
        .with_context(|| format!("failed to reserve {slot}"))?;
    Ok((BookingOutcome::Booked(slot.clone()), slots.len()))
}

fn save_screenshot<D: SiteDriver>(driver: &mut D, path: &Path) -> Option<PathBuf> {
    match driver.capture_screenshot(path) {
        Ok(()) => {
            info!("Screenshot saved: {}", path.display());
            Some(path.to_path_buf())
        }
        Err(err) => {
            warn!("could not save screenshot {}: {err:#}", path.display());
            None
        }
    }
}
