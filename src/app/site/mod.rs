mod chrome;
mod scrape;

use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;

use crate::config::Credentials;
use crate::slot::Slot;

pub(crate) use chrome::ChromeDriver;

/// Everything the booking run needs from the club website.
pub(crate) trait SiteDriver {
    fn sign_in(&mut self, credentials: &Credentials) -> Result<()>;

    /// Tee-sheet rows for `date`, in the order the page lists them.
    fn fetch_available_slots(&mut self, date: NaiveDate) -> Result<Vec<Slot>>;

    fn reserve(&mut self, slot: &Slot) -> Result<()>;

    fn capture_screenshot(&mut self, path: &Path) -> Result<()>;
}
