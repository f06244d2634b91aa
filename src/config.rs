use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, Days, NaiveDate, NaiveTime, Weekday};
use log::debug;

use crate::paths::default_config_file_path;
use crate::slot::{BookMode, Preference, TeeFilter};

pub const DEFAULT_LOGIN_URL: &str = "https://www.thelakesgolfclub.com.au/security/login.msp";
pub const DEFAULT_BOOKING_URL: &str =
    "https://www.thelakesgolfclub.com.au/members/bookings/index.xsp?booking_resource_id=3000000";

const DEFAULT_EARLIEST: &str = "08:00";
const DEFAULT_LATEST: &str = "10:00";
const DEFAULT_PLAYERS: u8 = 4;
const DEFAULT_WAIT_SECS: u64 = 10;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub login_url: String,
    pub booking_url: String,
    pub wait: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub preference: Preference,
    pub credentials: Credentials,
    pub booking_date: NaiveDate,
    pub headless: bool,
    pub site: SiteConfig,
    pub screenshot_dir: PathBuf,
}

impl Config {
    /// Loads the env-style file (if any) into the process environment, then
    /// builds the config from the environment.
    pub fn load(explicit: Option<&Path>, today: NaiveDate) -> Result<Self> {
        load_env_file(explicit)?;
        Self::from_lookup(|key| env::var(key).ok(), today)
    }

    pub fn from_lookup<F>(lookup: F, today: NaiveDate) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let credentials = Credentials {
            username: get("GOLF_USERNAME").context("GOLF_USERNAME is not set")?,
            password: get("GOLF_PASSWORD").context("GOLF_PASSWORD is not set")?,
        };

        let day = get("GOLF_DAY")
            .map(|raw| parse_weekday(&raw).context("invalid GOLF_DAY"))
            .transpose()?;
        let explicit_date = get("GOLF_BOOKING_DATE")
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid GOLF_BOOKING_DATE `{raw}` (expected YYYY-MM-DD)"))
            })
            .transpose()?;

        let (day, booking_date) = match (day, explicit_date) {
            (Some(day), Some(date)) if date.weekday() != day => bail!(
                "GOLF_BOOKING_DATE {date} is a {}, but GOLF_DAY is {day}",
                date.weekday()
            ),
            (_, Some(date)) => (date.weekday(), date),
            (Some(day), None) => (day, next_weekday_after(today, day)),
            (None, None) => bail!("set GOLF_DAY or GOLF_BOOKING_DATE"),
        };

        let earliest = parse_clock(&get("GOLF_EARLIEST").unwrap_or(DEFAULT_EARLIEST.into()))
            .context("invalid GOLF_EARLIEST")?;
        let latest = parse_clock(&get("GOLF_LATEST").unwrap_or(DEFAULT_LATEST.into()))
            .context("invalid GOLF_LATEST")?;
        let players = match get("GOLF_PLAYERS") {
            Some(raw) => raw
                .parse::<u8>()
                .with_context(|| format!("invalid GOLF_PLAYERS `{raw}`"))?,
            None => DEFAULT_PLAYERS,
        };
        let tee = get("GOLF_TEE")
            .map(|raw| raw.parse::<TeeFilter>().context("invalid GOLF_TEE"))
            .transpose()?
            .unwrap_or_default();
        let mode = get("GOLF_BOOK_MODE")
            .map(|raw| raw.parse::<BookMode>().context("invalid GOLF_BOOK_MODE"))
            .transpose()?
            .unwrap_or_default();

        let preference = Preference::new(day, earliest, latest, players)
            .context("invalid booking window")?
            .with_tee(tee)
            .with_mode(mode);

        let headless = match get("GOLF_HEADLESS") {
            Some(raw) => parse_bool(&raw).context("invalid GOLF_HEADLESS")?,
            None => true,
        };
        let wait_secs = match get("GOLF_WAIT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid GOLF_WAIT_SECS `{raw}`"))?,
            None => DEFAULT_WAIT_SECS,
        };

        Ok(Self {
            preference,
            credentials,
            booking_date,
            headless,
            site: SiteConfig {
                login_url: get("GOLF_LOGIN_URL").unwrap_or(DEFAULT_LOGIN_URL.into()),
                booking_url: get("GOLF_BOOKING_URL").unwrap_or(DEFAULT_BOOKING_URL.into()),
                wait: Duration::from_secs(wait_secs.max(1)),
            },
            screenshot_dir: get("GOLF_SCREENSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

fn load_env_file(explicit: Option<&Path>) -> Result<()> {
    if let Some(path) = explicit {
        dotenv::from_path(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        debug!("loaded settings from {}", path.display());
        return Ok(());
    }

    let local = Path::new(".env");
    if local.exists() {
        dotenv::from_path(local).context("failed to read ./.env")?;
        debug!("loaded settings from ./.env");
        return Ok(());
    }

    let fallback = default_config_file_path()?;
    if fallback.exists() {
        dotenv::from_path(&fallback)
            .with_context(|| format!("failed to read config file {}", fallback.display()))?;
        debug!("loaded settings from {}", fallback.display());
    }
    Ok(())
}

pub(crate) fn parse_weekday(raw: &str) -> Result<Weekday> {
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| anyhow!("unknown weekday `{}`", raw.trim()))
}

pub(crate) fn parse_clock(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("`{}` is not a HH:MM time", raw.trim()))
}

pub(crate) fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("`{other}` is not a boolean")),
    }
}

/// The next date strictly after `today` that falls on `day`.
pub(crate) fn next_weekday_after(today: NaiveDate, day: Weekday) -> NaiveDate {
    let ahead = (7 + day.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Days::new(u64::from(ahead))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn today() -> NaiveDate {
        // a Tuesday
        NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date")
    }

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned(), today())
    }

    const BASE: [(&str, &str); 3] = [
        ("GOLF_USERNAME", "member"),
        ("GOLF_PASSWORD", "secret"),
        ("GOLF_DAY", "Thursday"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs = BASE.to_vec();
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn defaults_fill_in_optional_settings() {
        let config = load(&BASE).expect("config should load");
        let pref = &config.preference;
        assert_eq!(pref.day(), Weekday::Thu);
        assert_eq!(pref.earliest(), NaiveTime::from_hms_opt(8, 0, 0).expect("time"));
        assert_eq!(pref.latest(), NaiveTime::from_hms_opt(10, 0, 0).expect("time"));
        assert_eq!(pref.players(), 4);
        assert_eq!(pref.tee(), TeeFilter::Any);
        assert_eq!(pref.mode(), BookMode::Group);
        assert!(config.headless);
        assert_eq!(config.site.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(config.site.wait, Duration::from_secs(10));
        assert_eq!(config.screenshot_dir, PathBuf::from("."));
        assert_eq!(
            config.booking_date,
            NaiveDate::from_ymd_opt(2026, 3, 12).expect("valid date")
        );
    }

    #[test]
    fn explicit_settings_override_defaults() {
        let config = load(&with(&[
            ("GOLF_EARLIEST", "11:00"),
            ("GOLF_LATEST", "13:00"),
            ("GOLF_PLAYERS", "2"),
            ("GOLF_TEE", "10th"),
            ("GOLF_BOOK_MODE", "join"),
            ("GOLF_HEADLESS", "no"),
            ("GOLF_SCREENSHOT_DIR", "/tmp/shots"),
            ("GOLF_WAIT_SECS", "25"),
        ]))
        .expect("config should load");
        assert_eq!(config.preference.players(), 2);
        assert_eq!(config.preference.tee(), TeeFilter::Tenth);
        assert_eq!(config.preference.mode(), BookMode::Join);
        assert!(!config.headless);
        assert_eq!(config.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.site.wait, Duration::from_secs(25));
    }

    #[test]
    fn missing_credentials_fail_fast() {
        let err = load(&[("GOLF_USERNAME", "member"), ("GOLF_DAY", "thu")])
            .expect_err("password is required");
        assert!(err.to_string().contains("GOLF_PASSWORD"));

        let err = load(&[
            ("GOLF_USERNAME", "  "),
            ("GOLF_PASSWORD", "secret"),
            ("GOLF_DAY", "thu"),
        ])
        .expect_err("blank username is rejected");
        assert!(err.to_string().contains("GOLF_USERNAME"));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = load(&with(&[("GOLF_EARLIEST", "13:00"), ("GOLF_LATEST", "11:00")]))
            .expect_err("window is inverted");
        assert!(format!("{err:#}").contains("after latest"));
    }

    #[test]
    fn malformed_time_names_the_key() {
        let err = load(&with(&[("GOLF_LATEST", "noon")])).expect_err("bad time");
        assert!(err.to_string().contains("GOLF_LATEST"));
    }

    #[test]
    fn malformed_booking_date_names_the_key() {
        let err = load(&with(&[("GOLF_BOOKING_DATE", "15/03/2026")])).expect_err("bad date");
        let message = format!("{err:#}");
        assert!(message.contains("GOLF_BOOKING_DATE"));
        assert!(message.contains("15/03/2026"));
    }

    #[test]
    fn non_numeric_wait_names_the_key() {
        let err = load(&with(&[("GOLF_WAIT_SECS", "soon")])).expect_err("bad wait");
        assert!(format!("{err:#}").contains("GOLF_WAIT_SECS"));
    }

    #[test]
    fn player_count_outside_range_is_rejected() {
        assert!(load(&with(&[("GOLF_PLAYERS", "1")])).is_err());
        assert!(load(&with(&[("GOLF_PLAYERS", "5")])).is_err());
        assert!(load(&with(&[("GOLF_PLAYERS", "three")])).is_err());
        assert!(load(&with(&[("GOLF_PLAYERS", "3")])).is_ok());
    }

    #[test]
    fn unknown_enums_are_rejected() {
        assert!(load(&with(&[("GOLF_TEE", "5th")])).is_err());
        assert!(load(&with(&[("GOLF_BOOK_MODE", "steal")])).is_err());
        assert!(load(&with(&[("GOLF_HEADLESS", "maybe")])).is_err());
    }

    #[test]
    fn booking_date_must_agree_with_day() {
        let err = load(&with(&[("GOLF_BOOKING_DATE", "2026-03-15")]))
            .expect_err("15 March 2026 is a Sunday");
        assert!(err.to_string().contains("GOLF_DAY"));

        let config = load(&with(&[("GOLF_BOOKING_DATE", "2026-03-19")]))
            .expect("19 March 2026 is a Thursday");
        assert_eq!(
            config.booking_date,
            NaiveDate::from_ymd_opt(2026, 3, 19).expect("valid date")
        );
    }

    #[test]
    fn booking_date_alone_sets_the_day() {
        let config = load(&[
            ("GOLF_USERNAME", "member"),
            ("GOLF_PASSWORD", "secret"),
            ("GOLF_BOOKING_DATE", "2026-03-15"),
        ])
        .expect("config should load");
        assert_eq!(config.preference.day(), Weekday::Sun);
    }

    #[test]
    fn day_or_date_is_required() {
        let err = load(&[("GOLF_USERNAME", "member"), ("GOLF_PASSWORD", "secret")])
            .expect_err("no target");
        assert!(err.to_string().contains("GOLF_DAY"));
    }

    #[test]
    fn next_weekday_skips_today() {
        let tuesday = today();
        assert_eq!(
            next_weekday_after(tuesday, Weekday::Tue),
            NaiveDate::from_ymd_opt(2026, 3, 17).expect("valid date")
        );
        assert_eq!(
            next_weekday_after(tuesday, Weekday::Mon),
            NaiveDate::from_ymd_opt(2026, 3, 16).expect("valid date")
        );
        assert_eq!(
            next_weekday_after(tuesday, Weekday::Wed),
            NaiveDate::from_ymd_opt(2026, 3, 11).expect("valid date")
        );
    }

    #[test]
    fn weekday_names_parse_loosely() {
        assert_eq!(parse_weekday("Thursday").expect("long"), Weekday::Thu);
        assert_eq!(parse_weekday(" thu ").expect("short"), Weekday::Thu);
        assert!(parse_weekday("Thorsday").is_err());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            username: "member".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("member"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let path = env::temp_dir().join("teebook-missing-dir/absent.env");
        let err = load_env_file(Some(&path)).expect_err("file is missing");
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn environment_wins_over_config_file() {
        let path = env::temp_dir().join(format!("teebook-precedence-{}.env", std::process::id()));
        std::fs::write(
            &path,
            "TEEBOOK_TEST_PRECEDENCE=from_file\nTEEBOOK_TEST_FILE_ONLY=from_file\n",
        )
        .expect("write env file");
        // SAFETY: no other test reads or writes these variables.
        unsafe {
            env::set_var("TEEBOOK_TEST_PRECEDENCE", "from_env");
            env::remove_var("TEEBOOK_TEST_FILE_ONLY");
        }

        let loaded = load_env_file(Some(&path));
        let _ = std::fs::remove_file(&path);
        loaded.expect("env file should load");

        assert_eq!(
            env::var("TEEBOOK_TEST_PRECEDENCE").as_deref(),
            Ok("from_env")
        );
        assert_eq!(
            env::var("TEEBOOK_TEST_FILE_ONLY").as_deref(),
            Ok("from_file")
        );
    }
}
