use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use chrono::{NaiveTime, Weekday};

pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tee {
    First,
    Tenth,
    Unknown,
}

impl fmt::Display for Tee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tee::First => "1st Tee",
            Tee::Tenth => "10th Tee",
            Tee::Unknown => "? Tee",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeeFilter {
    #[default]
    Any,
    First,
    Tenth,
}

impl TeeFilter {
    pub fn accepts(self, tee: Tee) -> bool {
        match self {
            TeeFilter::Any => true,
            TeeFilter::First => tee == Tee::First,
            TeeFilter::Tenth => tee == Tee::Tenth,
        }
    }
}

impl FromStr for TeeFilter {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "any" | "" => Ok(TeeFilter::Any),
            "1" | "1st" | "1st tee" | "first" => Ok(TeeFilter::First),
            "10" | "10th" | "10th tee" | "tenth" => Ok(TeeFilter::Tenth),
            other => Err(anyhow!("unknown tee `{other}` (expected any, 1st or 10th)")),
        }
    }
}

impl fmt::Display for TeeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TeeFilter::Any => "any tee",
            TeeFilter::First => "1st Tee",
            TeeFilter::Tenth => "10th Tee",
        };
        f.write_str(label)
    }
}

/// How the reservation is made on a tee-time row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookMode {
    /// Take the whole tee time, whoever is already on it.
    #[default]
    Group,
    /// Only rows that already have players.
    Join,
    /// Only rows nobody has booked yet.
    New,
}

impl BookMode {
    pub fn accepts_occupancy(self, booked: u8) -> bool {
        match self {
            BookMode::Group => true,
            BookMode::Join => booked > 0,
            BookMode::New => booked == 0,
        }
    }

    pub fn button_label(self) -> &'static str {
        match self {
            BookMode::Group => "Book Group",
            BookMode::Join | BookMode::New => "Book Me",
        }
    }
}

impl FromStr for BookMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "group" | "" => Ok(BookMode::Group),
            "join" => Ok(BookMode::Join),
            "new" => Ok(BookMode::New),
            other => Err(anyhow!(
                "unknown book mode `{other}` (expected group, join or new)"
            )),
        }
    }
}

impl fmt::Display for BookMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BookMode::Group => "group",
            BookMode::Join => "join",
            BookMode::New => "new",
        };
        f.write_str(label)
    }
}

/// One tee-time row as scraped from the tee sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub day: Weekday,
    pub time: NaiveTime,
    pub capacity: u8,
    pub available: bool,
    pub tee: Tee,
    /// Players already holding places in the row.
    pub booked: u8,
    /// Position in scrape order; the driver uses it to find the row again.
    pub row: usize,
}

impl Slot {
    #[cfg(test)]
    pub fn new(day: Weekday, time: NaiveTime, capacity: u8) -> Self {
        Self {
            day,
            time,
            capacity,
            available: true,
            tee: Tee::First,
            booked: 0,
            row: 0,
        }
    }

    pub fn free_places(&self) -> u8 {
        self.capacity.saturating_sub(self.booked)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({}/{} free{})",
            self.day,
            self.time.format("%H:%M"),
            self.tee,
            self.free_places(),
            self.capacity,
            if self.available { "" } else { ", closed" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preference {
    day: Weekday,
    earliest: NaiveTime,
    latest: NaiveTime,
    players: u8,
    tee: TeeFilter,
    mode: BookMode,
}

impl Preference {
    pub fn new(day: Weekday, earliest: NaiveTime, latest: NaiveTime, players: u8) -> Result<Self> {
        if earliest > latest {
            bail!(
                "earliest time {} is after latest time {}",
                earliest.format("%H:%M"),
                latest.format("%H:%M")
            );
        }
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&players) {
            bail!("player count must be between {MIN_PLAYERS} and {MAX_PLAYERS}, got {players}");
        }
        Ok(Self {
            day,
            earliest,
            latest,
            players,
            tee: TeeFilter::default(),
            mode: BookMode::default(),
        })
    }

    pub fn with_tee(mut self, tee: TeeFilter) -> Self {
        self.tee = tee;
        self
    }

    pub fn with_mode(mut self, mode: BookMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn day(&self) -> Weekday {
        self.day
    }

    pub fn earliest(&self) -> NaiveTime {
        self.earliest
    }

    pub fn latest(&self) -> NaiveTime {
        self.latest
    }

    pub fn players(&self) -> u8 {
        self.players
    }

    pub fn tee(&self) -> TeeFilter {
        self.tee
    }

    pub fn mode(&self) -> BookMode {
        self.mode
    }

    pub fn is_eligible(&self, slot: &Slot) -> bool {
        slot.available
            && slot.day == self.day
            && (self.earliest..=self.latest).contains(&slot.time)
            && slot.capacity >= self.players
            && self.tee.accepts(slot.tee)
            && self.mode.accepts_occupancy(slot.booked)
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}, {} players, {}, mode {}",
            self.day,
            self.earliest.format("%H:%M"),
            self.latest.format("%H:%M"),
            self.players,
            self.tee,
            self.mode
        )
    }
}

/// Earliest eligible slot; among equal times the first one scraped wins.
pub fn select_slot<'a>(preference: &Preference, slots: &'a [Slot]) -> Option<&'a Slot> {
    slots
        .iter()
        .filter(|slot| preference.is_eligible(slot))
        .min_by_key(|slot| slot.time)
}
