mod runner;
mod site;


use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use serde_json::json;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::slot::{Slot, select_slot};

use self::runner::{BookingOutcome, list_slots, run_booking};
use self::site::ChromeDriver;

pub fn run(cli: Cli) -> Result<()> {
    let today = Local::now().date_naive();
    let config = Config::load(cli.config.as_deref(), today)?;

    match cli.command {
        Some(Command::Check) => run_check(&config),
        Some(Command::Slots { json }) => run_slots(&config, json)?,
        Some(Command::Book) | None => run_book(&config, today)?,
    }

    Ok(())
}

fn run_check(config: &Config) {
    println!("Configuration OK");
    println!("  Target:      {}", config.booking_date.format("%A %d %B %Y"));
    println!("  Day:         {}", config.preference.day());
    println!("  Preference:  {}", config.preference);
    println!("  Member:      {}", config.credentials.username);
    println!("  Headless:    {}", config.headless);
    println!("  Screenshots: {}", config.screenshot_dir.display());
}

fn run_book(config: &Config, today: chrono::NaiveDate) -> Result<()> {
    info!("{}", "=".repeat(50));
    info!("Target:  {}", config.booking_date.format("%A %d %B %Y"));
    info!(
        "Mode:    {}  |  Tee: {}",
        config.preference.mode().button_label(),
        config.preference.tee()
    );
    info!(
        "Window:  {}-{}  |  Players: {}",
        config.preference.earliest().format("%H:%M"),
        config.preference.latest().format("%H:%M"),
        config.preference.players()
    );
    info!("{}", "=".repeat(50));

    let mut driver = open_driver(config)?;
    let report = run_booking(&mut driver, config, today)?;

    match report.outcome {
        BookingOutcome::Booked(slot) => info!("Tee time booked: {slot}"),
        BookingOutcome::NoMatch => warn!(
            "No booking made: none of {} rows matched. Check the screenshot for details.",
            report.slots_seen
        ),
    }
    if report.screenshot.is_none() {
        warn!("no screenshot was saved for this run");
    }
    Ok(())
}

fn run_slots(config: &Config, as_json: bool) -> Result<()> {
    let mut driver = open_driver(config)?;
    let slots = list_slots(&mut driver, config)?;
    let chosen = select_slot(&config.preference, &slots);

    if as_json {
        let rows: Vec<_> = slots
            .iter()
            .map(|slot| slot_json(slot, config, chosen))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if slots.is_empty() {
        println!("No bookable rows on {}.", config.booking_date);
        return Ok(());
    }
    println!("{:<3} {:<6} {:<9} {:<6} {:<9}", "", "TIME", "TEE", "FREE", "STATUS");
    for slot in &slots {
        let marker = if chosen == Some(slot) {
            "=>"
        } else if config.preference.is_eligible(slot) {
            "*"
        } else {
            ""
        };
        println!(
            "{:<3} {:<6} {:<9} {:<6} {:<9}",
            marker,
            slot.time.format("%H:%M"),
            slot.tee.to_string(),
            format!("{}/{}", slot.free_places(), slot.capacity),
            if slot.available { "open" } else { "closed" }
        );
    }
    Ok(())
}

fn slot_json(slot: &Slot, config: &Config, chosen: Option<&Slot>) -> serde_json::Value {
    json!({
        "day": slot.day.to_string(),
        "time": slot.time.format("%H:%M").to_string(),
        "tee": slot.tee.to_string(),
        "capacity": slot.capacity,
        "booked": slot.booked,
        "available": slot.available,
        "eligible": config.preference.is_eligible(slot),
        "chosen": chosen == Some(slot),
    })
}

fn open_driver(config: &Config) -> Result<ChromeDriver> {
    ChromeDriver::launch(&config.site, config.headless, config.preference.mode())
        .context("failed to start the browser")
}
