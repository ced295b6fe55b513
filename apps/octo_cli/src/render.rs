//! Plain-text views of cards, accounts and health reports.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use client_core::{account::AccountSummary, api::HealthReport, location::safe_redirect, CardView};
use shared::domain::EntitySnapshot;

pub fn card(card: &CardView, now: DateTime<Utc>) -> String {
    let snapshot = &card.snapshot;
    let mut out = String::new();

    let _ = write!(
        out,
        "{}  [iteration {} of {}]",
        display_name(snapshot),
        card.iter,
        card.total_iterations
    );
    if card.pending {
        out.push_str("  (awaiting server)");
    }
    out.push('\n');

    let location = card.query.location;
    let _ = writeln!(
        out,
        "  at {},{} zone {} | age {}",
        location.x,
        location.y,
        location.zone,
        snapshot.age_label(now)
    );

    let owner = match (&snapshot.ownership, card.owned_by_viewer) {
        (_, true) => "you".to_string(),
        (Some(owner), false) => owner.split('-').next().unwrap_or_default().to_string(),
        (None, false) => "nobody".to_string(),
    };
    let _ = write!(
        out,
        "  owner {owner} | {}",
        if snapshot.minted { "minted" } else { "not minted" }
    );
    if card.mintable {
        out.push_str(" | mint available");
    }
    out.push('\n');

    if !snapshot.description.is_empty() {
        let _ = writeln!(out, "  {}", snapshot.description);
    }

    let palette: Vec<&str> = if card.banner.is_empty() {
        snapshot.aesthetics.channels().collect()
    } else {
        card.banner.iter().map(String::as_str).collect()
    };
    if !palette.is_empty() {
        let _ = writeln!(out, "  palette {}", palette.join(" "));
    }

    let _ = write!(
        out,
        "  ?{}  (back: {})",
        card.query.to_query_string(),
        safe_redirect(card.query.redirect.as_deref())
    );
    out
}

pub fn account(summary: &AccountSummary) -> String {
    let mut out = format!(
        "account {} (key {} days old, {}% of lifetime)",
        summary.short_id, summary.days_old, summary.age_percent
    );
    if summary.needs_renewal() {
        out.push_str("\n  key is nearing expiry; run `octo renew`");
    }
    out
}

pub fn health(report: &HealthReport) -> String {
    format!("{} is healthy, version {}", report.endpoint, report.version)
}

pub fn owned_row(snapshot: &EntitySnapshot, fallback_zone: u8) -> String {
    let position = snapshot.position(fallback_zone);
    format!(
        "{},{},{},{}  {}{}",
        position.x,
        position.y,
        position.zone,
        snapshot.iter,
        display_name(snapshot),
        if snapshot.minted { "  [minted]" } else { "" }
    )
}

fn display_name(snapshot: &EntitySnapshot) -> &str {
    if snapshot.name.is_empty() {
        "(unnamed)"
    } else {
        &snapshot.name
    }
}
