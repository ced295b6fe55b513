//! The `xyzi=x,y,z,iter` / `redirect=` page parameters.

use shared::{
    domain::{Position, ZONE_COUNT},
    protocol::EntityRequest,
};
use url::form_urlencoded;

pub const DEFAULT_REDIRECT: &str = "area.html";
pub const FALLBACK_REDIRECT: &str = "./index.html";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    pub x: u32,
    pub y: u32,
    pub zone: u8,
    pub iter: u32,
}

impl EntityLocation {
    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
            zone: self.zone,
        }
    }

    pub fn request(&self) -> EntityRequest {
        EntityRequest::new(self.position(), self.iter)
    }

    pub fn at_iteration(position: Position, iter: u32) -> Self {
        Self {
            x: position.x,
            y: position.y,
            zone: position.zone,
            iter,
        }
    }

    pub fn to_xyzi(&self) -> String {
        format!("{},{},{},{}", self.x, self.y, self.zone, self.iter)
    }
}

/// Parses `x,y,z,iter`. Missing, negative or unparsable parts become 0,
/// fractions are floored and the zone is clamped to the valid range.
pub fn parse_xyzi(raw: &str) -> EntityLocation {
    let mut parts = raw.split(',');
    let mut next = || non_negative(parts.next().unwrap_or_default());
    let x = next();
    let y = next();
    let zone = next().min(u32::from(ZONE_COUNT - 1)) as u8;
    let iter = next();
    EntityLocation { x, y, zone, iter }
}

fn non_negative(raw: &str) -> u32 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => {
            value.floor().min(f64::from(u32::MAX)) as u32
        }
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub location: EntityLocation,
    pub redirect: Option<String>,
}

impl PageQuery {
    pub fn new(location: EntityLocation, redirect: Option<String>) -> Self {
        Self { location, redirect }
    }

    /// Reads a query string such as `xyzi=1,2,3,0&redirect=area.html`.
    /// An absent `xyzi` means `0,0,0,0`.
    pub fn parse(query: &str) -> Self {
        let mut location = None;
        let mut redirect = None;
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "xyzi" if location.is_none() => location = Some(parse_xyzi(&value)),
                "redirect" if redirect.is_none() => redirect = Some(value.into_owned()),
                _ => {}
            }
        }
        Self {
            location: location.unwrap_or_default(),
            redirect,
        }
    }

    pub fn redirect_or_default(&self) -> &str {
        self.redirect.as_deref().unwrap_or(DEFAULT_REDIRECT)
    }

    /// Normalized form written back to the address bar.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("xyzi", &self.location.to_xyzi())
            .append_pair("redirect", self.redirect_or_default())
            .finish()
    }
}

/// Only same-site absolute paths are followed; anything else, including
/// protocol-relative `//host` targets, goes to the index page.
pub fn safe_redirect(target: Option<&str>) -> &str {
    match target {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => FALLBACK_REDIRECT,
    }
}
