//! Optional IP geolocation for the operator's visit list.

use serde::Serialize;
use std::net::IpAddr;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoInfo {
    pub country_iso: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
    pub asn: u32,
    pub as_org: String,
}

/// Annotates visits only; never consulted for authorization.
pub trait GeoLocator: Send + Sync {
    fn locate(&self, ip: IpAddr) -> Option<GeoInfo>;
}

/// Used when no geolocation database is configured.
pub struct DisabledGeoLocator;

impl GeoLocator for DisabledGeoLocator {
    fn locate(&self, _ip: IpAddr) -> Option<GeoInfo> {
        None
    }
}

/// Parses a logged address and looks it up. Unparseable addresses yield `None`.
pub fn locate_str(locator: &dyn GeoLocator, ip: &str) -> Option<GeoInfo> {
    let ip: IpAddr = ip.trim().parse().ok()?;
    locator.locate(ip)
}
