// fraudwall/src/analyzers/geographic.rs
//
// Impossible-travel, new-country and high-risk-country checks. The
// previous location comes from the per-user last-geo cache entry (which
// carries coordinates), falling back to the newest history transaction
// (country only). Distance uses the haversine formula, R = 6371 km.

use serde_json::json;
use std::collections::HashMap;

use crate::config::GeoConfig;
use crate::context::UserContext;
use crate::errors::Result;
use crate::events::{AnalysisMethod, LastGeo, RiskFactor, TransactionEvent};

const RAW_CAP:          f64 = 0.50;
const IMPOSSIBLE_SCORE: f64 = 0.35;
const NEW_COUNTRY:      f64 = 0.15;
const VPN_SIGNAL:       f64 = 0.10;
const EARTH_RADIUS_KM:  f64 = 6371.0;

/// External IP intelligence. The default implementation resolves nothing
/// and reports no VPN signal; a production deployment plugs a provider in.
pub trait GeoIntel: Send + Sync {
    fn country_of(&self, _ip: &str) -> Option<String> { None }
    fn is_vpn(&self, _ip: &str) -> Option<bool> { None }
}

pub struct NoopGeoIntel;
impl GeoIntel for NoopGeoIntel {}

/// Side outputs for the ML feature builder and the last-geo cache write.
#[derive(Debug, Clone, Default)]
pub struct GeoFindings {
    pub is_new_country:    bool,
    pub impossible_travel: bool,
    pub distance_km:       Option<f64>,
    // Country this analysis settled on, whether from the payload or from
    // the IP lookup. Feeds the next event's travel check.
    pub resolved_country:  Option<String>,
}

pub async fn analyze(
    event:    &TransactionEvent,
    ctx:      &UserContext,
    last_geo: Option<LastGeo>,
    intel:    &dyn GeoIntel,
    cfg:      &GeoConfig,
    weight:   f64,
) -> Result<(RiskFactor, GeoFindings)> {
    let geo = event.payload.geographic.as_ref();

    // Country from the payload, or resolved from the source IP.
    let country = geo.and_then(|g| g.country.clone())
        .or_else(|| geo.and_then(|g| g.ip.as_deref()).and_then(|ip| intel.country_of(ip)));

    let Some(country) = country else {
        // No location signal at all; nothing to score.
        let factor = RiskFactor::new(
            AnalysisMethod::Geographic, 0.0, weight,
            "No geographic data",
            HashMap::new(),
        );
        return Ok((factor, GeoFindings::default()));
    };

    let mut raw      = 0.0;
    let mut reasons  = Vec::new();
    let mut findings = GeoFindings {
        resolved_country: Some(country.clone()),
        ..GeoFindings::default()
    };

    // ── Impossible travel ─────────────────────────────────────────────────────
    let previous = last_geo.or_else(|| {
        ctx.history.most_recent().and_then(|tx| tx.country.clone().map(|c| LastGeo {
            country:   c,
            latitude:  None,
            longitude: None,
            timestamp: tx.timestamp,
        }))
    });

    if let Some(prev) = previous {
        let hours = (event.timestamp - prev.timestamp).num_milliseconds() as f64 / 3_600_000.0;

        if prev.country != country && hours >= 0.0 && hours < cfg.impossible_travel_hours {
            raw += IMPOSSIBLE_SCORE;
            findings.impossible_travel = true;
            reasons.push(format!(
                "country changed {} to {} within {:.1}h", prev.country, country, hours
            ));
        }

        // With coordinates on both sides, check the implied speed too.
        let coords = geo.and_then(|g| g.latitude.zip(g.longitude))
            .zip(prev.latitude.zip(prev.longitude));
        if let Some(((lat, lon), (plat, plon))) = coords {
            let dist = haversine_km(plat, plon, lat, lon);
            findings.distance_km = Some(dist);
            if hours > 0.0 {
                let speed = dist / hours;
                if speed > cfg.max_reasonable_speed_kmh && !findings.impossible_travel {
                    raw += IMPOSSIBLE_SCORE;
                    findings.impossible_travel = true;
                    reasons.push(format!("implied travel speed {:.0} km/h", speed));
                }
            }
        }
    }

    // ── New country ───────────────────────────────────────────────────────────
    if !ctx.known_countries.is_empty() && !ctx.known_countries.contains(&country) {
        raw += NEW_COUNTRY;
        findings.is_new_country = true;
        reasons.push(format!("first transfer from {}", country));
    }

    // ── High-risk country policy ──────────────────────────────────────────────
    if let Some(uplift) = cfg.risk_uplift(&country) {
        raw += uplift;
        reasons.push(format!("high-risk country {}", country));
    }

    // ── VPN / proxy indicator ─────────────────────────────────────────────────
    if let Some(ip) = geo.and_then(|g| g.ip.as_deref()) {
        if intel.is_vpn(ip) == Some(true) {
            raw += VPN_SIGNAL;
            reasons.push("VPN or proxy exit".into());
        }
    }

    let reason = if reasons.is_empty() {
        format!("Location {} consistent with history", country)
    } else {
        reasons.join("; ")
    };

    let details = [
        ("country".to_string(),          json!(country)),
        ("isNewCountry".to_string(),     json!(findings.is_new_country)),
        ("impossibleTravel".to_string(), json!(findings.impossible_travel)),
        ("distanceKm".to_string(),       json!(findings.distance_km)),
    ].into_iter().collect();

    let factor = RiskFactor::new(AnalysisMethod::Geographic, raw.min(RAW_CAP), weight, reason, details);
    Ok((factor, findings))
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Snapshot of the current event's location for the next analysis.
pub fn current_geo(event: &TransactionEvent, resolved_country: Option<&str>) -> Option<LastGeo> {
    let geo = event.payload.geographic.as_ref()?;
    let country = geo.country.clone().or_else(|| resolved_country.map(str::to_string))?;
    Some(LastGeo {
        country,
        latitude:  geo.latitude,
        longitude: geo.longitude,
        timestamp: event.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeoConfig;
    use crate::context::UserContext;
    use chrono::{Duration, Utc};

    fn event(country: Option<&str>, lat: Option<f64>, lon: Option<f64>) -> TransactionEvent {
        let json = format!(
            r#"{{
                "eventType": "TransactionCreated",
                "eventId": "evt-1",
                "timestamp": "{}",
                "payload": {{
                    "transactionId": "6f2c1a34-9d1e-4f6a-8f2e-0b8d5c1a2b3c",
                    "userId": "u1", "sourceAccountId": "s", "destinationAccountId": "d",
                    "recipientId": "r", "amount": 100.0, "currency": "USD",
                    "geographic": {{ "ip": "203.0.113.9", "country": {}, "latitude": {}, "longitude": {} }}
                }}
            }}"#,
            Utc::now().to_rfc3339(),
            country.map(|c| format!("\"{}\"", c)).unwrap_or("null".into()),
            lat.map(|v| v.to_string()).unwrap_or("null".into()),
            lon.map(|v| v.to_string()).unwrap_or("null".into()),
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn haversine_known_distance() {
        // New York to Tokyo, roughly 10,850 km.
        let d = haversine_km(40.7128, -74.0060, 35.6762, 139.6503);
        assert!((d - 10_850.0).abs() < 100.0, "d = {}", d);
    }

    #[tokio::test]
    async fn impossible_travel_by_country_change() {
        let ev  = event(Some("JP"), None, None);
        let ctx = UserContext::empty();
        let prev = LastGeo {
            country:   "US".into(),
            latitude:  None,
            longitude: None,
            timestamp: Utc::now() - Duration::minutes(30),
        };
        let (factor, findings) =
            analyze(&ev, &ctx, Some(prev), &NoopGeoIntel, &GeoConfig::default(), 0.20)
                .await.unwrap();
        assert!(findings.impossible_travel);
        assert!((factor.raw_score - IMPOSSIBLE_SCORE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn speed_check_fires_once_with_country_change() {
        // US east coast to Tokyo in 30 minutes, same-country flag already
        // fired; the speed rule must not double-count.
        let ev  = event(Some("JP"), Some(35.6762), Some(139.6503));
        let ctx = UserContext::empty();
        let prev = LastGeo {
            country:   "US".into(),
            latitude:  Some(40.7128),
            longitude: Some(-74.0060),
            timestamp: Utc::now() - Duration::minutes(30),
        };
        let (factor, findings) =
            analyze(&ev, &ctx, Some(prev), &NoopGeoIntel, &GeoConfig::default(), 0.20)
                .await.unwrap();
        assert!(findings.impossible_travel);
        assert!(findings.distance_km.unwrap() > 10_000.0);
        assert!((factor.raw_score - IMPOSSIBLE_SCORE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn new_country_needs_known_set() {
        let ev = event(Some("DE"), None, None);
        // Empty known set: rule must stay quiet.
        let (factor, findings) =
            analyze(&ev, &UserContext::empty(), None, &NoopGeoIntel, &GeoConfig::default(), 0.20)
                .await.unwrap();
        assert!(!findings.is_new_country);
        assert_eq!(factor.raw_score, 0.0);

        let mut ctx = UserContext::empty();
        ctx.known_countries.insert("US".into());
        let (factor, findings) =
            analyze(&ev, &ctx, None, &NoopGeoIntel, &GeoConfig::default(), 0.20)
                .await.unwrap();
        assert!(findings.is_new_country);
        assert!((factor.raw_score - NEW_COUNTRY).abs() < 1e-9);
    }

    #[tokio::test]
    async fn high_risk_country_uplift() {
        let ev = event(Some("NG"), None, None);
        let (factor, _) =
            analyze(&ev, &UserContext::empty(), None, &NoopGeoIntel, &GeoConfig::default(), 0.20)
                .await.unwrap();
        assert!((factor.raw_score - 0.12).abs() < 1e-9);
    }

    struct StaticIntel;
    impl GeoIntel for StaticIntel {
        fn country_of(&self, _ip: &str) -> Option<String> { Some("BR".into()) }
    }

    #[tokio::test]
    async fn ip_resolution_feeds_findings_and_geo_snapshot() {
        // Payload carries no country; the IP lookup supplies it, and the
        // snapshot for the next travel check must carry it too.
        let ev = event(None, None, None);
        let (_, findings) =
            analyze(&ev, &UserContext::empty(), None, &StaticIntel, &GeoConfig::default(), 0.20)
                .await.unwrap();
        assert_eq!(findings.resolved_country.as_deref(), Some("BR"));

        let snapshot = current_geo(&ev, findings.resolved_country.as_deref()).unwrap();
        assert_eq!(snapshot.country, "BR");
        assert_eq!(snapshot.timestamp, ev.timestamp);
    }

    #[tokio::test]
    async fn missing_geo_scores_zero() {
        let ev = event(None, None, None);
        let (factor, findings) =
            analyze(&ev, &UserContext::empty(), None, &NoopGeoIntel, &GeoConfig::default(), 0.20)
                .await.unwrap();
        assert_eq!(factor.raw_score, 0.0);
        assert!(!findings.impossible_travel);
    }
}
