use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;
use crate::report::DateRange;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn v1(base: &str, path: &str) -> String {
    base_join(base, &format!("{}/{}", API_V1_PREFIX, path))
}

pub fn health(base: &str) -> String {
    base_join(base, "/healthz")
}
pub fn version(base: &str) -> String {
    v1(base, "version")
}
pub fn dashboard(base: &str) -> String {
    v1(base, "dashboard")
}
pub fn families(base: &str) -> String {
    v1(base, "families")
}
pub fn family(base: &str, family_id: &str) -> String {
    v1(base, &format!("families/{}", enc(family_id)))
}
pub fn family_participants(base: &str, family_id: &str) -> String {
    v1(base, &format!("families/{}/participants", enc(family_id)))
}
pub fn participant(base: &str, participant_id: &str) -> String {
    v1(base, &format!("participants/{}", enc(participant_id)))
}
pub fn participant_records(base: &str, participant_id: &str) -> String {
    v1(base, &format!("participants/{}/records", enc(participant_id)))
}
pub fn activities(base: &str) -> String {
    v1(base, "activities")
}
pub fn activity(base: &str, activity_id: &str) -> String {
    v1(base, &format!("activities/{}", enc(activity_id)))
}
pub fn tiers(base: &str) -> String {
    v1(base, "tiers")
}
pub fn tier(base: &str, tier_id: &str) -> String {
    v1(base, &format!("tiers/{}", enc(tier_id)))
}

/// Report URL with the date window as `from`/`to` query parameters.
pub fn reports(base: &str, range: &DateRange) -> String {
    let mut url = v1(base, "reports");
    let mut sep = '?';
    for (key, value) in [("from", range.from), ("to", range.to)] {
        if let Some(d) = value {
            url.push(sep);
            url.push_str(&format!(
                "{}={:04}-{:02}-{:02}",
                key,
                d.year(),
                u8::from(d.month()),
                d.day()
            ));
            sep = '&';
        }
    }
    url
}
