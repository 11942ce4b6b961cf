//! Minimal REST client helpers for consumers (front ends, scripts, tests).

use super::endpoints as ep;
use super::*;
use crate::domain::{Activity, Family, Participant, Tier};
use crate::report::{DateRange, ParticipantStanding};
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    /// Server-side error kind (`bad_request`, `conflict`, ...) when the body carried one.
    pub fn kind(&self) -> Option<String> {
        match self {
            RestError::Status { body, .. } => serde_json::from_str::<ErrorDto>(body)
                .ok()
                .map(|e| e.kind),
            _ => None,
        }
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
});

fn mk_client() -> reqwest::Client {
    HTTP_CLIENT.clone()
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn handle_empty(res: reqwest::Response) -> Result<(), RestError> {
    if res.status().is_success() {
        Ok(())
    } else {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Err(RestError::Status { status, body })
    }
}

async fn get_json<T: for<'de> serde::Deserialize<'de>>(url: String) -> Result<T, RestError> {
    let res = mk_client()
        .get(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn post_json<B, T>(url: String, body: &B) -> Result<T, RestError>
where
    B: serde::Serialize + ?Sized,
    T: for<'de> serde::Deserialize<'de>,
{
    let res = mk_client()
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn delete(url: String) -> Result<(), RestError> {
    let res = mk_client()
        .delete(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_empty(res).await
}

pub async fn server_version(base: &str) -> Result<VersionInfoDto, RestError> {
    get_json(ep::version(base)).await
}

pub async fn dashboard(base: &str) -> Result<DashboardDto, RestError> {
    get_json(ep::dashboard(base)).await
}

pub async fn list_families(base: &str) -> Result<Vec<Family>, RestError> {
    get_json(ep::families(base)).await
}

pub async fn create_family(base: &str, req: &CreateFamilyReq) -> Result<Family, RestError> {
    post_json(ep::families(base), req).await
}

pub async fn family_detail(base: &str, family_id: &str) -> Result<FamilyDetailDto, RestError> {
    get_json(ep::family(base, family_id)).await
}

pub async fn delete_family(base: &str, family_id: &str) -> Result<(), RestError> {
    delete(ep::family(base, family_id)).await
}

pub async fn list_participants(
    base: &str,
    family_id: &str,
) -> Result<Vec<Participant>, RestError> {
    get_json(ep::family_participants(base, family_id)).await
}

pub async fn create_participant(
    base: &str,
    family_id: &str,
    req: &CreateParticipantReq,
) -> Result<Participant, RestError> {
    post_json(ep::family_participants(base, family_id), req).await
}

pub async fn participant_standing(
    base: &str,
    participant_id: &str,
) -> Result<ParticipantStanding, RestError> {
    get_json(ep::participant(base, participant_id)).await
}

pub async fn delete_participant(base: &str, participant_id: &str) -> Result<(), RestError> {
    delete(ep::participant(base, participant_id)).await
}

pub async fn record_participation(
    base: &str,
    participant_id: &str,
    req: &RecordParticipationReq,
) -> Result<RecordParticipationResp, RestError> {
    post_json(ep::participant_records(base, participant_id), req).await
}

pub async fn list_records(
    base: &str,
    participant_id: &str,
    page: usize,
    per_page: usize,
) -> Result<Vec<RecordHistoryItemDto>, RestError> {
    let url = format!(
        "{}?page={}&per_page={}",
        ep::participant_records(base, participant_id),
        page,
        per_page
    );
    get_json(url).await
}

pub async fn list_activities(base: &str) -> Result<Vec<Activity>, RestError> {
    get_json(ep::activities(base)).await
}

pub async fn create_activity(base: &str, req: &CreateActivityReq) -> Result<Activity, RestError> {
    post_json(ep::activities(base), req).await
}

pub async fn delete_activity(base: &str, activity_id: &str) -> Result<(), RestError> {
    delete(ep::activity(base, activity_id)).await
}

pub async fn list_tiers(base: &str) -> Result<Vec<Tier>, RestError> {
    get_json(ep::tiers(base)).await
}

pub async fn create_tier(base: &str, req: &CreateTierReq) -> Result<Tier, RestError> {
    post_json(ep::tiers(base), req).await
}

pub async fn delete_tier(base: &str, tier_id: &str) -> Result<(), RestError> {
    delete(ep::tier(base, tier_id)).await
}

pub async fn report(base: &str, range: &DateRange) -> Result<ReportDto, RestError> {
    get_json(ep::reports(base, range)).await
}
