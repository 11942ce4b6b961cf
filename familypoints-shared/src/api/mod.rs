use serde::{Deserialize, Serialize};
use time::Date;

use crate::domain::{Family, ParticipationRecord, iso_date};
use crate::report::{ActivityTotal, DateRange, FamilyTotal, ParticipantStanding};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

// Families
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFamilyReq {
    pub name: String,
    pub contact_email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FamilyDetailDto {
    pub family: Family,
    pub participants: Vec<ParticipantStanding>,
}

// Participants
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateParticipantReq {
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "iso_date")]
    pub birth_date: Date,
}

// Activities
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateActivityReq {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i32,
}

// Tiers
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTierReq {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub min_points: i32,
    pub max_points: i32,
}

// Participation
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordParticipationReq {
    pub activity_id: String,
    /// Defaults to today (UTC).
    #[serde(default, with = "iso_date::option")]
    pub date: Option<Date>,
    /// Defaults to the activity's point weight.
    #[serde(default)]
    pub points: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordParticipationResp {
    pub record: ParticipationRecord,
    pub standing: ParticipantStanding,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordHistoryItemDto {
    #[serde(flatten)]
    pub record: ParticipationRecord,
    pub activity_name: Option<String>,
}

// Dashboard / reports
#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardDto {
    pub family_count: usize,
    pub participant_count: usize,
    pub activity_count: usize,
    pub record_count: usize,
    pub top_participants: Vec<ParticipantStanding>,
    pub recent_records: Vec<RecordHistoryItemDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportDto {
    pub range: DateRange,
    pub standings: Vec<ParticipantStanding>,
    pub families: Vec<FamilyTotal>,
    pub activities: Vec<ActivityTotal>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VersionInfoDto {
    pub version: String,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDto {
    pub error: String,
    pub kind: String,
}
