use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use familypoints_shared::api::{self, FamilyDetailDto, RecordHistoryItemDto};
use familypoints_shared::domain::{
    self, ActivityId, FamilyId, ParticipantId, RecordId, TierId, now_utc, today_utc,
};
use familypoints_shared::report::{self, DateRange, ParticipantStanding};
use familypoints_shared::{
    TierMode, resolve_tier, validate_activity, validate_family, validate_participant,
    validate_participation_record, validate_tier,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{AppError, AppState};

const DASHBOARD_TOP: usize = 5;
const DASHBOARD_RECENT: usize = 10;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn history_items(
    rows: Vec<(domain::ParticipationRecord, Option<String>)>,
) -> Vec<RecordHistoryItemDto> {
    rows.into_iter()
        .map(|(record, activity_name)| RecordHistoryItemDto {
            record,
            activity_name,
        })
        .collect()
}

fn deleted_or_404(deleted: bool, what: &str, id: &str) -> Result<StatusCode, AppError> {
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("{what} {id} not found")))
    }
}

pub(super) async fn api_version() -> Json<api::VersionInfoDto> {
    Json(api::VersionInfoDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub(super) async fn api_dashboard(
    State(state): State<AppState>,
) -> Result<Json<api::DashboardDto>, AppError> {
    let counts = state.store.counts().await?;
    let participants = state.store.list_participants().await?;
    let records = state.store.list_records_in_range(DateRange::default()).await?;
    let tiers = state.store.list_tiers().await?;
    let mut top =
        report::participant_standings(&participants, &records, &tiers, state.config.tier_mode)?;
    top.truncate(DASHBOARD_TOP);
    let recent = state.store.recent_records(DASHBOARD_RECENT).await?;
    Ok(Json(api::DashboardDto {
        family_count: counts.families as usize,
        participant_count: counts.participants as usize,
        activity_count: counts.activities as usize,
        record_count: counts.records as usize,
        top_participants: top,
        recent_records: history_items(recent),
    }))
}

// Families

pub(super) async fn api_list_families(
    State(state): State<AppState>,
) -> Result<Json<Vec<domain::Family>>, AppError> {
    Ok(Json(state.store.list_families().await?))
}

pub(super) async fn api_create_family(
    State(state): State<AppState>,
    Json(body): Json<api::CreateFamilyReq>,
) -> Result<(StatusCode, Json<domain::Family>), AppError> {
    let family = domain::Family {
        id: FamilyId::from(new_id()),
        name: body.name.trim().to_string(),
        contact_email: body.contact_email.trim().to_string(),
        created_at: now_utc(),
    };
    validate_family(&family)?;
    state.store.insert_family(&family).await?;
    info!(family_id = %family.id, "family created");
    Ok((StatusCode::CREATED, Json(family)))
}

pub(super) async fn api_get_family(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FamilyDetailDto>, AppError> {
    let family = state
        .store
        .get_family(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("family {id} not found")))?;
    let mut participants = Vec::new();
    for p in state.store.list_participants_for_family(&id).await? {
        participants.push(state.standing(p).await?);
    }
    Ok(Json(FamilyDetailDto {
        family,
        participants,
    }))
}

pub(super) async fn api_delete_family(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_family(&id).await?;
    if deleted {
        info!(family_id = %id, "family deleted");
    }
    deleted_or_404(deleted, "family", &id)
}

// Participants

pub(super) async fn api_list_family_participants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<domain::Participant>>, AppError> {
    if state.store.get_family(&id).await?.is_none() {
        return Err(AppError::not_found(format!("family {id} not found")));
    }
    Ok(Json(state.store.list_participants_for_family(&id).await?))
}

pub(super) async fn api_create_participant(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Json(body): Json<api::CreateParticipantReq>,
) -> Result<(StatusCode, Json<domain::Participant>), AppError> {
    let known_families = state.store.family_ids().await?;
    let family_id = FamilyId::from(family_id);
    // Unknown family in the path is a missing resource, not a bad body
    if !known_families.contains(&family_id) {
        return Err(AppError::not_found(format!("family {family_id} not found")));
    }
    let participant = domain::Participant {
        id: ParticipantId::from(new_id()),
        family_id,
        first_name: body.first_name.trim().to_string(),
        last_name: body.last_name.trim().to_string(),
        birth_date: body.birth_date,
        created_at: now_utc(),
    };
    validate_participant(&participant, &known_families)?;
    // A new participant starts at zero points
    let tiers = state.store.list_tiers().await?;
    resolve_tier(0, &tiers, state.config.tier_mode)?;
    state.store.insert_participant(&participant).await?;
    info!(
        participant_id = %participant.id,
        family_id = %participant.family_id,
        "participant created"
    );
    Ok((StatusCode::CREATED, Json(participant)))
}

pub(super) async fn api_get_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParticipantStanding>, AppError> {
    let participant = state
        .store
        .get_participant(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("participant {id} not found")))?;
    Ok(Json(state.standing(participant).await?))
}

pub(super) async fn api_delete_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_participant(&id).await?;
    if deleted {
        state.forget_participant(&ParticipantId::from(id.as_str())).await;
        info!(participant_id = %id, "participant deleted");
    }
    deleted_or_404(deleted, "participant", &id)
}

// Participation records

#[derive(Deserialize)]
pub(super) struct PageOpts {
    page: Option<usize>,
    per_page: Option<usize>,
}

pub(super) async fn api_list_records(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(opts): Query<PageOpts>,
) -> Result<Json<Vec<RecordHistoryItemDto>>, AppError> {
    if state.store.get_participant(&id).await?.is_none() {
        return Err(AppError::not_found(format!("participant {id} not found")));
    }
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(10);
    let rows = state.store.list_records_page(&id, page, per_page).await?;
    Ok(Json(history_items(rows)))
}

pub(super) async fn api_record_participation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<api::RecordParticipationReq>,
) -> Result<(StatusCode, Json<api::RecordParticipationResp>), AppError> {
    let participant = state
        .store
        .get_participant(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("participant {id} not found")))?;

    // Serialize writers per participant
    let participant_mutex = state.participant_mutex(&participant.id).await;
    let mut guard = participant_mutex.lock().await;

    let activity_id = ActivityId::from(body.activity_id.trim());
    let activity = state.store.get_activity(activity_id.as_str()).await?;
    let known_participants = state.store.participant_ids().await?;
    let known_activities = state.store.activity_ids().await?;
    let record = domain::ParticipationRecord {
        id: RecordId::from(new_id()),
        participant_id: participant.id.clone(),
        activity_id,
        date: body.date.unwrap_or_else(today_utc),
        points: body
            .points
            .or(activity.as_ref().map(|a| a.points))
            .unwrap_or_default(),
        created_at: now_utc(),
    };
    validate_participation_record(&record, &known_participants, &known_activities)?;

    // Strict mode refuses a record that would land the total in a tier gap
    let current = state.total_points(&participant.id, &mut guard).await?;
    let tiers = state.store.list_tiers().await?;
    resolve_tier(
        current + i64::from(record.points),
        &tiers,
        state.config.tier_mode,
    )?;

    state.reset_total(&mut guard);
    state.store.insert_record(&record).await?;
    info!(
        record_id = %record.id,
        participant_id = %record.participant_id,
        activity_id = %record.activity_id,
        points = record.points,
        "participation recorded"
    );

    let standing = state.standing_locked(participant, &mut guard).await?;
    Ok((
        StatusCode::CREATED,
        Json(api::RecordParticipationResp { record, standing }),
    ))
}

// Activities

pub(super) async fn api_list_activities(
    State(state): State<AppState>,
) -> Result<Json<Vec<domain::Activity>>, AppError> {
    Ok(Json(state.store.list_activities().await?))
}

pub(super) async fn api_create_activity(
    State(state): State<AppState>,
    Json(body): Json<api::CreateActivityReq>,
) -> Result<(StatusCode, Json<domain::Activity>), AppError> {
    let activity = domain::Activity {
        id: ActivityId::from(body.id.unwrap_or_else(new_id)),
        name: body.name.trim().to_string(),
        description: body.description.filter(|d| !d.trim().is_empty()),
        points: body.points,
        created_at: now_utc(),
    };
    validate_activity(&activity)?;
    if state.store.get_activity(activity.id.as_str()).await?.is_some() {
        return Err(AppError::conflict(format!(
            "activity {} already exists",
            activity.id
        )));
    }
    state.store.insert_activity(&activity).await?;
    info!(activity_id = %activity.id, points = activity.points, "activity created");
    Ok((StatusCode::CREATED, Json(activity)))
}

pub(super) async fn api_delete_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_activity(&id).await?;
    if deleted {
        info!(activity_id = %id, "activity deleted");
    }
    deleted_or_404(deleted, "activity", &id)
}

// Tiers

pub(super) async fn api_list_tiers(
    State(state): State<AppState>,
) -> Result<Json<Vec<domain::Tier>>, AppError> {
    Ok(Json(state.store.list_tiers().await?))
}

pub(super) async fn api_create_tier(
    State(state): State<AppState>,
    Json(body): Json<api::CreateTierReq>,
) -> Result<(StatusCode, Json<domain::Tier>), AppError> {
    let tier = domain::Tier {
        id: TierId::from(body.id.unwrap_or_else(new_id)),
        name: body.name.trim().to_string(),
        min_points: body.min_points,
        max_points: body.max_points,
        created_at: now_utc(),
    };
    validate_tier(&tier)?;
    state.store.insert_tier(&tier).await?;
    info!(
        tier_id = %tier.id,
        min_points = tier.min_points,
        max_points = tier.max_points,
        "tier created"
    );
    Ok((StatusCode::CREATED, Json(tier)))
}

pub(super) async fn api_delete_tier(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_tier(&id, state.config.tier_mode).await?;
    if deleted {
        info!(tier_id = %id, "tier deleted");
    }
    deleted_or_404(deleted, "tier", &id)
}

// Reports

pub(super) async fn api_report(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> Result<Json<api::ReportDto>, AppError> {
    if let (Some(from), Some(to)) = (range.from, range.to)
        && from > to
    {
        return Err(AppError::bad_request(format!(
            "range start {from} is after its end {to}"
        )));
    }
    let families = state.store.list_families().await?;
    let participants = state.store.list_participants().await?;
    let activities = state.store.list_activities().await?;
    let tiers = state.store.list_tiers().await?;
    let records = state.store.list_records_in_range(range).await?;

    // Totals inside a window are partial; an uncovered one is unranked, not an error
    let mode = if range == DateRange::default() {
        state.config.tier_mode
    } else {
        TierMode::Lenient
    };
    let standings = report::participant_standings(&participants, &records, &tiers, mode)?;
    Ok(Json(api::ReportDto {
        range,
        standings,
        families: report::family_totals(&families, &participants, &records),
        activities: report::activity_totals(&activities, &records),
    }))
}
