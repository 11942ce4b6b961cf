pub mod models;
pub mod schema;

use std::collections::{BTreeMap, HashSet};

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use familypoints_shared::domain::{self, ActivityId, FamilyId, ParticipantId};
use familypoints_shared::report::DateRange;
use familypoints_shared::{TierMode, ValidationError, resolve_tier, validate_tier_partition};
use models::{
    NewActivity, NewFamily, NewParticipant, NewParticipationRecord, NewTier, convert_all,
    format_date, to_naive,
};
use schema::{activities, families, participants, participation_records, tiers};
use tracing::{debug, trace};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A write would break a cross-row invariant (e.g. overlapping tiers).
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Delete refused because other rows still reference the target.
    #[error("{0}")]
    InUse(String),

    /// A stored value could not be mapped back to the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Row counts shown on the dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityCounts {
    pub families: i64,
    pub participants: i64,
    pub activities: i64,
    pub records: i64,
}

type RecordWithActivity = (domain::ParticipationRecord, Option<String>);

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Runs `f` on a pooled connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    /// Upserts catalog activities and tiers, then re-checks the tier partition
    /// over everything stored. Nothing is written if the check fails.
    pub async fn seed_from_config(
        &self,
        cfg_activities: &[domain::Activity],
        cfg_tiers: &[domain::Tier],
        mode: TierMode,
    ) -> Result<(), StorageError> {
        let activities_owned = cfg_activities.to_owned();
        let tiers_owned = cfg_tiers.to_owned();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                for a in &activities_owned {
                    let row = NewActivity {
                        id: a.id.as_str(),
                        name: &a.name,
                        description: a.description.as_deref(),
                        points: a.points,
                        created_at: to_naive(a.created_at)?,
                    };
                    diesel::insert_into(activities::table)
                        .values(&row)
                        .on_conflict(activities::id)
                        .do_update()
                        .set((
                            activities::name.eq(row.name),
                            activities::description.eq(row.description),
                            activities::points.eq(row.points),
                        ))
                        .execute(conn)?;
                }

                for t in &tiers_owned {
                    let row = NewTier {
                        id: t.id.as_str(),
                        name: &t.name,
                        min_points: t.min_points,
                        max_points: t.max_points,
                        created_at: to_naive(t.created_at)?,
                    };
                    diesel::insert_into(tiers::table)
                        .values(&row)
                        .on_conflict(tiers::id)
                        .do_update()
                        .set((
                            tiers::name.eq(row.name),
                            tiers::min_points.eq(row.min_points),
                            tiers::max_points.eq(row.max_points),
                        ))
                        .execute(conn)?;
                }

                let stored: Vec<domain::Tier> = convert_all(
                    tiers::table
                        .select(models::Tier::as_select())
                        .load::<models::Tier>(conn)?,
                )?;
                validate_tier_partition(&stored)?;
                check_totals_covered(conn, &stored, mode)
            })
        })
        .await?;
        debug!(
            activities = cfg_activities.len(),
            tiers = cfg_tiers.len(),
            "seeded catalog from config"
        );
        Ok(())
    }

    pub async fn counts(&self) -> Result<EntityCounts, StorageError> {
        self.with_conn(|conn| {
            Ok(EntityCounts {
                families: families::table.count().get_result(conn)?,
                participants: participants::table.count().get_result(conn)?,
                activities: activities::table.count().get_result(conn)?,
                records: participation_records::table.count().get_result(conn)?,
            })
        })
        .await
    }

    // Families

    pub async fn insert_family(&self, family: &domain::Family) -> Result<(), StorageError> {
        let f = family.clone();
        trace!(family_id = %f.id, "insert_family");
        self.with_conn(move |conn| {
            let row = NewFamily {
                id: f.id.as_str(),
                name: &f.name,
                contact_email: &f.contact_email,
                created_at: to_naive(f.created_at)?,
            };
            diesel::insert_into(families::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn list_families(&self) -> Result<Vec<domain::Family>, StorageError> {
        self.with_conn(|conn| {
            convert_all(
                families::table
                    .order(families::name.asc())
                    .select(models::Family::as_select())
                    .load::<models::Family>(conn)?,
            )
        })
        .await
    }

    pub async fn get_family(&self, id: &str) -> Result<Option<domain::Family>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            families::table
                .filter(families::id.eq(&id))
                .select(models::Family::as_select())
                .first::<models::Family>(conn)
                .optional()?
                .map(domain::Family::try_from)
                .transpose()
        })
        .await
    }

    pub async fn family_ids(&self) -> Result<HashSet<FamilyId>, StorageError> {
        self.with_conn(|conn| {
            let ids: Vec<String> = families::table.select(families::id).load(conn)?;
            Ok(ids.into_iter().map(FamilyId::from).collect())
        })
        .await
    }

    /// Refuses with [`StorageError::InUse`] while participants belong to the family.
    pub async fn delete_family(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let members: i64 = participants::table
                    .filter(participants::family_id.eq(&id))
                    .count()
                    .get_result(conn)?;
                if members > 0 {
                    return Err(StorageError::InUse(format!(
                        "family {id} still has {members} participant(s)"
                    )));
                }
                let deleted =
                    diesel::delete(families::table.filter(families::id.eq(&id))).execute(conn)?;
                Ok(deleted > 0)
            })
        })
        .await
    }

    // Participants

    pub async fn insert_participant(
        &self,
        participant: &domain::Participant,
    ) -> Result<(), StorageError> {
        let p = participant.clone();
        trace!(participant_id = %p.id, family_id = %p.family_id, "insert_participant");
        self.with_conn(move |conn| {
            let row = NewParticipant {
                id: p.id.as_str(),
                family_id: p.family_id.as_str(),
                first_name: &p.first_name,
                last_name: &p.last_name,
                birth_date: format_date(p.birth_date)?,
                created_at: to_naive(p.created_at)?,
            };
            diesel::insert_into(participants::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn list_participants(&self) -> Result<Vec<domain::Participant>, StorageError> {
        self.with_conn(|conn| {
            convert_all(
                participants::table
                    .order((participants::last_name.asc(), participants::first_name.asc()))
                    .select(models::Participant::as_select())
                    .load::<models::Participant>(conn)?,
            )
        })
        .await
    }

    pub async fn list_participants_for_family(
        &self,
        family_id: &str,
    ) -> Result<Vec<domain::Participant>, StorageError> {
        let family_id = family_id.to_string();
        self.with_conn(move |conn| {
            convert_all(
                participants::table
                    .filter(participants::family_id.eq(&family_id))
                    .order((participants::last_name.asc(), participants::first_name.asc()))
                    .select(models::Participant::as_select())
                    .load::<models::Participant>(conn)?,
            )
        })
        .await
    }

    pub async fn get_participant(
        &self,
        id: &str,
    ) -> Result<Option<domain::Participant>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            participants::table
                .filter(participants::id.eq(&id))
                .select(models::Participant::as_select())
                .first::<models::Participant>(conn)
                .optional()?
                .map(domain::Participant::try_from)
                .transpose()
        })
        .await
    }

    pub async fn participant_ids(&self) -> Result<HashSet<ParticipantId>, StorageError> {
        self.with_conn(|conn| {
            let ids: Vec<String> = participants::table.select(participants::id).load(conn)?;
            Ok(ids.into_iter().map(ParticipantId::from).collect())
        })
        .await
    }

    /// Refuses with [`StorageError::InUse`] while participation records exist.
    pub async fn delete_participant(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let records: i64 = participation_records::table
                    .filter(participation_records::participant_id.eq(&id))
                    .count()
                    .get_result(conn)?;
                if records > 0 {
                    return Err(StorageError::InUse(format!(
                        "participant {id} has {records} participation record(s)"
                    )));
                }
                let deleted = diesel::delete(participants::table.filter(participants::id.eq(&id)))
                    .execute(conn)?;
                Ok(deleted > 0)
            })
        })
        .await
    }

    // Activities

    pub async fn insert_activity(&self, activity: &domain::Activity) -> Result<(), StorageError> {
        let a = activity.clone();
        trace!(activity_id = %a.id, "insert_activity");
        self.with_conn(move |conn| {
            let row = NewActivity {
                id: a.id.as_str(),
                name: &a.name,
                description: a.description.as_deref(),
                points: a.points,
                created_at: to_naive(a.created_at)?,
            };
            diesel::insert_into(activities::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn list_activities(&self) -> Result<Vec<domain::Activity>, StorageError> {
        self.with_conn(|conn| {
            convert_all(
                activities::table
                    .order(activities::name.asc())
                    .select(models::Activity::as_select())
                    .load::<models::Activity>(conn)?,
            )
        })
        .await
    }

    pub async fn get_activity(&self, id: &str) -> Result<Option<domain::Activity>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            activities::table
                .filter(activities::id.eq(&id))
                .select(models::Activity::as_select())
                .first::<models::Activity>(conn)
                .optional()?
                .map(domain::Activity::try_from)
                .transpose()
        })
        .await
    }

    pub async fn activity_ids(&self) -> Result<HashSet<ActivityId>, StorageError> {
        self.with_conn(|conn| {
            let ids: Vec<String> = activities::table.select(activities::id).load(conn)?;
            Ok(ids.into_iter().map(ActivityId::from).collect())
        })
        .await
    }

    /// Refuses with [`StorageError::InUse`] while participation records reference it.
    pub async fn delete_activity(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let records: i64 = participation_records::table
                    .filter(participation_records::activity_id.eq(&id))
                    .count()
                    .get_result(conn)?;
                if records > 0 {
                    return Err(StorageError::InUse(format!(
                        "activity {id} is used by {records} participation record(s)"
                    )));
                }
                let deleted = diesel::delete(activities::table.filter(activities::id.eq(&id)))
                    .execute(conn)?;
                Ok(deleted > 0)
            })
        })
        .await
    }

    // Participation records (insert-only)

    pub async fn insert_record(
        &self,
        record: &domain::ParticipationRecord,
    ) -> Result<(), StorageError> {
        let r = record.clone();
        trace!(
            record_id = %r.id,
            participant_id = %r.participant_id,
            activity_id = %r.activity_id,
            points = r.points,
            "insert_record"
        );
        self.with_conn(move |conn| {
            let row = NewParticipationRecord {
                id: r.id.as_str(),
                participant_id: r.participant_id.as_str(),
                activity_id: r.activity_id.as_str(),
                date: format_date(r.date)?,
                points: r.points,
                created_at: to_naive(r.created_at)?,
            };
            diesel::insert_into(participation_records::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn list_records_for_participant(
        &self,
        participant_id: &str,
    ) -> Result<Vec<domain::ParticipationRecord>, StorageError> {
        let participant_id = participant_id.to_string();
        self.with_conn(move |conn| {
            convert_all(
                participation_records::table
                    .filter(participation_records::participant_id.eq(&participant_id))
                    .select(models::ParticipationRecord::as_select())
                    .load::<models::ParticipationRecord>(conn)?,
            )
        })
        .await
    }

    /// Records whose date falls inside `range` (ISO dates compare lexically).
    pub async fn list_records_in_range(
        &self,
        range: DateRange,
    ) -> Result<Vec<domain::ParticipationRecord>, StorageError> {
        let from = range.from.map(format_date).transpose()?;
        let to = range.to.map(format_date).transpose()?;
        self.with_conn(move |conn| {
            let mut query = participation_records::table
                .select(models::ParticipationRecord::as_select())
                .into_boxed();
            if let Some(from) = from {
                query = query.filter(participation_records::date.ge(from));
            }
            if let Some(to) = to {
                query = query.filter(participation_records::date.le(to));
            }
            convert_all(query.load::<models::ParticipationRecord>(conn)?)
        })
        .await
    }

    /// Newest first by date, then by creation time.
    pub async fn list_records_page(
        &self,
        participant_id: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<RecordWithActivity>, StorageError> {
        let participant_id = participant_id.to_string();
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = i64::try_from(page.max(1))
            .ok()
            .and_then(|p| (p - 1).checked_mul(per_page))
            .ok_or_else(|| StorageError::InvalidInput(format!("page {page} out of range")))?;
        self.with_conn(move |conn| {
            let rows = participation_records::table
                .left_join(activities::table)
                .filter(participation_records::participant_id.eq(&participant_id))
                .order((
                    participation_records::date.desc(),
                    participation_records::created_at.desc(),
                ))
                .offset(offset)
                .limit(per_page)
                .select((
                    models::ParticipationRecord::as_select(),
                    activities::name.nullable(),
                ))
                .load::<(models::ParticipationRecord, Option<String>)>(conn)?;
            with_activity_names(rows)
        })
        .await
    }

    pub async fn recent_records(&self, limit: usize) -> Result<Vec<RecordWithActivity>, StorageError> {
        let limit = limit.clamp(1, 1000) as i64;
        self.with_conn(move |conn| {
            let rows = participation_records::table
                .left_join(activities::table)
                .order(participation_records::created_at.desc())
                .limit(limit)
                .select((
                    models::ParticipationRecord::as_select(),
                    activities::name.nullable(),
                ))
                .load::<(models::ParticipationRecord, Option<String>)>(conn)?;
            with_activity_names(rows)
        })
        .await
    }

    // Tiers

    /// Inserts `tier` only if the full tier set still partitions cleanly.
    pub async fn insert_tier(&self, tier: &domain::Tier) -> Result<(), StorageError> {
        let t = tier.clone();
        trace!(tier_id = %t.id, min = t.min_points, max = t.max_points, "insert_tier");
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                let mut all: Vec<domain::Tier> = convert_all(
                    tiers::table
                        .select(models::Tier::as_select())
                        .load::<models::Tier>(conn)?,
                )?;
                all.push(t.clone());
                validate_tier_partition(&all)?;
                let row = NewTier {
                    id: t.id.as_str(),
                    name: &t.name,
                    min_points: t.min_points,
                    max_points: t.max_points,
                    created_at: to_naive(t.created_at)?,
                };
                diesel::insert_into(tiers::table).values(&row).execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    /// Ordered by `min_points`.
    pub async fn list_tiers(&self) -> Result<Vec<domain::Tier>, StorageError> {
        self.with_conn(|conn| {
            convert_all(
                tiers::table
                    .order(tiers::min_points.asc())
                    .select(models::Tier::as_select())
                    .load::<models::Tier>(conn)?,
            )
        })
        .await
    }

    /// In strict mode the delete is refused with [`ValidationError::TierGap`]
    /// when a stored participant total would no longer fall inside a tier.
    pub async fn delete_tier(&self, id: &str, mode: TierMode) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let deleted =
                    diesel::delete(tiers::table.filter(tiers::id.eq(&id))).execute(conn)?;
                if deleted > 0 {
                    let remaining: Vec<domain::Tier> = convert_all(
                        tiers::table
                            .select(models::Tier::as_select())
                            .load::<models::Tier>(conn)?,
                    )?;
                    // Rolls the delete back on failure
                    check_totals_covered(conn, &remaining, mode)?;
                }
                Ok(deleted > 0)
            })
        })
        .await
    }
}

fn with_activity_names(
    rows: Vec<(models::ParticipationRecord, Option<String>)>,
) -> Result<Vec<RecordWithActivity>, StorageError> {
    rows.into_iter()
        .map(|(r, name)| Ok((domain::ParticipationRecord::try_from(r)?, name)))
        .collect()
}

/// Strict mode only: every participant total, including zero for those
/// without records, must land in one of `tiers`.
fn check_totals_covered(
    conn: &mut SqliteConnection,
    tiers: &[domain::Tier],
    mode: TierMode,
) -> Result<(), StorageError> {
    if mode == TierMode::Lenient {
        return Ok(());
    }
    let ids: Vec<String> = participants::table.select(participants::id).load(conn)?;
    let points: Vec<(String, i32)> = participation_records::table
        .select((
            participation_records::participant_id,
            participation_records::points,
        ))
        .load(conn)?;
    let mut totals: BTreeMap<String, i64> = ids.into_iter().map(|id| (id, 0)).collect();
    for (participant_id, p) in points {
        *totals.entry(participant_id).or_insert(0) += i64::from(p);
    }
    for total in totals.values() {
        resolve_tier(*total, tiers, mode)?;
    }
    Ok(())
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    // Backstop for the foreign keys checked by the validators
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
