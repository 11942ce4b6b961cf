use crate::storage::StorageError;
use crate::storage::schema::{activities, families, participants, participation_records, tiers};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use familypoints_shared::domain::{self, DATE_FORMAT};
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = families)]
pub struct Family {
    pub id: String,
    pub name: String,
    pub contact_email: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = families)]
pub struct NewFamily<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub contact_email: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = participants)]
pub struct Participant {
    pub id: String,
    pub family_id: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = participants)]
pub struct NewParticipant<'a> {
    pub id: &'a str,
    pub family_id: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub birth_date: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = activities)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub points: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = activities)]
pub struct NewActivity<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub points: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = participation_records)]
pub struct ParticipationRecord {
    pub id: String,
    pub participant_id: String,
    pub activity_id: String,
    pub date: String,
    pub points: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = participation_records)]
pub struct NewParticipationRecord<'a> {
    pub id: &'a str,
    pub participant_id: &'a str,
    pub activity_id: &'a str,
    pub date: String,
    pub points: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = tiers)]
pub struct Tier {
    pub id: String,
    pub name: String,
    pub min_points: i32,
    pub max_points: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = tiers)]
pub struct NewTier<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub min_points: i32,
    pub max_points: i32,
    pub created_at: NaiveDateTime,
}

// Timestamps are stored as naive UTC.
pub(crate) fn to_naive(ts: OffsetDateTime) -> Result<NaiveDateTime, StorageError> {
    chrono::DateTime::from_timestamp(ts.unix_timestamp(), ts.nanosecond())
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| StorageError::InvalidInput(format!("timestamp out of range: {ts}")))
}

pub(crate) fn from_naive(ndt: NaiveDateTime) -> Result<OffsetDateTime, StorageError> {
    let utc = ndt.and_utc();
    OffsetDateTime::from_unix_timestamp(utc.timestamp())
        .and_then(|t| t.replace_nanosecond(utc.timestamp_subsec_nanos()))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {ndt}: {e}")))
}

pub(crate) fn format_date(date: Date) -> Result<String, StorageError> {
    date.format(DATE_FORMAT)
        .map_err(|e| StorageError::InvalidInput(format!("date {date}: {e}")))
}

fn parse_date(s: &str) -> Result<Date, StorageError> {
    domain::parse_date(s).map_err(|e| StorageError::Corrupt(format!("date {s:?}: {e}")))
}

impl TryFrom<Family> for domain::Family {
    type Error = StorageError;
    fn try_from(row: Family) -> Result<Self, Self::Error> {
        Ok(domain::Family {
            id: row.id.into(),
            name: row.name,
            contact_email: row.contact_email,
            created_at: from_naive(row.created_at)?,
        })
    }
}

impl TryFrom<Participant> for domain::Participant {
    type Error = StorageError;
    fn try_from(row: Participant) -> Result<Self, Self::Error> {
        Ok(domain::Participant {
            id: row.id.into(),
            family_id: row.family_id.into(),
            first_name: row.first_name,
            last_name: row.last_name,
            birth_date: parse_date(&row.birth_date)?,
            created_at: from_naive(row.created_at)?,
        })
    }
}

impl TryFrom<Activity> for domain::Activity {
    type Error = StorageError;
    fn try_from(row: Activity) -> Result<Self, Self::Error> {
        Ok(domain::Activity {
            id: row.id.into(),
            name: row.name,
            description: row.description,
            points: row.points,
            created_at: from_naive(row.created_at)?,
        })
    }
}

impl TryFrom<ParticipationRecord> for domain::ParticipationRecord {
    type Error = StorageError;
    fn try_from(row: ParticipationRecord) -> Result<Self, Self::Error> {
        Ok(domain::ParticipationRecord {
            id: row.id.into(),
            participant_id: row.participant_id.into(),
            activity_id: row.activity_id.into(),
            date: parse_date(&row.date)?,
            points: row.points,
            created_at: from_naive(row.created_at)?,
        })
    }
}

impl TryFrom<Tier> for domain::Tier {
    type Error = StorageError;
    fn try_from(row: Tier) -> Result<Self, Self::Error> {
        Ok(domain::Tier {
            id: row.id.into(),
            name: row.name,
            min_points: row.min_points,
            max_points: row.max_points,
            created_at: from_naive(row.created_at)?,
        })
    }
}

/// Converts a batch of rows, failing on the first corrupt one.
pub(crate) fn convert_all<R, D>(rows: Vec<R>) -> Result<Vec<D>, StorageError>
where
    D: TryFrom<R, Error = StorageError>,
{
    rows.into_iter().map(D::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamps_survive_naive_storage() {
        let ts = datetime!(2024-05-06 07:08:09.123456789 UTC);
        let back = from_naive(to_naive(ts).unwrap()).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn stored_dates_are_iso() {
        let d = time::macros::date!(2016 - 11 - 30);
        assert_eq!(format_date(d).unwrap(), "2016-11-30");
        assert_eq!(parse_date("2016-11-30").unwrap(), d);
        assert!(matches!(parse_date("30.11.2016"), Err(StorageError::Corrupt(_))));
    }
}
