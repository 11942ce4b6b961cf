//! Aggregations behind the dashboard and reports views.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::domain::{
    Activity, ActivityId, Family, FamilyId, Participant, ParticipantId, ParticipationRecord, Tier,
};
use crate::scoring::{TierMode, resolve_tier};
use crate::validate::ValidationError;

/// Inclusive date window; an open end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, with = "crate::domain::iso_date::option")]
    pub from: Option<Date>,
    #[serde(default, with = "crate::domain::iso_date::option")]
    pub to: Option<Date>,
}

impl DateRange {
    pub fn contains(&self, date: Date) -> bool {
        self.from.is_none_or(|f| f <= date) && self.to.is_none_or(|t| date <= t)
    }

    pub fn filter<'a>(
        &self,
        records: &'a [ParticipationRecord],
    ) -> impl Iterator<Item = &'a ParticipationRecord> + use<'a> {
        let range = *self;
        records.iter().filter(move |r| range.contains(r.date))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStanding {
    pub participant: Participant,
    pub total_points: i64,
    /// `None` when unranked (lenient mode only).
    pub tier: Option<Tier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyTotal {
    pub family: Family,
    pub participant_count: usize,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTotal {
    pub activity: Activity,
    pub times: usize,
    pub total_points: i64,
}

fn points_by_participant<'a>(
    records: impl IntoIterator<Item = &'a ParticipationRecord>,
) -> HashMap<&'a ParticipantId, i64> {
    let mut totals = HashMap::new();
    for r in records {
        *totals.entry(&r.participant_id).or_insert(0) += i64::from(r.points);
    }
    totals
}

/// Totals and tiers for `participants`, highest total first.
pub fn participant_standings(
    participants: &[Participant],
    records: &[ParticipationRecord],
    tiers: &[Tier],
    mode: TierMode,
) -> Result<Vec<ParticipantStanding>, ValidationError> {
    let totals = points_by_participant(records);
    let mut out = Vec::with_capacity(participants.len());
    for p in participants {
        let total_points = totals.get(&p.id).copied().unwrap_or(0);
        let tier = resolve_tier(total_points, tiers, mode)?.tier().cloned();
        out.push(ParticipantStanding {
            participant: p.clone(),
            total_points,
            tier,
        });
    }
    out.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.participant.last_name.cmp(&b.participant.last_name))
            .then_with(|| a.participant.first_name.cmp(&b.participant.first_name))
            .then_with(|| a.participant.id.cmp(&b.participant.id))
    });
    Ok(out)
}

pub fn family_totals(
    families: &[Family],
    participants: &[Participant],
    records: &[ParticipationRecord],
) -> Vec<FamilyTotal> {
    let by_participant = points_by_participant(records);
    let mut acc: HashMap<&FamilyId, (usize, i64)> = HashMap::new();
    for p in participants {
        let entry = acc.entry(&p.family_id).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += by_participant.get(&p.id).copied().unwrap_or(0);
    }
    let mut out: Vec<FamilyTotal> = families
        .iter()
        .map(|f| {
            let (participant_count, total_points) = acc.get(&f.id).copied().unwrap_or((0, 0));
            FamilyTotal {
                family: f.clone(),
                participant_count,
                total_points,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.family.name.cmp(&b.family.name))
    });
    out
}

pub fn activity_totals(
    activities: &[Activity],
    records: &[ParticipationRecord],
) -> Vec<ActivityTotal> {
    let mut acc: HashMap<&ActivityId, (usize, i64)> = HashMap::new();
    for r in records {
        let entry = acc.entry(&r.activity_id).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += i64::from(r.points);
    }
    let mut out: Vec<ActivityTotal> = activities
        .iter()
        .map(|a| {
            let (times, total_points) = acc.get(&a.id).copied().unwrap_or((0, 0));
            ActivityTotal {
                activity: a.clone(),
                times,
                total_points,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.activity.name.cmp(&b.activity.name))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RecordId, TierId};
    use time::macros::{date, datetime};

    fn family(id: &str, name: &str) -> Family {
        Family {
            id: FamilyId::from(id),
            name: name.into(),
            contact_email: format!("{id}@example.org"),
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn participant(id: &str, family: &str, first: &str, last: &str) -> Participant {
        Participant {
            id: ParticipantId::from(id),
            family_id: FamilyId::from(family),
            first_name: first.into(),
            last_name: last.into(),
            birth_date: date!(2014 - 09 - 01),
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn activity(id: &str, name: &str) -> Activity {
        Activity {
            id: ActivityId::from(id),
            name: name.into(),
            description: Some(format!("{name} session")),
            points: 5,
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn rec(id: &str, participant: &str, activity: &str, date: Date, points: i32) -> ParticipationRecord {
        ParticipationRecord {
            id: RecordId::from(id),
            participant_id: ParticipantId::from(participant),
            activity_id: ActivityId::from(activity),
            date,
            points,
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn tiers() -> Vec<Tier> {
        vec![
            Tier {
                id: TierId::from("bronze"),
                name: "Bronze".into(),
                min_points: 0,
                max_points: 10,
                created_at: datetime!(2024-01-01 0:00 UTC),
            },
            Tier {
                id: TierId::from("silver"),
                name: "Silver".into(),
                min_points: 10,
                max_points: 25,
                created_at: datetime!(2024-01-01 0:00 UTC),
            },
        ]
    }

    fn fixture() -> (Vec<Family>, Vec<Participant>, Vec<Activity>, Vec<ParticipationRecord>) {
        let families = vec![family("f1", "Horvat"), family("f2", "Kovac")];
        let participants = vec![
            participant("p1", "f1", "Ana", "Horvat"),
            participant("p2", "f1", "Ivo", "Horvat"),
            participant("p3", "f2", "Mia", "Kovac"),
        ];
        let activities = vec![activity("swim", "Swimming"), activity("read", "Reading")];
        let records = vec![
            rec("r1", "p1", "swim", date!(2024 - 01 - 10), 10),
            rec("r2", "p1", "read", date!(2024 - 02 - 10), 5),
            rec("r3", "p3", "swim", date!(2024 - 02 - 15), 8),
        ];
        (families, participants, activities, records)
    }

    #[test]
    fn standings_rank_by_total() {
        let (_, participants, _, records) = fixture();
        let tiers = tiers();
        let out = participant_standings(&participants, &records, &tiers, TierMode::Strict).unwrap();
        let summary: Vec<(&str, i64, Option<&str>)> = out
            .iter()
            .map(|s| {
                (
                    s.participant.id.as_str(),
                    s.total_points,
                    s.tier.as_ref().map(|t| t.id.as_str()),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("p1", 15, Some("silver")),
                ("p3", 8, Some("bronze")),
                ("p2", 0, Some("bronze")),
            ]
        );
    }

    #[test]
    fn standings_surface_tier_gap_in_strict_mode() {
        let (_, participants, _, mut records) = fixture();
        records.push(rec("r4", "p2", "swim", date!(2024 - 03 - 01), 40));
        let tiers = tiers();
        assert_eq!(
            participant_standings(&participants, &records, &tiers, TierMode::Strict),
            Err(ValidationError::TierGap { points: 40 })
        );
        let lenient =
            participant_standings(&participants, &records, &tiers, TierMode::Lenient).unwrap();
        assert_eq!(lenient[0].participant.id.as_str(), "p2");
        assert!(lenient[0].tier.is_none());
    }

    #[test]
    fn family_totals_include_empty_families() {
        let (mut families, participants, _, records) = fixture();
        families.push(family("f3", "Babic"));
        let out = family_totals(&families, &participants, &records);
        let summary: Vec<(&str, usize, i64)> = out
            .iter()
            .map(|t| (t.family.id.as_str(), t.participant_count, t.total_points))
            .collect();
        assert_eq!(summary, vec![("f1", 2, 15), ("f2", 1, 8), ("f3", 0, 0)]);
    }

    #[test]
    fn activity_totals_count_records() {
        let (_, _, activities, records) = fixture();
        let out = activity_totals(&activities, &records);
        assert_eq!(out[0].activity.id.as_str(), "swim");
        assert_eq!((out[0].times, out[0].total_points), (2, 18));
        assert_eq!((out[1].times, out[1].total_points), (1, 5));
    }

    #[test]
    fn date_range_is_inclusive() {
        let (_, _, _, records) = fixture();
        let feb = DateRange {
            from: Some(date!(2024 - 02 - 01)),
            to: Some(date!(2024 - 02 - 15)),
        };
        let ids: Vec<&str> = feb.filter(&records).map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);
        assert_eq!(DateRange::default().filter(&records).count(), 3);
        let until_jan = DateRange {
            from: None,
            to: Some(date!(2024 - 01 - 10)),
        };
        assert_eq!(until_jan.filter(&records).count(), 1);
    }
}
