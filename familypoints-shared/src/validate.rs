//! Record validation rules.
//!
//! Every function here is pure: it inspects the candidate record and the
//! caller-supplied sets of known foreign ids, and reports the first offending
//! field. Persistence is the caller's business.

use std::collections::{BTreeSet, HashSet};
use std::hash::{BuildHasher, Hash};

use crate::domain::{
    Activity, ActivityId, Family, FamilyId, Participant, ParticipantId, ParticipationRecord,
    Tier, TierId,
};

/// Error type for validation and derivation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} is malformed: {reason}")]
    Malformed {
        field: &'static str,
        reason: &'static str,
    },

    #[error("{field} cannot be negative (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("{field} references unknown id {id}")]
    ForeignKey { field: &'static str, id: String },

    #[error("max_points ({max_points}) must be greater than min_points ({min_points})")]
    EmptyRange { min_points: i32, max_points: i32 },

    #[error("tier {first} overlaps tier {second}")]
    OverlappingTiers { first: TierId, second: TierId },

    #[error("no tier covers {points} points")]
    TierGap { points: i64 },
}

impl ValidationError {
    /// Name of the offending field, when the error is about a single field.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::Malformed { field, .. }
            | ValidationError::Negative { field, .. }
            | ValidationError::ForeignKey { field, .. } => Some(*field),
            ValidationError::EmptyRange { .. } => Some("max_points"),
            ValidationError::OverlappingTiers { .. } | ValidationError::TierGap { .. } => None,
        }
    }
}

/// A set of ids that already exist in storage.
pub trait KnownIds<K> {
    fn knows(&self, id: &K) -> bool;
}

impl<K: Eq + Hash, S: BuildHasher> KnownIds<K> for HashSet<K, S> {
    fn knows(&self, id: &K) -> bool {
        self.contains(id)
    }
}

impl<K: Ord> KnownIds<K> for BTreeSet<K> {
    fn knows(&self, id: &K) -> bool {
        self.contains(id)
    }
}

impl<K: PartialEq> KnownIds<K> for [K] {
    fn knows(&self, id: &K) -> bool {
        self.contains(id)
    }
}

impl<K: PartialEq> KnownIds<K> for Vec<K> {
    fn knows(&self, id: &K) -> bool {
        self.as_slice().knows(id)
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(())
}

fn non_negative(field: &'static str, value: i32) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field,
            value: i64::from(value),
        });
    }
    Ok(())
}

fn resolves<K, S>(field: &'static str, id: &K, known: &S) -> Result<(), ValidationError>
where
    K: std::fmt::Display,
    S: KnownIds<K> + ?Sized,
{
    if !known.knows(id) {
        return Err(ValidationError::ForeignKey {
            field,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn check_email(value: &str) -> Result<(), ValidationError> {
    let malformed = |reason| ValidationError::Malformed {
        field: "contact_email",
        reason,
    };
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return Err(malformed("contains whitespace"));
    }
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            if domain.contains('@') {
                Err(malformed("more than one '@'"))
            } else {
                Ok(())
            }
        }
        _ => Err(malformed("expected local@domain")),
    }
}

pub fn validate_family(family: &Family) -> Result<(), ValidationError> {
    require("id", family.id.as_str())?;
    require("name", &family.name)?;
    require("contact_email", &family.contact_email)?;
    check_email(&family.contact_email)
}

pub fn validate_participant<F>(
    participant: &Participant,
    known_families: &F,
) -> Result<(), ValidationError>
where
    F: KnownIds<FamilyId> + ?Sized,
{
    require("id", participant.id.as_str())?;
    require("family_id", participant.family_id.as_str())?;
    resolves("family_id", &participant.family_id, known_families)?;
    require("first_name", &participant.first_name)?;
    require("last_name", &participant.last_name)?;
    Ok(())
}

pub fn validate_activity(activity: &Activity) -> Result<(), ValidationError> {
    require("id", activity.id.as_str())?;
    require("name", &activity.name)?;
    non_negative("points", activity.points)
}

pub fn validate_participation_record<P, A>(
    record: &ParticipationRecord,
    known_participants: &P,
    known_activities: &A,
) -> Result<(), ValidationError>
where
    P: KnownIds<ParticipantId> + ?Sized,
    A: KnownIds<ActivityId> + ?Sized,
{
    require("id", record.id.as_str())?;
    require("participant_id", record.participant_id.as_str())?;
    resolves("participant_id", &record.participant_id, known_participants)?;
    require("activity_id", record.activity_id.as_str())?;
    resolves("activity_id", &record.activity_id, known_activities)?;
    non_negative("points", record.points)
}

/// Checks a single tier in isolation; use
/// [`validate_tier_partition`](crate::scoring::validate_tier_partition) for
/// the whole set.
pub fn validate_tier(tier: &Tier) -> Result<(), ValidationError> {
    require("id", tier.id.as_str())?;
    require("name", &tier.name)?;
    non_negative("min_points", tier.min_points)?;
    non_negative("max_points", tier.max_points)?;
    if tier.max_points <= tier.min_points {
        return Err(ValidationError::EmptyRange {
            min_points: tier.min_points,
            max_points: tier.max_points,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn family() -> Family {
        Family {
            id: FamilyId::from("f1"),
            name: "Novak".into(),
            contact_email: "novak@example.org".into(),
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn participant() -> Participant {
        Participant {
            id: ParticipantId::from("p1"),
            family_id: FamilyId::from("f1"),
            first_name: "Ema".into(),
            last_name: "Novak".into(),
            birth_date: date!(2015 - 05 - 02),
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn activity() -> Activity {
        Activity {
            id: ActivityId::from("a1"),
            name: "Swimming".into(),
            description: None,
            points: 10,
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn record() -> ParticipationRecord {
        ParticipationRecord {
            id: crate::domain::RecordId::from("r1"),
            participant_id: ParticipantId::from("p1"),
            activity_id: ActivityId::from("a1"),
            date: date!(2024 - 02 - 10),
            points: 10,
            created_at: datetime!(2024-02-10 9:00 UTC),
        }
    }

    fn tier() -> Tier {
        Tier {
            id: TierId::from("bronze"),
            name: "Bronze".into(),
            min_points: 0,
            max_points: 50,
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[test]
    fn valid_records_pass() {
        let families: HashSet<FamilyId> = [FamilyId::from("f1")].into_iter().collect();
        let participants = vec![ParticipantId::from("p1")];
        let activities: BTreeSet<ActivityId> = [ActivityId::from("a1")].into_iter().collect();

        assert_eq!(validate_family(&family()), Ok(()));
        assert_eq!(validate_participant(&participant(), &families), Ok(()));
        assert_eq!(validate_activity(&activity()), Ok(()));
        assert_eq!(
            validate_participation_record(&record(), &participants, &activities),
            Ok(())
        );
        assert_eq!(validate_tier(&tier()), Ok(()));
    }

    #[test]
    fn blank_name_is_missing() {
        let mut f = family();
        f.name = "   ".into();
        let err = validate_family(&f).unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "name" });
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn malformed_email_fails() {
        for bad in ["novak", "@example.org", "novak@", "a@b@c", "no vak@example.org"] {
            let mut f = family();
            f.contact_email = bad.into();
            match validate_family(&f) {
                Err(ValidationError::Malformed { field, .. }) => assert_eq!(field, "contact_email"),
                other => panic!("expected Malformed for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn participant_with_unknown_family_fails() {
        let known: Vec<FamilyId> = vec![FamilyId::from("other")];
        match validate_participant(&participant(), &known) {
            Err(ValidationError::ForeignKey { field, id }) => {
                assert_eq!(field, "family_id");
                assert_eq!(id, "f1");
            }
            other => panic!("expected ForeignKey, got {other:?}"),
        }
    }

    #[test]
    fn record_with_unknown_participant_or_activity_fails() {
        let participants = [ParticipantId::from("p1")];
        let activities = [ActivityId::from("a1")];

        let mut r = record();
        r.participant_id = ParticipantId::from("ghost");
        assert!(matches!(
            validate_participation_record(&r, &participants[..], &activities[..]),
            Err(ValidationError::ForeignKey {
                field: "participant_id",
                ..
            })
        ));

        let mut r = record();
        r.activity_id = ActivityId::from("ghost");
        assert!(matches!(
            validate_participation_record(&r, &participants[..], &activities[..]),
            Err(ValidationError::ForeignKey {
                field: "activity_id",
                ..
            })
        ));
    }

    #[test]
    fn negative_points_fail() {
        let mut a = activity();
        a.points = -1;
        assert_eq!(
            validate_activity(&a),
            Err(ValidationError::Negative {
                field: "points",
                value: -1
            })
        );

        let mut r = record();
        r.points = -3;
        let err = validate_participation_record(
            &r,
            &[ParticipantId::from("p1")][..],
            &[ActivityId::from("a1")][..],
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("points"));
    }

    #[test]
    fn tier_needs_non_empty_range() {
        let mut t = tier();
        t.max_points = 0;
        assert_eq!(
            validate_tier(&t),
            Err(ValidationError::EmptyRange {
                min_points: 0,
                max_points: 0
            })
        );
        let mut t = tier();
        t.min_points = -5;
        assert_eq!(validate_tier(&t).unwrap_err().field(), Some("min_points"));
    }

    #[test]
    fn validation_is_repeatable() {
        let known = vec![FamilyId::from("nobody")];
        let p = participant();
        assert_eq!(
            validate_participant(&p, &known),
            validate_participant(&p, &known)
        );
        assert_eq!(validate_family(&family()), validate_family(&family()));
    }
}
