use serde::{Deserialize, Serialize};

use crate::domain::{ParticipantId, ParticipationRecord, Tier};
use crate::validate::ValidationError;

/// How [`resolve_tier`] treats a total that no tier covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierMode {
    /// Uncovered totals are an error ([`ValidationError::TierGap`]).
    Strict,
    /// Uncovered totals resolve to [`Standing::Unranked`].
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing<'a> {
    Ranked(&'a Tier),
    Unranked,
}

impl<'a> Standing<'a> {
    pub fn tier(&self) -> Option<&'a Tier> {
        match *self {
            Standing::Ranked(t) => Some(t),
            Standing::Unranked => None,
        }
    }
}

pub fn compute_total_points(
    participant_id: &ParticipantId,
    records: &[ParticipationRecord],
) -> i64 {
    records
        .iter()
        .filter(|r| &r.participant_id == participant_id)
        .map(|r| i64::from(r.points))
        .sum()
}

pub fn resolve_tier(
    total_points: i64,
    tiers: &[Tier],
    mode: TierMode,
) -> Result<Standing<'_>, ValidationError> {
    match tiers.iter().find(|t| t.contains(total_points)) {
        Some(t) => Ok(Standing::Ranked(t)),
        None => match mode {
            TierMode::Strict => Err(ValidationError::TierGap {
                points: total_points,
            }),
            TierMode::Lenient => Ok(Standing::Unranked),
        },
    }
}

/// Fails with [`ValidationError::OverlappingTiers`] naming the first
/// conflicting pair in ascending `min_points` order.
pub fn validate_tier_partition(tiers: &[Tier]) -> Result<(), ValidationError> {
    let mut sorted: Vec<&Tier> = tiers.iter().collect();
    sorted.sort_by_key(|t| (t.min_points, t.max_points));

    // Tier reaching furthest so far; any later tier starting below its end overlaps it.
    let mut reach: Option<&Tier> = None;
    for t in sorted {
        if let Some(prev) = reach {
            if prev.overlaps(t) {
                return Err(ValidationError::OverlappingTiers {
                    first: prev.id.clone(),
                    second: t.id.clone(),
                });
            }
            if t.max_points > prev.max_points {
                reach = Some(t);
            }
        } else {
            reach = Some(t);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityId, RecordId, TierId};
    use time::macros::{date, datetime};

    fn rec(participant: &str, points: i32) -> ParticipationRecord {
        ParticipationRecord {
            id: RecordId::from(format!("{participant}-{points}")),
            participant_id: ParticipantId::from(participant),
            activity_id: ActivityId::from("a"),
            date: date!(2024 - 01 - 05),
            points,
            created_at: datetime!(2024-01-05 10:00 UTC),
        }
    }

    fn tier(id: &str, min: i32, max: i32) -> Tier {
        Tier {
            id: TierId::from(id),
            name: id.to_uppercase(),
            min_points: min,
            max_points: max,
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[test]
    fn total_sums_only_matching_records() {
        let records = vec![rec("p", 10), rec("q", 7), rec("p", 5)];
        assert_eq!(compute_total_points(&ParticipantId::from("p"), &records), 15);
        assert_eq!(compute_total_points(&ParticipantId::from("q"), &records), 7);
        assert_eq!(compute_total_points(&ParticipantId::from("r"), &records), 0);
        assert_eq!(compute_total_points(&ParticipantId::from("p"), &[]), 0);
    }

    #[test]
    fn total_does_not_overflow_i32() {
        let records = vec![rec("p", i32::MAX), rec("p", i32::MAX)];
        assert_eq!(
            compute_total_points(&ParticipantId::from("p"), &records),
            2 * i64::from(i32::MAX)
        );
    }

    #[test]
    fn lower_bound_is_inclusive() {
        let tiers = vec![tier("low", 0, 10), tier("high", 10, 25)];
        let standing = resolve_tier(10, &tiers, TierMode::Strict).unwrap();
        assert_eq!(standing.tier().map(|t| t.id.as_str()), Some("high"));
        let standing = resolve_tier(9, &tiers, TierMode::Strict).unwrap();
        assert_eq!(standing.tier().map(|t| t.id.as_str()), Some("low"));
    }

    #[test]
    fn uncovered_total_depends_on_mode() {
        let tiers = vec![tier("only", 0, 10)];
        assert_eq!(
            resolve_tier(15, &tiers, TierMode::Strict),
            Err(ValidationError::TierGap { points: 15 })
        );
        assert_eq!(
            resolve_tier(15, &tiers, TierMode::Lenient),
            Ok(Standing::Unranked)
        );
        assert_eq!(resolve_tier(0, &[], TierMode::Lenient), Ok(Standing::Unranked));
    }

    #[test]
    fn overlapping_tiers_are_rejected() {
        let tiers = vec![tier("a", 0, 10), tier("b", 5, 20)];
        assert_eq!(
            validate_tier_partition(&tiers),
            Err(ValidationError::OverlappingTiers {
                first: TierId::from("a"),
                second: TierId::from("b"),
            })
        );
    }

    #[test]
    fn overlap_with_earlier_wide_tier_is_found() {
        // "wide" spans both others and sorts first.
        let tiers = vec![tier("mid", 50, 60), tier("wide", 0, 100), tier("narrow", 5, 10)];
        match validate_tier_partition(&tiers) {
            Err(ValidationError::OverlappingTiers { first, .. }) => {
                assert_eq!(first, TierId::from("wide"))
            }
            other => panic!("expected OverlappingTiers, got {other:?}"),
        }
    }

    #[test]
    fn contiguous_and_sparse_tiers_partition() {
        let contiguous = vec![tier("c", 25, 100), tier("a", 0, 10), tier("b", 10, 25)];
        assert_eq!(validate_tier_partition(&contiguous), Ok(()));
        let sparse = vec![tier("a", 0, 10), tier("b", 40, 50)];
        assert_eq!(validate_tier_partition(&sparse), Ok(()));
        assert_eq!(validate_tier_partition(&[]), Ok(()));
    }

    #[test]
    fn tier_mode_reads_lowercase() {
        let mode: TierMode = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(mode, TierMode::Strict);
        assert_eq!(TierMode::default(), TierMode::Lenient);
    }
}
