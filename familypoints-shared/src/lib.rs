pub mod api;
pub mod domain;
pub mod report;
pub mod scoring;
pub mod validate;

pub use scoring::{Standing, TierMode, compute_total_points, resolve_tier, validate_tier_partition};
pub use validate::{
    KnownIds, ValidationError, validate_activity, validate_family, validate_participant,
    validate_participation_record, validate_tier,
};
