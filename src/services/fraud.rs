use uuid::Uuid;

use crate::models::fraud::{FraudDecision, NewFraudSignal, SignalType};
use crate::models::participation::ParticipationStatus;

/// Aggregate score at or above which a submission is rejected without review.
pub const AUTO_REJECT_THRESHOLD: i32 = 70;

/// Signal weights. Duplicate proof is the strongest evidence; velocity and
/// account history only nudge a submission into manual review on their own.
pub const WEIGHT_DUPLICATE_IMAGE: i32 = 40;
pub const WEIGHT_DUPLICATE_TEXT: i32 = 30;
pub const WEIGHT_VELOCITY_HIGH: i32 = 15;
pub const WEIGHT_VELOCITY_ELEVATED: i32 = 8;
pub const WEIGHT_NEW_ACCOUNT: i32 = 8;
pub const WEIGHT_REJECTION_HISTORY: i32 = 7;

/// A near-duplicate asset pair found during aggregation.
#[derive(Debug, Clone)]
pub struct DuplicateAssetMatch {
    pub asset_id: Uuid,
    pub other_participation_id: Uuid,
    pub distance: u32,
}

pub fn duplicate_image_signal(matches: &[DuplicateAssetMatch]) -> Option<NewFraudSignal> {
    if matches.is_empty() {
        return None;
    }
    let closest = matches.iter().min_by_key(|m| m.distance)?;
    Some(NewFraudSignal {
        signal_type: SignalType::DuplicateImage,
        signal_value: format!("{} near-duplicate asset(s)", matches.len()),
        score: WEIGHT_DUPLICATE_IMAGE,
        details: serde_json::json!({
            "matches": matches.len(),
            "closest_distance": closest.distance,
            "closest_participation_id": closest.other_participation_id,
        }),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct VelocityInput {
    /// Participations this user submitted today, across campaigns.
    pub submissions_today: i64,
    pub daily_cap: i32,
}

pub fn velocity_signal(input: VelocityInput) -> Option<NewFraudSignal> {
    if input.daily_cap <= 0 {
        return None;
    }
    let ratio = input.submissions_today as f64 / input.daily_cap as f64;
    let score = if ratio >= 0.8 {
        WEIGHT_VELOCITY_HIGH
    } else if ratio >= 0.5 {
        WEIGHT_VELOCITY_ELEVATED
    } else {
        return None;
    };
    Some(NewFraudSignal {
        signal_type: SignalType::SubmissionVelocity,
        signal_value: format!("{}/{} today", input.submissions_today, input.daily_cap),
        score,
        details: serde_json::json!({
            "submissions_today": input.submissions_today,
            "daily_cap": input.daily_cap,
        }),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryInput {
    pub account_age_days: i64,
    pub prior_participations: i64,
    pub prior_rejected: i64,
}

pub fn history_signal(input: HistoryInput) -> Option<NewFraudSignal> {
    let mut score = 0;
    let mut reasons = Vec::new();

    if input.account_age_days < 1 {
        score += WEIGHT_NEW_ACCOUNT;
        reasons.push("first-day account");
    }
    // A rejection streak needs some history behind it to mean anything.
    if input.prior_participations >= 3
        && input.prior_rejected * 2 >= input.prior_participations
    {
        score += WEIGHT_REJECTION_HISTORY;
        reasons.push("high rejection ratio");
    }

    if score == 0 {
        return None;
    }
    Some(NewFraudSignal {
        signal_type: SignalType::AccountHistory,
        signal_value: reasons.join(", "),
        score,
        details: serde_json::json!({
            "account_age_days": input.account_age_days,
            "prior_participations": input.prior_participations,
            "prior_rejected": input.prior_rejected,
        }),
    })
}

/// Sum signal contributions into a [0,100] score.
pub fn aggregate_score(contributions: &[i32]) -> i32 {
    contributions.iter().sum::<i32>().clamp(0, 100)
}

pub fn decide(score: i32, has_signals: bool) -> FraudDecision {
    if score >= AUTO_REJECT_THRESHOLD {
        FraudDecision::AutoReject
    } else if has_signals {
        FraudDecision::ManualReview
    } else {
        FraudDecision::Pass
    }
}

/// The participation status a decision routes to.
pub fn decision_target(decision: FraudDecision) -> ParticipationStatus {
    match decision {
        FraudDecision::AutoReject => ParticipationStatus::AutoRejected,
        FraudDecision::ManualReview => ParticipationStatus::ManualReview,
        FraudDecision::Pass => ParticipationStatus::PendingReview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_image_and_text_cross_reject_threshold() {
        let score = aggregate_score(&[WEIGHT_DUPLICATE_IMAGE, WEIGHT_DUPLICATE_TEXT]);
        assert_eq!(score, 70);
        assert_eq!(decide(score, true), FraudDecision::AutoReject);
    }

    #[test]
    fn score_is_clamped_to_hundred() {
        let score = aggregate_score(&[40, 30, 15, 15, 15]);
        assert_eq!(score, 100);
    }

    #[test]
    fn signals_below_threshold_route_to_manual_review() {
        let score = aggregate_score(&[WEIGHT_DUPLICATE_TEXT]);
        assert_eq!(decide(score, true), FraudDecision::ManualReview);
        assert_eq!(
            decision_target(FraudDecision::ManualReview),
            crate::models::participation::ParticipationStatus::ManualReview
        );
    }

    #[test]
    fn clean_submission_routes_to_pending_review() {
        assert_eq!(decide(0, false), FraudDecision::Pass);
        assert_eq!(
            decision_target(FraudDecision::Pass),
            crate::models::participation::ParticipationStatus::PendingReview
        );
    }

    #[test]
    fn velocity_scales_with_proximity_to_cap() {
        assert!(velocity_signal(VelocityInput { submissions_today: 1, daily_cap: 10 }).is_none());
        let elevated =
            velocity_signal(VelocityInput { submissions_today: 5, daily_cap: 10 }).unwrap();
        assert_eq!(elevated.score, WEIGHT_VELOCITY_ELEVATED);
        let high = velocity_signal(VelocityInput { submissions_today: 9, daily_cap: 10 }).unwrap();
        assert_eq!(high.score, WEIGHT_VELOCITY_HIGH);
    }

    #[test]
    fn history_needs_volume_before_rejection_ratio_counts() {
        // Two priors, both rejected: not enough history.
        assert!(history_signal(HistoryInput {
            account_age_days: 30,
            prior_participations: 2,
            prior_rejected: 2,
        })
        .is_none());

        let flagged = history_signal(HistoryInput {
            account_age_days: 30,
            prior_participations: 4,
            prior_rejected: 2,
        })
        .unwrap();
        assert_eq!(flagged.score, WEIGHT_REJECTION_HISTORY);
    }

    #[test]
    fn brand_new_account_is_a_signal() {
        let s = history_signal(HistoryInput {
            account_age_days: 0,
            prior_participations: 0,
            prior_rejected: 0,
        })
        .unwrap();
        assert_eq!(s.score, WEIGHT_NEW_ACCOUNT);
    }

    #[test]
    fn no_duplicate_matches_no_signal() {
        assert!(duplicate_image_signal(&[]).is_none());
        let m = DuplicateAssetMatch {
            asset_id: Uuid::new_v4(),
            other_participation_id: Uuid::new_v4(),
            distance: 3,
        };
        let signal = duplicate_image_signal(&[m]).unwrap();
        assert_eq!(signal.score, WEIGHT_DUPLICATE_IMAGE);
    }
}
