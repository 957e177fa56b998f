//! Lead fitness scoring and ranking.
//!
//! Scoring is a pure function of a lead, the ICP and the weights: the same
//! inputs always produce the same score. Each sub-score is normalized to
//! `[0, 1]`; the final score is their weighted sum scaled to `[0, 100]`.

use leadflow_shared::{IcpCriteria, Lead, LeadStatus, NumericRange, ScoreBreakdown, ScoreWeights};

/// Number of buying signals at which signal strength saturates.
pub const SIGNAL_SATURATION: usize = 5;

/// Upper bound of a final score.
pub const MAX_SCORE: f64 = 100.0;

/// How well `value` falls inside `range`.
///
/// 1.0 inside the range. Outside, decays linearly with the distance to the
/// nearest bound and reaches 0 once that distance equals the bound itself
/// (at 0 below `min`, at `2 × max` above `max`). Absent values score 0.
pub fn range_match(value: Option<u64>, range: &NumericRange) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    if range.contains(value) {
        return 1.0;
    }

    let (distance, scale) = if value < range.min {
        (range.min - value, range.min)
    } else {
        (value - range.max, range.max)
    };
    if scale == 0 {
        return 0.0;
    }
    (1.0 - distance as f64 / scale as f64).clamp(0.0, 1.0)
}

/// Fraction of ICP technologies present on the lead, case-insensitive.
pub fn technology_match(lead: &Lead, icp: &IcpCriteria) -> f64 {
    if icp.technologies.is_empty() {
        return 0.0;
    }
    let owned: Vec<String> = lead.technologies.iter().map(|t| t.to_lowercase()).collect();
    let matched = icp
        .technologies
        .iter()
        .filter(|wanted| owned.contains(&wanted.to_lowercase()))
        .count();
    matched as f64 / icp.technologies.len() as f64
}

/// Signal count relative to [`SIGNAL_SATURATION`], capped at 1.0.
pub fn signal_strength(lead: &Lead) -> f64 {
    (lead.signals.len() as f64 / SIGNAL_SATURATION as f64).min(1.0)
}

/// All four normalized sub-scores for a lead.
pub fn breakdown(lead: &Lead, icp: &IcpCriteria) -> ScoreBreakdown {
    ScoreBreakdown {
        revenue_match: range_match(lead.revenue, &icp.revenue),
        employee_match: range_match(lead.employee_count, &icp.employee_count),
        technology_match: technology_match(lead, icp),
        signal_strength: signal_strength(lead),
    }
}

/// Combine a breakdown with weights into a score in `[0, 100]`.
pub fn weighted(parts: &ScoreBreakdown, weights: &ScoreWeights) -> f64 {
    let raw = MAX_SCORE
        * (weights.revenue_match * parts.revenue_match
            + weights.employee_match * parts.employee_match
            + weights.technology_match * parts.technology_match
            + weights.signal_strength * parts.signal_strength);
    if raw.is_finite() {
        raw.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}

/// Score a lead against an ICP.
pub fn score(lead: &Lead, weights: &ScoreWeights, icp: &IcpCriteria) -> f64 {
    weighted(&breakdown(lead, icp), weights)
}

/// Score a lead in place, recording the breakdown.
///
/// With a `min_score`, the lead is marked qualified or disqualified.
pub fn apply_score(lead: &mut Lead, weights: &ScoreWeights, icp: &IcpCriteria, min_score: Option<f64>) {
    let parts = breakdown(lead, icp);
    let value = weighted(&parts, weights);
    lead.score = Some(value);
    lead.score_breakdown = Some(parts);
    lead.status = match min_score {
        Some(threshold) if value < threshold => LeadStatus::Disqualified,
        _ => LeadStatus::Qualified,
    };
    tracing::debug!(lead = %lead.id, score = value, status = ?lead.status, "scored lead");
}

/// Order leads by descending score. Ties keep their input order.
///
/// Unscored leads sort last.
pub fn rank(mut leads: Vec<Lead>) -> Vec<Lead> {
    leads.sort_by(|a, b| {
        let a = a.score.unwrap_or(f64::NEG_INFINITY);
        let b = b.score.unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
    leads
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icp() -> IcpCriteria {
        IcpCriteria {
            industry: vec!["SaaS".into()],
            location: None,
            employee_count: NumericRange::new(100, 1000),
            revenue: NumericRange::new(20_000_000, 200_000_000),
            technologies: vec!["AWS".into(), "Salesforce".into(), "HubSpot".into()],
            signals: vec![],
        }
    }

    fn scenario_weights() -> ScoreWeights {
        ScoreWeights {
            revenue_match: 0.4,
            employee_match: 0.2,
            technology_match: 0.3,
            signal_strength: 0.1,
        }
    }

    fn lead_a() -> Lead {
        let mut lead = Lead::new("lead-a", "Acme", "Jane Doe");
        lead.revenue = Some(50_000_000);
        lead.employee_count = Some(300);
        lead.technologies = ["AWS", "Salesforce"].into_iter().map(String::from).collect();
        lead.signals = vec!["funding_round".into()];
        lead
    }

    fn lead_b() -> Lead {
        let mut lead = Lead::new("lead-b", "Globex", "Hank Scorpio");
        lead.revenue = Some(50_000_000);
        lead.employee_count = Some(300);
        lead.technologies = ["Oracle"].into_iter().map(String::from).collect();
        lead
    }

    #[test]
    fn scenario_lead_scores_82() {
        let parts = breakdown(&lead_a(), &icp());
        assert_eq!(parts.revenue_match, 1.0);
        assert_eq!(parts.employee_match, 1.0);
        assert!((parts.technology_match - 2.0 / 3.0).abs() < 1e-12);
        assert!((parts.signal_strength - 0.2).abs() < 1e-12);

        let value = score(&lead_a(), &scenario_weights(), &icp());
        assert!((value - 82.0).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn lead_without_tech_or_signals_ranks_second() {
        let weights = scenario_weights();
        let mut leads = vec![lead_b(), lead_a()];
        for lead in &mut leads {
            apply_score(lead, &weights, &icp(), None);
        }
        let ranked = rank(leads);
        assert_eq!(ranked[0].id, "lead-a");
        assert_eq!(ranked[1].id, "lead-b");
        assert!((ranked[1].score.unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn range_match_decays_to_zero() {
        let range = NumericRange::new(100, 1000);
        assert_eq!(range_match(Some(100), &range), 1.0);
        assert_eq!(range_match(Some(1000), &range), 1.0);
        assert!((range_match(Some(50), &range) - 0.5).abs() < 1e-12);
        assert_eq!(range_match(Some(0), &range), 0.0);
        assert!((range_match(Some(1500), &range) - 0.5).abs() < 1e-12);
        assert_eq!(range_match(Some(2000), &range), 0.0);
        assert_eq!(range_match(Some(50_000), &range), 0.0);
        assert_eq!(range_match(None, &range), 0.0);
    }

    #[test]
    fn zero_max_range_only_matches_zero() {
        let range = NumericRange::new(0, 0);
        assert_eq!(range_match(Some(0), &range), 1.0);
        assert_eq!(range_match(Some(1), &range), 0.0);
    }

    #[test]
    fn technology_match_ignores_case() {
        let mut lead = lead_a();
        lead.technologies = ["aws", "HUBSPOT"].into_iter().map(String::from).collect();
        assert!((technology_match(&lead, &icp()) - 2.0 / 3.0).abs() < 1e-12);

        let mut no_tech_icp = icp();
        no_tech_icp.technologies.clear();
        assert_eq!(technology_match(&lead, &no_tech_icp), 0.0);
    }

    #[test]
    fn signal_strength_saturates() {
        let mut lead = lead_a();
        lead.signals = (0..9).map(|i| format!("signal-{i}")).collect();
        assert_eq!(signal_strength(&lead), 1.0);
    }

    #[test]
    fn min_score_disqualifies_without_removing() {
        let mut lead = lead_b();
        apply_score(&mut lead, &scenario_weights(), &icp(), Some(70.0));
        assert_eq!(lead.status, LeadStatus::Disqualified);
        assert!(lead.score.is_some());

        let mut lead = lead_a();
        apply_score(&mut lead, &scenario_weights(), &icp(), Some(70.0));
        assert_eq!(lead.status, LeadStatus::Qualified);
    }

    #[test]
    fn rank_is_stable_for_ties() {
        let mut leads: Vec<Lead> = (0..4)
            .map(|i| {
                let mut lead = Lead::new(format!("lead-{i}"), "Co", "X");
                lead.score = Some(if i % 2 == 0 { 50.0 } else { 75.0 });
                lead
            })
            .collect();
        leads.push(Lead::new("unscored", "Co", "Y"));
        let ids: Vec<String> = rank(leads).into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["lead-1", "lead-3", "lead-0", "lead-2", "unscored"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_lead() -> impl Strategy<Value = Lead> {
            (
                proptest::option::of(0u64..2_000_000_000),
                proptest::option::of(0u64..100_000),
                proptest::collection::vec("[A-Za-z]{1,8}", 0..6),
                0usize..12,
            )
                .prop_map(|(revenue, employees, techs, signal_count)| {
                    let mut lead = Lead::new("lead-p", "Prop", "Tester");
                    lead.revenue = revenue;
                    lead.employee_count = employees;
                    lead.technologies = techs.into_iter().collect();
                    lead.signals = (0..signal_count).map(|i| format!("s{i}")).collect();
                    lead
                })
        }

        fn arb_weights() -> impl Strategy<Value = ScoreWeights> {
            (0.01f64..1.0, 0.01f64..1.0, 0.01f64..1.0, 0.01f64..1.0).prop_map(|(a, b, c, d)| {
                let sum = a + b + c + d;
                ScoreWeights {
                    revenue_match: a / sum,
                    employee_match: b / sum,
                    technology_match: c / sum,
                    signal_strength: d / sum,
                }
            })
        }

        proptest! {
            #[test]
            fn score_is_bounded(lead in arb_lead(), weights in arb_weights()) {
                let value = score(&lead, &weights, &icp());
                prop_assert!((0.0..=MAX_SCORE).contains(&value));
            }

            #[test]
            fn score_is_deterministic(lead in arb_lead(), weights in arb_weights()) {
                let first = score(&lead, &weights, &icp());
                let second = score(&lead.clone(), &weights, &icp());
                prop_assert_eq!(first.to_bits(), second.to_bits());
            }

            #[test]
            fn sub_scores_are_normalized(lead in arb_lead()) {
                let parts = breakdown(&lead, &icp());
                for part in [
                    parts.revenue_match,
                    parts.employee_match,
                    parts.technology_match,
                    parts.signal_strength,
                ] {
                    prop_assert!((0.0..=1.0).contains(&part));
                }
            }
        }
    }
}
