//! Quota allocation and configuration validation.
//!
//! A request's total is spread over its selected topics with [`allocate`].
//! Type counts, difficulty and cognitive-level percentages stay request-level;
//! [`plan_generation`] derives each topic's per-type share from its own quota
//! so the per-type totals across topics equal the request's type counts.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{GenerationConfig, Topic};
use crate::question_type::QuestionType;

/// Spread `total` over `n` topics in display order.
///
/// Every topic gets `total / n`; the first `total % n` topics get one more.
pub fn allocate(total: u32, n: usize) -> Result<Vec<u32>> {
    if n == 0 {
        return Err(Error::Validation(
            "at least one topic must be selected".to_string(),
        ));
    }
    let n32 = u32::try_from(n)
        .map_err(|_| Error::Validation(format!("too many topics selected: {}", n)))?;
    let base = total / n32;
    let extra = (total % n32) as usize;
    Ok((0..n)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect())
}

/// A soft configuration problem surfaced to the caller without failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

/// Check a configuration against the rules required before generation.
///
/// Hard violations return `Error::Validation` naming the broken rule.
/// Percentage maps that do not sum to 100 only produce warnings.
pub fn validate_config(config: &GenerationConfig, max_total: u32) -> Result<Vec<ConfigWarning>> {
    if config.total == 0 {
        return Err(Error::Validation(
            "total question count must be at least 1".to_string(),
        ));
    }
    if config.total > max_total {
        return Err(Error::Validation(format!(
            "total question count {} exceeds the maximum of {}",
            config.total, max_total
        )));
    }

    let sum = config.type_count_sum();
    if sum != config.total {
        return Err(Error::Validation(format!(
            "type counts sum to {}, expected {}",
            sum, config.total
        )));
    }

    let mut warnings = Vec::new();
    check_percentages(
        "difficulty",
        config
            .difficulty_distribution
            .iter()
            .map(|(k, v)| (k.as_str(), *v)),
        &mut warnings,
    )?;
    check_percentages(
        "cognitive",
        config
            .cognitive_distribution
            .iter()
            .map(|(k, v)| (k.as_str(), *v)),
        &mut warnings,
    )?;
    Ok(warnings)
}

fn check_percentages<'a>(
    field: &str,
    entries: impl Iterator<Item = (&'a str, u32)>,
    warnings: &mut Vec<ConfigWarning>,
) -> Result<()> {
    let mut sum = 0u32;
    for (name, pct) in entries {
        if pct > 100 {
            return Err(Error::Validation(format!(
                "{} percentage for {} is {}, must be at most 100",
                field, name, pct
            )));
        }
        sum += pct;
    }
    if sum != 100 {
        warnings.push(ConfigWarning {
            field: field.to_string(),
            message: format!("{} percentages sum to {}, expected 100", field, sum),
        });
    }
    Ok(())
}

/// One planned generator call: `count` questions of one type for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSlot {
    pub topic_id: Uuid,
    pub question_type: QuestionType,
    pub count: u32,
}

/// A topic's share of the request-level type counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicShare {
    pub topic_id: Uuid,
    pub quota: u32,
    pub type_counts: BTreeMap<QuestionType, u32>,
}

/// Per-topic, per-type breakdown of a configured request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationPlan {
    pub shares: Vec<TopicShare>,
}

impl GenerationPlan {
    /// Non-empty slots in topic order, then type order.
    pub fn slots(&self) -> Vec<GenerationSlot> {
        self.shares
            .iter()
            .flat_map(|share| {
                share
                    .type_counts
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(move |(qtype, count)| GenerationSlot {
                        topic_id: share.topic_id,
                        question_type: *qtype,
                        count: *count,
                    })
            })
            .collect()
    }

    /// Total questions planned.
    pub fn total(&self) -> u32 {
        self.shares.iter().map(|s| s.quota).sum()
    }

    /// Planned questions per type across all topics.
    pub fn type_totals(&self) -> BTreeMap<QuestionType, u32> {
        let mut totals = BTreeMap::new();
        for share in &self.shares {
            for (qtype, count) in &share.type_counts {
                *totals.entry(*qtype).or_insert(0) += count;
            }
        }
        totals
    }
}

/// Split the request-level type counts across selected topics.
///
/// Topics are visited in the given order. Each topic's quota is apportioned
/// over the type counts still remaining, largest remainder first (ties go to
/// the earlier type), so the last topic receives exactly what is left.
pub fn plan_generation(topics: &[Topic], config: &GenerationConfig) -> Result<GenerationPlan> {
    let selected: Vec<&Topic> = topics.iter().filter(|t| t.selected).collect();
    if selected.is_empty() {
        return Err(Error::Validation(
            "at least one topic must be selected".to_string(),
        ));
    }
    let quota_sum: u32 = selected.iter().map(|t| t.quota).sum();
    if quota_sum != config.total {
        return Err(Error::Validation(format!(
            "topic quotas sum to {}, expected {}",
            quota_sum, config.total
        )));
    }
    let type_sum = config.type_count_sum();
    if type_sum != config.total {
        return Err(Error::Validation(format!(
            "type counts sum to {}, expected {}",
            type_sum, config.total
        )));
    }

    let mut remaining: BTreeMap<QuestionType, u32> = config
        .type_counts
        .iter()
        .filter(|(_, c)| **c > 0)
        .map(|(t, c)| (*t, *c))
        .collect();
    let mut remaining_total = config.total;
    let mut plan = GenerationPlan::default();

    for topic in selected {
        let quota = topic.quota;
        let mut type_counts = BTreeMap::new();
        if quota > 0 && remaining_total > 0 {
            let mut parts: Vec<(QuestionType, u32, u64)> = remaining
                .iter()
                .map(|(qtype, left)| {
                    let numerator = u64::from(quota) * u64::from(*left);
                    let floor = (numerator / u64::from(remaining_total)) as u32;
                    let rem = numerator % u64::from(remaining_total);
                    (*qtype, floor, rem)
                })
                .collect();

            let assigned: u32 = parts.iter().map(|(_, f, _)| f).sum();
            let mut deficit = quota.saturating_sub(assigned);
            let mut order: Vec<usize> = (0..parts.len()).collect();
            order.sort_by(|a, b| parts[*b].2.cmp(&parts[*a].2).then(a.cmp(b)));
            for idx in order {
                if deficit == 0 {
                    break;
                }
                if parts[idx].2 > 0 {
                    parts[idx].1 += 1;
                    deficit -= 1;
                }
            }

            for (qtype, count, _) in parts {
                if count == 0 {
                    continue;
                }
                type_counts.insert(qtype, count);
                if let Some(left) = remaining.get_mut(&qtype) {
                    *left -= count;
                }
            }
            remaining_total -= quota;
            remaining.retain(|_, left| *left > 0);
        }
        plan.shares.push(TopicShare {
            topic_id: topic.id,
            quota,
            type_counts,
        });
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CognitiveLevel, Difficulty};

    fn config(total: u32, types: &[(QuestionType, u32)]) -> GenerationConfig {
        GenerationConfig::new(total, types.iter().cloned().collect())
    }

    fn topic(quota: u32, selected: bool) -> Topic {
        Topic {
            id: Uuid::new_v4(),
            request_id: Uuid::nil(),
            title: format!("Topic {}", quota),
            description: String::new(),
            content_excerpt: String::new(),
            learning_objectives: vec![],
            level: 1,
            sort_order: 0,
            selected,
            quota,
        }
    }

    #[test]
    fn test_allocate_ten_over_three() {
        assert_eq!(allocate(10, 3).unwrap(), vec![4, 3, 3]);
    }

    #[test]
    fn test_allocate_zero_topics_is_error() {
        assert!(matches!(allocate(10, 0), Err(Error::Validation(_))));
    }

    #[test]
    fn test_allocate_conserves_total() {
        for total in 0..60u32 {
            for n in 1..12usize {
                let quotas = allocate(total, n).unwrap();
                assert_eq!(quotas.len(), n);
                assert_eq!(quotas.iter().sum::<u32>(), total);
                let max = *quotas.iter().max().unwrap();
                let min = *quotas.iter().min().unwrap();
                assert!(max - min <= 1);
                // Extra units go to the earliest topics.
                assert!(quotas.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }

    #[test]
    fn test_validate_type_sum_mismatch() {
        let cfg = config(
            10,
            &[(QuestionType::MultipleChoice, 5), (QuestionType::TrueFalse, 3)],
        );
        let err = validate_config(&cfg, 500).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: type counts sum to 8, expected 10"
        );
    }

    #[test]
    fn test_validate_total_bounds() {
        let cfg = config(0, &[]);
        assert!(validate_config(&cfg, 500).is_err());
        let cfg = config(600, &[(QuestionType::Essay, 600)]);
        assert!(validate_config(&cfg, 500)
            .unwrap_err()
            .to_string()
            .contains("exceeds the maximum of 500"));
    }

    #[test]
    fn test_validate_percentages_soft_and_hard() {
        let mut dist = BTreeMap::new();
        dist.insert(Difficulty::Easy, 50);
        dist.insert(Difficulty::Hard, 30);
        let cfg = config(4, &[(QuestionType::TrueFalse, 4)]).with_difficulty(dist);
        let warnings = validate_config(&cfg, 500).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "difficulty");
        assert!(warnings[0].message.contains("sum to 80"));

        let mut bad = BTreeMap::new();
        bad.insert(CognitiveLevel::Apply, 120);
        let cfg = config(4, &[(QuestionType::TrueFalse, 4)]).with_cognitive(bad);
        let err = validate_config(&cfg, 500).unwrap_err();
        assert!(err.to_string().contains("apply is 120"));
    }

    #[test]
    fn test_validate_defaults_have_no_warnings() {
        let cfg = config(4, &[(QuestionType::TrueFalse, 4)]);
        assert!(validate_config(&cfg, 500).unwrap().is_empty());
    }

    #[test]
    fn test_plan_generation_conserves_types_and_quotas() {
        let topics = vec![topic(4, true), topic(0, false), topic(3, true), topic(3, true)];
        let cfg = config(
            10,
            &[
                (QuestionType::MultipleChoice, 5),
                (QuestionType::TrueFalse, 3),
                (QuestionType::Essay, 2),
            ],
        );
        let plan = plan_generation(&topics, &cfg).unwrap();
        assert_eq!(plan.shares.len(), 3);
        assert_eq!(plan.total(), 10);
        assert_eq!(plan.type_totals(), cfg.type_counts);
        for share in &plan.shares {
            assert_eq!(share.type_counts.values().sum::<u32>(), share.quota);
        }
        // First topic: 4 of 10 → mc 2, tf 1.2, essay 0.8 → mc 2, essay 1, tf 1.
        let first = &plan.shares[0].type_counts;
        assert_eq!(first[&QuestionType::MultipleChoice], 2);
        assert_eq!(first[&QuestionType::TrueFalse], 1);
        assert_eq!(first[&QuestionType::Essay], 1);
    }

    #[test]
    fn test_plan_generation_many_shapes() {
        for n in 1..8usize {
            for total in [1u32, 7, 10, 23, 50] {
                let quotas = allocate(total, n).unwrap();
                let topics: Vec<Topic> = quotas.iter().map(|q| topic(*q, true)).collect();
                let cfg = config(
                    total,
                    &[
                        (QuestionType::MultipleChoice, total / 2),
                        (QuestionType::ShortAnswer, total - total / 2),
                    ],
                );
                let plan = plan_generation(&topics, &cfg).unwrap();
                let mut expected = cfg.type_counts.clone();
                expected.retain(|_, c| *c > 0);
                assert_eq!(plan.type_totals(), expected);
                let slot_sum: u32 = plan.slots().iter().map(|s| s.count).sum();
                assert_eq!(slot_sum, total);
            }
        }
    }

    #[test]
    fn test_plan_generation_rejects_quota_mismatch() {
        let topics = vec![topic(3, true)];
        let cfg = config(4, &[(QuestionType::TrueFalse, 4)]);
        let err = plan_generation(&topics, &cfg).unwrap_err();
        assert!(err.to_string().contains("topic quotas sum to 3, expected 4"));
    }
}
