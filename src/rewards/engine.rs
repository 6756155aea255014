use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::{
    errors::RewardError,
    models::{RewardEvent, SkillModel, REWARD_SOURCE_TYPE},
    repository::{RewardSink, SkillRepository, SubjectRepository, SubjectSkillMappingRepository},
    reward_factors,
};
use crate::{
    game_session::models::GameSessionModel,
    match_result::models::{MatchOutcome, MatchResultModel},
    summary::models::PlayerSummary,
};

/// Experience for one player before it is split across skills.
///
/// Correct and attempted questions both earn XP, scaled by the match result
/// and a team-size bonus with diminishing returns.
pub fn total_xp(summary: &PlayerSummary, outcome: MatchOutcome, total_players: i32) -> i64 {
    let base_xp = i64::from(summary.total_questions.max(0)) * reward_factors::XP_PER_QUESTION
        + i64::from(summary.correct_answers.max(0)) * reward_factors::XP_PER_CORRECT_ANSWER;

    let result_percent = if outcome.is_win() {
        reward_factors::WIN_PERCENT
    } else {
        reward_factors::LOSS_PERCENT
    };

    let extra_players = i64::from(total_players.max(1) - 1);
    let team_percent = 100
        + (reward_factors::TEAM_BONUS_PERCENT_PER_PLAYER * extra_players)
            .min(reward_factors::TEAM_BONUS_PERCENT_CAP);

    div_round_half_away(
        i128::from(base_xp) * i128::from(result_percent) * i128::from(team_percent),
        100 * 100,
    )
}

/// Splits `total` proportionally to `weights`. Non-positive weight sums fall
/// back to an equal split.
pub fn distribute(total: i64, weights: &[f64]) -> Vec<i64> {
    if weights.is_empty() {
        return Vec::new();
    }

    let units: Vec<i128> = weights.iter().map(|w| weight_units(*w)).collect();
    let unit_sum: i128 = units.iter().sum();
    if unit_sum <= 0 {
        let share = div_round_half_away(i128::from(total), weights.len() as i128);
        return vec![share; weights.len()];
    }

    units
        .iter()
        .map(|unit| div_round_half_away(i128::from(total) * unit, unit_sum))
        .collect()
}

fn weight_units(weight: f64) -> i128 {
    if weight.is_finite() {
        (weight * reward_factors::WEIGHT_SCALE).round() as i128
    } else {
        0
    }
}

/// `numerator / denominator` rounded half away from zero
fn div_round_half_away(numerator: i128, denominator: i128) -> i64 {
    let magnitude = (numerator.abs() * 2 + denominator.abs()) / (denominator.abs() * 2);
    let signed = if (numerator < 0) != (denominator < 0) {
        -magnitude
    } else {
        magnitude
    };
    signed.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Converts a linked match's player summaries into skill rewards for the
/// session's subject
pub struct SkillRewardEngine {
    subjects: Arc<dyn SubjectRepository + Send + Sync>,
    mappings: Arc<dyn SubjectSkillMappingRepository + Send + Sync>,
    skills: Arc<dyn SkillRepository + Send + Sync>,
    sink: Arc<dyn RewardSink + Send + Sync>,
}

impl SkillRewardEngine {
    pub fn new(
        subjects: Arc<dyn SubjectRepository + Send + Sync>,
        mappings: Arc<dyn SubjectSkillMappingRepository + Send + Sync>,
        skills: Arc<dyn SkillRepository + Send + Sync>,
        sink: Arc<dyn RewardSink + Send + Sync>,
    ) -> Self {
        Self {
            subjects,
            mappings,
            skills,
            sink,
        }
    }

    /// Emits one reward per (player, skill) pair and returns those the sink
    /// accepted. Missing preconditions make this a no-op; a failed submission
    /// is logged and the remaining pairs are still attempted.
    #[instrument(skip_all, fields(match_result_id = match_result.id))]
    pub async fn award(
        &self,
        match_result: &MatchResultModel,
        session: Option<&GameSessionModel>,
        summaries: &[PlayerSummary],
    ) -> Result<Vec<RewardEvent>, RewardError> {
        if summaries.is_empty() {
            debug!("No player summaries, skipping rewards");
            return Ok(Vec::new());
        }
        let Some(session) = session else {
            debug!("Match is not linked to a session, skipping rewards");
            return Ok(Vec::new());
        };
        let Some(subject_code) = session.subject_code() else {
            debug!(session_id = %session.session_id, "Session has no subject, skipping rewards");
            return Ok(Vec::new());
        };

        let Some(subject) = self.subjects.get_by_code(subject_code).await? else {
            info!(subject_code, "Subject not found, skipping rewards");
            return Ok(Vec::new());
        };

        let mappings = self.mappings.get_by_subject_ids(&[subject.id]).await?;
        if mappings.is_empty() {
            info!(subject_code, "Subject has no skill mappings, skipping rewards");
            return Ok(Vec::new());
        }

        let skills: HashMap<Uuid, SkillModel> = self
            .skills
            .get_all()
            .await?
            .into_iter()
            .filter(|skill| mappings.iter().any(|m| m.skill_id == skill.id))
            .map(|skill| (skill.id, skill))
            .collect();

        let weights: Vec<f64> = mappings.iter().map(|m| m.relevance_weight).collect();
        let reason = format!("Boss fight in {} ({})", subject.name, subject.code);
        let mut emitted = Vec::new();

        for summary in summaries {
            let Some(user_id) = summary.user_id else {
                continue;
            };

            let player_xp = total_xp(summary, match_result.result, match_result.total_players);
            if player_xp <= 0 {
                debug!(user_id = %user_id, "No XP earned");
                continue;
            }

            let shares = distribute(player_xp, &weights);
            for (mapping, points) in mappings.iter().zip(shares) {
                if points <= 0 {
                    continue;
                }
                if !skills.contains_key(&mapping.skill_id) {
                    debug!(skill_id = %mapping.skill_id, "Mapped skill not found, skipping");
                    continue;
                }

                let event = RewardEvent {
                    user_id,
                    skill_id: mapping.skill_id,
                    points,
                    source_type: REWARD_SOURCE_TYPE.to_string(),
                    source_id: match_result.id.to_string(),
                    reason: reason.clone(),
                    occurred_at: Utc::now(),
                };

                match self.sink.submit(&event).await {
                    Ok(()) => emitted.push(event),
                    Err(err) => {
                        error!(
                            error = %err,
                            user_id = %user_id,
                            skill_id = %mapping.skill_id,
                            points,
                            "Failed to submit skill reward"
                        );
                    }
                }
            }
        }

        info!(rewards = emitted.len(), subject_code, "Skill rewards emitted");
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::{
        models::{SubjectModel, SubjectSkillMappingModel},
        repository::{
            InMemoryRewardSink, InMemorySkillRepository, InMemorySubjectRepository,
            InMemorySubjectSkillMappingRepository,
        },
    };
    use async_trait::async_trait;
    use rstest::rstest;
    use std::sync::Mutex;

    fn summary(user_id: Option<Uuid>, total: i32, correct: i32) -> PlayerSummary {
        PlayerSummary {
            user_id,
            total_questions: total,
            correct_answers: correct,
            ..PlayerSummary::default()
        }
    }

    fn match_result(result: MatchOutcome, total_players: i32) -> MatchResultModel {
        MatchResultModel {
            id: 41,
            match_id: "m-41".to_string(),
            result,
            scene: "tower".to_string(),
            start_utc: Utc::now(),
            end_utc: Utc::now(),
            total_players,
            user_id: None,
            match_data_json: "{}".to_string(),
        }
    }

    fn session(subject: Option<&str>) -> GameSessionModel {
        let mut session = GameSessionModel::new(Utc::now());
        session.subject = subject.map(str::to_string);
        session
    }

    struct Catalogue {
        subject: SubjectModel,
        skills: Vec<SkillModel>,
    }

    fn catalogue(weights: &[f64]) -> Catalogue {
        Catalogue {
            subject: SubjectModel {
                id: Uuid::new_v4(),
                code: "MATH".to_string(),
                name: "Mathematics".to_string(),
            },
            skills: weights
                .iter()
                .enumerate()
                .map(|(i, _)| SkillModel {
                    id: Uuid::new_v4(),
                    name: format!("skill-{i}"),
                })
                .collect(),
        }
    }

    fn engine(
        catalogue: &Catalogue,
        weights: &[f64],
        sink: Arc<dyn RewardSink + Send + Sync>,
    ) -> SkillRewardEngine {
        let mappings = catalogue
            .skills
            .iter()
            .zip(weights)
            .map(|(skill, weight)| SubjectSkillMappingModel {
                subject_id: catalogue.subject.id,
                skill_id: skill.id,
                relevance_weight: *weight,
            })
            .collect();

        SkillRewardEngine::new(
            Arc::new(InMemorySubjectRepository::with_subjects(vec![
                catalogue.subject.clone(),
            ])),
            Arc::new(InMemorySubjectSkillMappingRepository::with_mappings(mappings)),
            Arc::new(InMemorySkillRepository::with_skills(catalogue.skills.clone())),
            sink,
        )
    }

    #[test]
    fn total_xp_matches_reference_example() {
        let xp = total_xp(&summary(None, 10, 8), MatchOutcome::Win, 4);
        assert_eq!(xp, 119);
    }

    #[rstest]
    #[case(MatchOutcome::Lose, 1, 10, 0, 45)] // 50 * 0.9
    #[case(MatchOutcome::Win, 1, 2, 2, 23)] // 20 * 1.15 = 23
    #[case(MatchOutcome::Win, 10, 10, 10, 138)] // team bonus capped at 1.2
    #[case(MatchOutcome::Lose, 0, 4, 2, 27)] // no bonus below two players
    #[case(MatchOutcome::Win, 3, 0, 0, 0)]
    #[case(MatchOutcome::Win, 1, 1, 1, 12)] // 11.5
    #[case(MatchOutcome::Win, 1, 10, 0, 58)] // 57.5
    #[case(MatchOutcome::Win, 1, 18, 0, 104)] // 103.5
    #[case(MatchOutcome::Lose, 1, 1, 0, 5)] // 4.5
    fn total_xp_applies_factors(
        #[case] outcome: MatchOutcome,
        #[case] players: i32,
        #[case] total: i32,
        #[case] correct: i32,
        #[case] expected: i64,
    ) {
        assert_eq!(total_xp(&summary(None, total, correct), outcome, players), expected);
    }

    #[rstest]
    #[case(119, vec![3.0, 1.0], vec![89, 30])]
    #[case(100, vec![0.0, 0.0], vec![50, 50])]
    #[case(10, vec![1.0, 1.0, 1.0], vec![3, 3, 3])]
    #[case(10, vec![], vec![])]
    #[case(119, vec![1.0, 1.0], vec![60, 60])] // 59.5 each
    #[case(5, vec![0.0, 0.0], vec![3, 3])] // 2.5 each
    #[case(10, vec![0.1, 0.2, 0.2], vec![2, 4, 4])]
    fn distributes_by_weight(#[case] total: i64, #[case] weights: Vec<f64>, #[case] expected: Vec<i64>) {
        assert_eq!(distribute(total, &weights), expected);
    }

    #[tokio::test]
    async fn emits_weighted_rewards_per_skill() {
        let weights = [3.0, 1.0];
        let catalogue = catalogue(&weights);
        let sink = Arc::new(InMemoryRewardSink::new());
        let engine = engine(&catalogue, &weights, sink.clone());
        let user = Uuid::new_v4();

        let emitted = engine
            .award(
                &match_result(MatchOutcome::Win, 4),
                Some(&session(Some("MATH"))),
                &[summary(Some(user), 10, 8)],
            )
            .await
            .unwrap();

        let points: Vec<i64> = emitted.iter().map(|e| e.points).collect();
        assert_eq!(points, vec![89, 30]);
        assert_eq!(sink.events(), emitted);
        assert!(emitted.iter().all(|e| e.source_type == "BossFight"
            && e.source_id == "41"
            && e.user_id == user
            && e.reason.contains("MATH")));
    }

    #[tokio::test]
    async fn skips_players_without_user_or_xp() {
        let weights = [1.0];
        let catalogue = catalogue(&weights);
        let sink = Arc::new(InMemoryRewardSink::new());
        let engine = engine(&catalogue, &weights, sink.clone());

        let emitted = engine
            .award(
                &match_result(MatchOutcome::Win, 1),
                Some(&session(Some("math"))),
                &[summary(None, 10, 10), summary(Some(Uuid::new_v4()), 0, 0)],
            )
            .await
            .unwrap();

        assert!(emitted.is_empty());
    }

    #[rstest]
    #[case(None)]
    #[case(Some("   "))]
    #[case(Some("HISTORY"))]
    #[tokio::test]
    async fn is_a_no_op_without_a_known_subject(#[case] subject: Option<&str>) {
        let weights = [1.0];
        let catalogue = catalogue(&weights);
        let sink = Arc::new(InMemoryRewardSink::new());
        let engine = engine(&catalogue, &weights, sink.clone());

        let emitted = engine
            .award(
                &match_result(MatchOutcome::Win, 1),
                Some(&session(subject)),
                &[summary(Some(Uuid::new_v4()), 5, 5)],
            )
            .await
            .unwrap();

        assert!(emitted.is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn is_a_no_op_without_session() {
        let weights = [1.0];
        let catalogue = catalogue(&weights);
        let engine = engine(&catalogue, &weights, Arc::new(InMemoryRewardSink::new()));

        let emitted = engine
            .award(
                &match_result(MatchOutcome::Win, 1),
                None,
                &[summary(Some(Uuid::new_v4()), 5, 5)],
            )
            .await
            .unwrap();

        assert!(emitted.is_empty());
    }

    #[tokio::test]
    async fn skips_mappings_whose_skill_is_missing() {
        let weights = [1.0, 1.0];
        let catalogue = catalogue(&weights);
        let mappings = catalogue
            .skills
            .iter()
            .map(|skill| SubjectSkillMappingModel {
                subject_id: catalogue.subject.id,
                skill_id: skill.id,
                relevance_weight: 1.0,
            })
            .collect();
        let engine = SkillRewardEngine::new(
            Arc::new(InMemorySubjectRepository::with_subjects(vec![
                catalogue.subject.clone(),
            ])),
            Arc::new(InMemorySubjectSkillMappingRepository::with_mappings(mappings)),
            Arc::new(InMemorySkillRepository::with_skills(vec![catalogue.skills[0].clone()])),
            Arc::new(InMemoryRewardSink::new()),
        );

        let emitted = engine
            .award(
                &match_result(MatchOutcome::Win, 1),
                Some(&session(Some("MATH"))),
                &[summary(Some(Uuid::new_v4()), 4, 4)],
            )
            .await
            .unwrap();

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].skill_id, catalogue.skills[0].id);
    }

    struct FlakySink {
        attempts: Mutex<u32>,
        accepted: Mutex<Vec<RewardEvent>>,
    }

    #[async_trait]
    impl RewardSink for FlakySink {
        async fn submit(&self, event: &RewardEvent) -> Result<(), RewardError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            if attempt == 1 {
                return Err(RewardError::Sink("xp service unavailable".to_string()));
            }
            self.accepted.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_failed_submission_does_not_stop_the_rest() {
        let weights = [1.0, 1.0];
        let catalogue = catalogue(&weights);
        let sink = Arc::new(FlakySink {
            attempts: Mutex::new(0),
            accepted: Mutex::new(Vec::new()),
        });
        let engine = engine(&catalogue, &weights, sink.clone());

        let emitted = engine
            .award(
                &match_result(MatchOutcome::Win, 1),
                Some(&session(Some("MATH"))),
                &[
                    summary(Some(Uuid::new_v4()), 4, 4),
                    summary(Some(Uuid::new_v4()), 4, 4),
                ],
            )
            .await
            .unwrap();

        assert_eq!(*sink.attempts.lock().unwrap(), 4);
        assert_eq!(emitted.len(), 3);
        assert_eq!(sink.accepted.lock().unwrap().len(), 3);
    }
}
