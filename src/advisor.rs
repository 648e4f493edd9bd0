use crate::common::types::{StepKind, StepStatus, Suggestion};
use crate::mission::registry::MissionRegistry;
use crate::step::step::Step;
use chrono::Utc;
use log::debug;

/// Fixed-rule advisory recommendations. Suggestions are appended to the
/// mission's log and never change step or mission status.
pub struct Advisor {
    registry: MissionRegistry,
}

impl Advisor {
    pub fn new(registry: MissionRegistry) -> Self {
        Advisor { registry }
    }

    pub async fn get_ai_strategy_recommendation(
        &self,
        mission_id: &str,
        step_id: &str,
    ) -> Option<Suggestion> {
        let suggestion = self
            .registry
            .mutate(mission_id, |mission| {
                let suggestion = Self::recommend(mission.step(step_id)?);
                mission.ai_suggestions.push(suggestion.clone());
                Some(suggestion)
            })
            .await
            .flatten()?;
        debug!(
            "Mission {}: suggestion for step {}: {} ({:.2})",
            mission_id, step_id, suggestion.recommendation, suggestion.confidence
        );
        Some(suggestion)
    }

    fn recommend(step: &Step) -> Suggestion {
        let (recommendation, confidence) = if step.status == StepStatus::Failed {
            (
                format!("Retry step {} with modified parameters", step.name),
                0.75,
            )
        } else if step.kind == StepKind::Coordinate {
            (
                "Tighten the coordination cadence between agents".to_string(),
                0.9,
            )
        } else {
            ("Continue as planned".to_string(), 0.85)
        };

        Suggestion {
            step_id: step.id.clone(),
            recommendation,
            confidence,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{MissionSpec, MissionStatus, StepSpec};

    async fn setup() -> (MissionRegistry, Advisor) {
        let registry = MissionRegistry::new();
        registry
            .create_mission(
                MissionSpec::new(
                    "Escort",
                    vec![
                        StepSpec::new("a", "Collect", StepKind::Collect),
                        StepSpec::new("b", "Coordinate", StepKind::Coordinate),
                    ],
                )
                .with_id("m"),
            )
            .await
            .unwrap();
        let advisor = Advisor::new(registry.clone());
        (registry, advisor)
    }

    #[tokio::test]
    async fn test_rule_table() {
        let (registry, advisor) = setup().await;

        let plain = advisor.get_ai_strategy_recommendation("m", "a").await.unwrap();
        assert_eq!(plain.confidence, 0.85);

        let coordinate = advisor.get_ai_strategy_recommendation("m", "b").await.unwrap();
        assert_eq!(coordinate.confidence, 0.9);

        registry
            .mutate("m", |mission| {
                mission.step_mut("a").unwrap().status = StepStatus::Failed;
            })
            .await;
        let failed = advisor.get_ai_strategy_recommendation("m", "a").await.unwrap();
        assert_eq!(failed.confidence, 0.75);
        assert!(failed.recommendation.starts_with("Retry"));
    }

    #[tokio::test]
    async fn test_suggestions_are_logged_without_side_effects() {
        let (registry, advisor) = setup().await;
        advisor.get_ai_strategy_recommendation("m", "a").await;
        advisor.get_ai_strategy_recommendation("m", "b").await;

        let mission = registry.get_mission("m").await.unwrap();
        assert_eq!(mission.ai_suggestions.len(), 2);
        assert_eq!(mission.ai_suggestions[1].step_id, "b");
        assert_eq!(mission.status, MissionStatus::Planning);
        assert!(mission.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn test_unknown_ids_yield_nothing() {
        let (registry, advisor) = setup().await;
        assert!(advisor.get_ai_strategy_recommendation("m", "zz").await.is_none());
        assert!(advisor.get_ai_strategy_recommendation("x", "a").await.is_none());
        assert!(registry.get_mission("m").await.unwrap().ai_suggestions.is_empty());
    }
}
