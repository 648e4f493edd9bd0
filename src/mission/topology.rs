use crate::common::types::{StepId, StepSpec};
use std::collections::HashMap;
use std::fmt;

/// A dependency the sequential engine can never satisfy, or an ambiguous id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanIssue {
    DuplicateStepId(StepId),
    SelfDependency(StepId),
    UnknownDependency { step: StepId, dependency: StepId },
    ForwardDependency { step: StepId, dependency: StepId },
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanIssue::DuplicateStepId(id) => write!(f, "step id {} is used more than once", id),
            PlanIssue::SelfDependency(id) => write!(f, "step {} depends on itself", id),
            PlanIssue::UnknownDependency { step, dependency } => {
                write!(f, "step {} depends on unknown step {}", step, dependency)
            }
            PlanIssue::ForwardDependency { step, dependency } => write!(
                f,
                "step {} depends on {}, which runs after it",
                step, dependency
            ),
        }
    }
}

impl PlanIssue {
    /// Issues that make the plan ambiguous rather than merely lossy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlanIssue::DuplicateStepId(_))
    }
}

/// Checks step dependencies against execution order. Steps run strictly in
/// array order, so a dependency is only satisfiable if it points backwards.
pub fn analyze(steps: &[StepSpec]) -> Vec<PlanIssue> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut issues = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        if positions.insert(step.id.as_str(), index).is_some() {
            issues.push(PlanIssue::DuplicateStepId(step.id.clone()));
        }
    }

    for (index, step) in steps.iter().enumerate() {
        for dep in &step.dependencies {
            if dep == &step.id {
                issues.push(PlanIssue::SelfDependency(step.id.clone()));
                continue;
            }
            match positions.get(dep.as_str()) {
                None => issues.push(PlanIssue::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                }),
                Some(&position) if position > index => {
                    issues.push(PlanIssue::ForwardDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }

    issues
}
