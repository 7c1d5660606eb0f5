use conductor_core::{
    AgentClass, ConductorError, ConductorResult, Task, TaskCategory, TaskPriority, TaskSpec,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Context budgets and thresholds consulted by the routing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Context budget of the planner class, in tokens.
    #[serde(default = "default_planner_budget")]
    pub planner_context_budget: u32,
    /// Context budget of the builder class, in tokens.
    #[serde(default = "default_builder_budget")]
    pub builder_context_budget: u32,
    /// Fraction of a budget a task may occupy before it is routed up.
    #[serde(default = "default_budget_headroom")]
    pub budget_headroom: f64,
}

fn default_planner_budget() -> u32 {
    200_000
}
fn default_builder_budget() -> u32 {
    64_000
}
fn default_budget_headroom() -> f64 {
    0.8
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            planner_context_budget: default_planner_budget(),
            builder_context_budget: default_builder_budget(),
            budget_headroom: default_budget_headroom(),
        }
    }
}

impl RouterConfig {
    fn over_budget(&self, estimated: u32, budget: u32) -> bool {
        f64::from(estimated) > self.budget_headroom * f64::from(budget)
    }
}

/// Decides which agent class a task requires, and whether it runs hybrid.
pub struct Router {
    config: RouterConfig,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Apply the ordered rule table to a task spec. First match wins:
    ///
    /// 1. urgent priority and the planner supports the category → planner
    /// 2. review / analysis / documentation → planner
    /// 3. testing / optimization → builder
    /// 4. estimated footprint over the builder's budget headroom → planner
    /// 5. otherwise → builder (cheaper default)
    pub fn decide_class(&self, spec: &TaskSpec) -> ConductorResult<AgentClass> {
        if spec.priority.is_urgent() && AgentClass::Planner.supports(spec.category) {
            return Ok(AgentClass::Planner);
        }

        match spec.category {
            TaskCategory::Review | TaskCategory::Analysis | TaskCategory::Documentation => {
                return Ok(AgentClass::Planner)
            }
            TaskCategory::Testing | TaskCategory::Optimization => return Ok(AgentClass::Builder),
            TaskCategory::CodeGeneration => {}
        }

        if let Some(estimated) = spec.estimated_tokens {
            if self
                .config
                .over_budget(estimated, self.config.builder_context_budget)
            {
                if self
                    .config
                    .over_budget(estimated, self.config.planner_context_budget)
                {
                    return Err(ConductorError::ResourceExhaustion(format!(
                        "task {}: estimated {estimated} tokens exceeds every class budget",
                        spec.id
                    )));
                }
                return Ok(AgentClass::Planner);
            }
        }

        Ok(AgentClass::Builder)
    }

    /// Whether the task should fan out to both classes concurrently.
    pub fn should_use_hybrid(&self, spec: &TaskSpec) -> bool {
        spec.priority == TaskPriority::Critical
            || (spec.category == TaskCategory::Review && spec.multi_perspective)
    }

    /// Route one spec into a schedulable task.
    pub fn route(&self, spec: TaskSpec) -> ConductorResult<Task> {
        let agent_class = self.decide_class(&spec)?;
        let hybrid = self.should_use_hybrid(&spec);
        debug!(
            task_id = %spec.id,
            category = %spec.category,
            class = %agent_class,
            hybrid,
            "Routed task"
        );
        Ok(Task::from_spec(spec, agent_class, hybrid))
    }

    /// Route a whole task set, failing on the first unroutable spec.
    pub fn route_all(&self, specs: Vec<TaskSpec>) -> ConductorResult<Vec<Task>> {
        specs.into_iter().map(|spec| self.route(spec)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn spec(category: TaskCategory, priority: TaskPriority) -> TaskSpec {
        TaskSpec {
            id: "t1".into(),
            description: "some work".into(),
            dependencies: vec![],
            priority,
            category,
            multi_perspective: false,
            estimated_tokens: None,
        }
    }

    #[test]
    fn test_rule1_urgent_supported_goes_to_planner() {
        let router = Router::default();
        // code generation is normally the builder's default, but critical
        // priority pulls it up
        let class = router
            .decide_class(&spec(TaskCategory::CodeGeneration, TaskPriority::Critical))
            .unwrap();
        assert_eq!(class, AgentClass::Planner);
    }

    #[test]
    fn test_rule2_review_analysis_docs_go_to_planner() {
        let router = Router::default();
        for category in [
            TaskCategory::Review,
            TaskCategory::Analysis,
            TaskCategory::Documentation,
        ] {
            let class = router
                .decide_class(&spec(category, TaskPriority::Normal))
                .unwrap();
            assert_eq!(class, AgentClass::Planner, "category {category}");
        }
    }

    #[test]
    fn test_rule3_testing_optimization_go_to_builder() {
        let router = Router::default();
        for category in [TaskCategory::Testing, TaskCategory::Optimization] {
            let class = router
                .decide_class(&spec(category, TaskPriority::Normal))
                .unwrap();
            assert_eq!(class, AgentClass::Builder, "category {category}");
        }
    }

    #[test]
    fn test_rule3_wins_over_rule4_for_testing() {
        // ordered table: a huge testing task still goes to the builder
        let router = Router::default();
        let mut s = spec(TaskCategory::Testing, TaskPriority::Normal);
        s.estimated_tokens = Some(60_000);
        assert_eq!(router.decide_class(&s).unwrap(), AgentClass::Builder);
    }

    #[test]
    fn test_rule4_large_footprint_goes_to_planner() {
        let router = Router::default();
        let mut s = spec(TaskCategory::CodeGeneration, TaskPriority::Normal);
        // default builder budget 64k, headroom 0.8 → threshold 51_200
        s.estimated_tokens = Some(52_000);
        assert_eq!(router.decide_class(&s).unwrap(), AgentClass::Planner);

        s.estimated_tokens = Some(51_000);
        assert_eq!(router.decide_class(&s).unwrap(), AgentClass::Builder);
    }

    #[test]
    fn test_rule4_exceeding_every_budget_is_exhaustion() {
        let router = Router::default();
        let mut s = spec(TaskCategory::CodeGeneration, TaskPriority::Normal);
        s.estimated_tokens = Some(500_000);
        let err = router.decide_class(&s).unwrap_err();
        assert!(matches!(err, ConductorError::ResourceExhaustion(_)));
    }

    #[test]
    fn test_rule5_default_is_builder() {
        let router = Router::default();
        let class = router
            .decide_class(&spec(TaskCategory::CodeGeneration, TaskPriority::Normal))
            .unwrap();
        assert_eq!(class, AgentClass::Builder);
    }

    #[test]
    fn test_hybrid_on_critical() {
        let router = Router::default();
        assert!(router.should_use_hybrid(&spec(
            TaskCategory::CodeGeneration,
            TaskPriority::Critical
        )));
        assert!(!router.should_use_hybrid(&spec(
            TaskCategory::CodeGeneration,
            TaskPriority::High
        )));
    }

    #[test]
    fn test_hybrid_on_multi_perspective_review() {
        let router = Router::default();
        let mut s = spec(TaskCategory::Review, TaskPriority::Normal);
        assert!(!router.should_use_hybrid(&s));
        s.multi_perspective = true;
        assert!(router.should_use_hybrid(&s));

        // the flag only applies to reviews
        let mut s = spec(TaskCategory::Analysis, TaskPriority::Normal);
        s.multi_perspective = true;
        assert!(!router.should_use_hybrid(&s));
    }

    #[test]
    fn test_route_populates_class_and_hybrid() {
        let router = Router::default();
        let mut s = spec(TaskCategory::Review, TaskPriority::Normal);
        s.multi_perspective = true;
        let task = router.route(s).unwrap();
        assert_eq!(task.agent_class, AgentClass::Planner);
        assert!(task.hybrid);
    }
}
