pub mod catalog;

use crate::logic::SimulationPlan;
use catalog::catalog_scenarios;

// Logic test scenario
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

/// Named entry in the scenario catalog.
#[derive(Debug, Clone)]
pub struct SimulationScenario {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    plan: SimulationPlan,
}

impl SimulationScenario {
    #[must_use]
    pub const fn new(
        key: &'static str,
        name: &'static str,
        description: &'static str,
        plan: SimulationPlan,
    ) -> Self {
        Self {
            key,
            name,
            description,
            plan,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.description
    }

    #[must_use]
    pub fn as_logic_scenario(&self) -> TestScenario {
        TestScenario::simulation(self.name, self.plan.clone())
    }
}

/// Look up a scenario by key, case-insensitively.
#[must_use]
pub fn get_scenario(key: &str) -> Option<SimulationScenario> {
    catalog_scenarios()
        .into_iter()
        .find(|scenario| scenario.key().eq_ignore_ascii_case(key.trim()))
}

/// Every scenario key with its description, in catalog order.
#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog_scenarios()
        .iter()
        .map(|scenario| (scenario.key(), scenario.description()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_and_resolvable() {
        let listed = list_scenarios();
        assert!(listed.iter().any(|(key, _)| *key == "smoke"));
        for (key, _) in &listed {
            assert_eq!(listed.iter().filter(|(k, _)| k == key).count(), 1);
            assert!(get_scenario(&key.to_uppercase()).is_some());
        }
        assert!(get_scenario("no-such-scenario").is_none());
    }

    #[test]
    fn logic_scenarios_carry_expectations() {
        let scenario = get_scenario("smoke").unwrap().as_logic_scenario();
        assert_eq!(scenario.name, "Smoke Run");
        assert!(!scenario.plan.expectations.is_empty());
    }
}
