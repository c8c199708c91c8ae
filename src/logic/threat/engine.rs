//! Rule Engine
//!
//! Stateless evaluation of the rule table. Every rule runs on every
//! snapshot; the result is a set, so evaluation order never matters.

use std::collections::BTreeSet;

use super::rules::{Rule, RuleThresholds, RULES};
use super::types::ThreatLabel;
use crate::logic::features::FeatureSnapshot;

/// A rule that fired, with its confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch {
    pub label: ThreatLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    thresholds: RuleThresholds,
}

impl RuleEngine {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self::with_rules(RULES.to_vec(), thresholds)
    }

    /// Engine over an explicit rule list (any order)
    pub fn with_rules(rules: Vec<Rule>, thresholds: RuleThresholds) -> Self {
        Self { rules, thresholds }
    }

    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: RuleThresholds) {
        self.thresholds = thresholds;
    }

    /// Labels of every matching rule
    pub fn evaluate(&self, snapshot: &FeatureSnapshot) -> BTreeSet<ThreatLabel> {
        self.matches(snapshot).into_iter().map(|m| m.label).collect()
    }

    /// Matching rules with confidence, in table order
    pub fn matches(&self, snapshot: &FeatureSnapshot) -> Vec<RuleMatch> {
        self.rules
            .iter()
            .filter(|rule| (rule.matches)(snapshot, &self.thresholds))
            .map(|rule| RuleMatch { label: rule.label, confidence: rule.confidence })
            .collect()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(RuleThresholds::default())
    }
}
