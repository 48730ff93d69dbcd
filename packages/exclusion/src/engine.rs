//! The exclusion engine: rule table, global ID set, priority scan.
//!
//! Rules and the global set are runtime-mutable behind a reader/writer
//! lock; evaluation (the hot path) takes the read side only. Matchers for
//! a rule's identifier list are compiled when the rule is stored and
//! invalidated when it changes, so no evaluation recompiles anything.

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::extractors::{default_extractors, IdentifierExtractor};
use crate::types::{ExclusionCheck, ExclusionRule, ExtractorType};

/// One compiled entry from a rule's identifier list.
#[derive(Debug, Clone)]
enum IdMatcher {
    Exact(String),
    Glob(Regex),
}

impl IdMatcher {
    /// Parse the comma-separated identifier list into matchers. Entries
    /// containing `*` become anchored globs; the rest match exactly.
    fn parse_list(list: &str) -> Vec<IdMatcher> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                if entry.contains('*') {
                    let pattern = format!("^{}$", regex::escape(entry).replace("\\*", ".*"));
                    Regex::new(&pattern).ok().map(IdMatcher::Glob)
                } else {
                    Some(IdMatcher::Exact(entry.to_string()))
                }
            })
            .collect()
    }

    fn matches(&self, id: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == id,
            Self::Glob(regex) => regex.is_match(id),
        }
    }
}

#[derive(Default)]
struct EngineState {
    rules: HashMap<Uuid, ExclusionRule>,
    matchers: HashMap<Uuid, Vec<IdMatcher>>,
    global_ids: HashSet<String>,
}

/// Engine counters for the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatistics {
    pub total_rules: usize,
    pub active_rules: usize,
    pub excluded_ids_count: usize,
    pub extractors_available: Vec<String>,
}

/// Rule-driven exclusion engine.
pub struct ExclusionEngine {
    state: RwLock<EngineState>,
    extractors: Vec<Arc<dyn IdentifierExtractor>>,
}

impl ExclusionEngine {
    /// Engine with the standard extractor set.
    pub fn new() -> Self {
        Self::with_extractors(default_extractors())
    }

    /// Engine with a custom extractor registry.
    pub fn with_extractors(extractors: Vec<Arc<dyn IdentifierExtractor>>) -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
            extractors,
        }
    }

    /// Should this message be held back from the broker?
    pub fn should_exclude(&self, content: &str, message_type: Option<&str>) -> bool {
        self.test_against(content, message_type).excluded
    }

    /// Evaluate rules in descending priority order and report which rule
    /// and identifier fired. Ties on priority break by ascending rule id.
    pub fn test_against(&self, content: &str, message_type: Option<&str>) -> ExclusionCheck {
        let state = self.state.read();

        let mut ordered: Vec<&ExclusionRule> = state
            .rules
            .values()
            .filter(|rule| rule.active && rule.applies_to(message_type))
            .collect();
        ordered.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        for rule in ordered {
            let Some(extractor) = self.extractor_for(rule.extractor_type, message_type) else {
                continue;
            };
            let ids = extractor.extract(content, &rule.extractor_config);
            if ids.is_empty() {
                continue;
            }

            let matchers = state.matchers.get(&rule.rule_id);
            for id in &ids {
                if let Some(matchers) = matchers {
                    if matchers.iter().any(|m| m.matches(id)) {
                        tracing::debug!(rule_id = %rule.rule_id, id = %id, "Exclusion rule matched");
                        return ExclusionCheck::matched(Some(rule.rule_id), id.clone());
                    }
                }
                if state.global_ids.contains(id) {
                    tracing::debug!(rule_id = %rule.rule_id, id = %id, "Globally excluded identifier");
                    return ExclusionCheck::matched(Some(rule.rule_id), id.clone());
                }
            }
        }

        ExclusionCheck::pass()
    }

    fn extractor_for(
        &self,
        extractor_type: ExtractorType,
        message_type: Option<&str>,
    ) -> Option<&Arc<dyn IdentifierExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.extractor_type() == extractor_type && e.supports(message_type))
    }

    // ========== Rule management ==========

    /// Store a rule, compiling its matchers. Replaces any rule with the
    /// same id.
    pub fn add_rule(&self, rule: ExclusionRule) -> Uuid {
        let mut state = self.state.write();
        let rule_id = rule.rule_id;
        state
            .matchers
            .insert(rule_id, IdMatcher::parse_list(&rule.excluded_identifiers));
        state.rules.insert(rule_id, rule);
        rule_id
    }

    /// Replace the rule with `rule_id`; returns false when absent.
    pub fn update_rule(&self, rule_id: Uuid, mut rule: ExclusionRule) -> bool {
        let mut state = self.state.write();
        if !state.rules.contains_key(&rule_id) {
            return false;
        }
        rule.rule_id = rule_id;
        state
            .matchers
            .insert(rule_id, IdMatcher::parse_list(&rule.excluded_identifiers));
        state.rules.insert(rule_id, rule);
        true
    }

    /// Remove a rule and its compiled matchers.
    pub fn remove_rule(&self, rule_id: Uuid) -> bool {
        let mut state = self.state.write();
        state.matchers.remove(&rule_id);
        state.rules.remove(&rule_id).is_some()
    }

    /// Fetch one rule.
    pub fn get_rule(&self, rule_id: Uuid) -> Option<ExclusionRule> {
        self.state.read().rules.get(&rule_id).cloned()
    }

    /// All rules, highest priority first.
    pub fn list_rules(&self) -> Vec<ExclusionRule> {
        let state = self.state.read();
        let mut rules: Vec<ExclusionRule> = state.rules.values().cloned().collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        rules
    }

    /// Drop every rule and global identifier.
    pub fn clear_all(&self) {
        let mut state = self.state.write();
        state.rules.clear();
        state.matchers.clear();
        state.global_ids.clear();
    }

    // ========== Global identifier set ==========

    /// Add an identifier that excludes regardless of rule.
    pub fn add_global_id(&self, id: impl Into<String>) {
        self.state.write().global_ids.insert(id.into());
    }

    /// Remove a global identifier; returns false when absent.
    pub fn remove_global_id(&self, id: &str) -> bool {
        self.state.write().global_ids.remove(id)
    }

    /// The global identifier set, sorted.
    pub fn list_global_ids(&self) -> Vec<String> {
        let state = self.state.read();
        let mut ids: Vec<String> = state.global_ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Engine counters.
    pub fn statistics(&self) -> EngineStatistics {
        let state = self.state.read();
        EngineStatistics {
            total_rules: state.rules.len(),
            active_rules: state.rules.values().filter(|r| r.active).count(),
            excluded_ids_count: state.global_ids.len(),
            extractors_available: self
                .extractors
                .iter()
                .map(|e| e.extractor_type().name().to_string())
                .collect(),
        }
    }
}

impl Default for ExclusionEngine {
    fn default() -> Self {
        Self::new()
    }
}
