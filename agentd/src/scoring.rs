//! Baseline response keyword-coverage scoring (spec §8 round-trip/idempotence
//! law: `scoreBaselineResponses(tasks, responses) -> normalizedScore`).
//!
//! A lightweight quality gate distinct from the Team Coordinator's
//! verify-before-complete review path: it checks, after the fact, whether a
//! batch of task responses mentions the keywords a baseline expects, without
//! involving an LLM.

use std::collections::HashMap;

/// A baseline task: an id plus the keywords a correct response must mention.
#[derive(Debug, Clone)]
pub struct BaselineTask {
    pub id: String,
    pub required_keywords: Vec<String>,
}

impl BaselineTask {
    pub fn new(id: impl Into<String>, required_keywords: Vec<String>) -> Self {
        Self { id: id.into(), required_keywords }
    }
}

/// Score a set of task responses against their required keywords.
///
/// `normalized_score` is the fraction of tasks whose response contains every
/// one of that task's required keywords (case-insensitive substring match),
/// in `[0.0, 1.0]`. A task with no recorded response never counts as
/// satisfied. An empty task list scores `1.0` (vacuously satisfied).
pub fn score_baseline_responses(tasks: &[BaselineTask], responses: &HashMap<String, String>) -> f64 {
    if tasks.is_empty() {
        return 1.0;
    }
    let satisfied = tasks.iter().filter(|task| task_satisfied(task, responses)).count();
    satisfied as f64 / tasks.len() as f64
}

fn task_satisfied(task: &BaselineTask, responses: &HashMap<String, String>) -> bool {
    let Some(response) = responses.get(&task.id) else {
        return false;
    };
    let lower = response.to_lowercase();
    task.required_keywords.iter().all(|kw| lower.contains(&kw.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalized_score_is_one_when_all_keywords_present() {
        let tasks = vec![
            BaselineTask::new("t1", vec!["alpha".to_string(), "beta".to_string()]),
            BaselineTask::new("t2", vec!["gamma".to_string()]),
        ];
        let responses = HashMap::from([
            ("t1".to_string(), "this covers alpha and also beta".to_string()),
            ("t2".to_string(), "mentions gamma here".to_string()),
        ]);
        assert_eq!(score_baseline_responses(&tasks, &responses), 1.0);
    }

    #[test]
    fn missing_keyword_lowers_the_score() {
        let tasks = vec![
            BaselineTask::new("t1", vec!["alpha".to_string()]),
            BaselineTask::new("t2", vec!["gamma".to_string()]),
        ];
        let responses = HashMap::from([
            ("t1".to_string(), "alpha present".to_string()),
            ("t2".to_string(), "no match here".to_string()),
        ]);
        assert_eq!(score_baseline_responses(&tasks, &responses), 0.5);
    }

    #[test]
    fn missing_response_does_not_satisfy_the_task() {
        let tasks = vec![BaselineTask::new("t1", vec!["alpha".to_string()])];
        assert_eq!(score_baseline_responses(&tasks, &HashMap::new()), 0.0);
    }

    #[test]
    fn empty_task_list_is_vacuously_one() {
        assert_eq!(score_baseline_responses(&[], &HashMap::new()), 1.0);
    }

    proptest! {
        /// For any set of tasks whose responses are built by concatenating
        /// exactly their own required keywords, the normalized score is 1.0
        /// regardless of keyword count, case, or task count.
        #[test]
        fn responses_containing_all_required_keywords_score_one(
            keyword_sets in proptest::collection::vec(
                proptest::collection::vec("[a-zA-Z]{2,8}", 1..4), 1..8
            )
        ) {
            let tasks: Vec<BaselineTask> = keyword_sets
                .iter()
                .enumerate()
                .map(|(i, kws)| BaselineTask::new(format!("task-{i}"), kws.clone()))
                .collect();
            let responses: HashMap<String, String> = tasks
                .iter()
                .map(|t| (t.id.clone(), format!("response covering: {}", t.required_keywords.join(" "))))
                .collect();
            prop_assert_eq!(score_baseline_responses(&tasks, &responses), 1.0);
        }
    }
}
