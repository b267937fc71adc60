use serde::{Deserialize, Serialize};

use crate::common::errors::{EngineError, EngineResult};

/// One stage within a workflow: the topic the engine dispatches to and the
/// topic the external worker answers on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub dispatch_topic: String,
    pub response_topic: String,
}

impl WorkflowStep {
    pub fn new(dispatch_topic: impl Into<String>, response_topic: impl Into<String>) -> Self {
        Self {
            dispatch_topic: dispatch_topic.into(),
            response_topic: response_topic.into(),
        }
    }
}

/// A named, ordered list of steps. Step N's response triggers dispatch to
/// step N+1; running past the last step completes the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    /// A workflow with zero steps is rejected here, at registration time,
    /// never at dispatch time.
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> EngineResult<Self> {
        let name = name.into();
        if steps.is_empty() {
            return Err(EngineError::InvalidWorkflow(name));
        }
        Ok(Self { name, steps })
    }

    pub fn step(&self, index: usize) -> Option<&WorkflowStep> {
        self.steps.get(index)
    }

    pub fn is_last_step(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_step_list_is_rejected() {
        let result = WorkflowDefinition::new("empty", Vec::new());
        assert!(matches!(result, Err(EngineError::InvalidWorkflow(name)) if name == "empty"));
    }

    #[test]
    fn last_step_detection() {
        let workflow = WorkflowDefinition::new(
            "general",
            vec![
                WorkflowStep::new("whisper", "whisper_response"),
                WorkflowStep::new("generic_translate", "generic_translate_response"),
            ],
        )
        .unwrap();

        assert!(!workflow.is_last_step(0));
        assert!(workflow.is_last_step(1));
        assert_eq!(workflow.step(2), None);
    }
}
