//! Pipeline stage descriptors and the generic stage runner.
//!
//! A pipeline is an ordered list of `{kind, system prompt, prompt template}`
//! descriptors. Each stage feeds its trimmed output into the next one; the first
//! stage receives the job's input text. The last stage must produce the checklist.

use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::generator::{ChatMessage, TextGenerator};

/// Placeholder substituted with the stage input inside a prompt template.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// What a stage's output means for the job record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Output is stored as the job summary.
    Summarize,
    /// Output is parsed into the job checklist.
    Checklist,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Summarize => "summarize",
            StageKind::Checklist => "checklist",
        }
    }
}

impl core::fmt::Display for StageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sequential unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub kind: StageKind,
    pub system_prompt: String,
    pub prompt_template: String,
}

impl PipelineStage {
    pub fn new(
        kind: StageKind,
        system_prompt: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            system_prompt: system_prompt.into(),
            prompt_template: prompt_template.into(),
        }
    }

    pub fn summarize() -> Self {
        Self::new(
            StageKind::Summarize,
            "You are a summarization assistant.",
            "Summarize the following document:\n\n{input}",
        )
    }

    pub fn checklist() -> Self {
        Self::new(
            StageKind::Checklist,
            "You are an assistant who converts summaries into action checklists.",
            "Create a clear checklist from this summary:\n\n{input}",
        )
    }

    /// Build the role-tagged messages for this stage.
    pub fn render(&self, input: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.prompt_template.replace(INPUT_PLACEHOLDER, input)),
        ]
    }

    /// Invoke the text capability for this stage and return the trimmed output.
    pub async fn run<G>(&self, generator: &G, input: &str) -> Result<String, AiError>
    where
        G: TextGenerator + ?Sized,
    {
        let output = generator.generate(&self.render(input)).await?;
        let output = output.trim();
        if output.is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(output.to_string())
    }
}

/// Validated, ordered list of stages.
///
/// One or more summarize stages followed by exactly one checklist stage. The
/// output of the last summarize stage is the job summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    summarize: Vec<PipelineStage>,
    checklist: PipelineStage,
}

impl Pipeline {
    /// Validate a stage list.
    ///
    /// Requires at least one `Summarize` stage, exactly one `Checklist` stage placed
    /// last, and every template to reference `{input}`.
    pub fn new(mut stages: Vec<PipelineStage>) -> Result<Self, AiError> {
        if let Some((i, _)) = stages
            .iter()
            .enumerate()
            .find(|(_, s)| !s.prompt_template.contains(INPUT_PLACEHOLDER))
        {
            return Err(AiError::InvalidStage(format!(
                "stage {} template does not reference {INPUT_PLACEHOLDER}",
                i + 1
            )));
        }

        let checklist = match stages.pop() {
            Some(stage) if stage.kind == StageKind::Checklist => stage,
            Some(_) => {
                return Err(AiError::InvalidStage(
                    "the last stage must produce the checklist".to_string(),
                ));
            }
            None => return Err(AiError::InvalidStage("pipeline has no stages".to_string())),
        };

        if stages.iter().any(|s| s.kind == StageKind::Checklist) {
            return Err(AiError::InvalidStage(
                "only the last stage may produce the checklist".to_string(),
            ));
        }

        if stages.is_empty() {
            return Err(AiError::InvalidStage(
                "at least one summarize stage must precede the checklist".to_string(),
            ));
        }

        Ok(Self {
            summarize: stages,
            checklist,
        })
    }

    /// Stages whose output becomes the summary, in execution order.
    pub fn summarize_stages(&self) -> &[PipelineStage] {
        &self.summarize
    }

    /// The final stage, parsed into the checklist.
    pub fn checklist_stage(&self) -> &PipelineStage {
        &self.checklist
    }

    /// All stages in execution order.
    pub fn stages(&self) -> impl Iterator<Item = &PipelineStage> {
        self.summarize.iter().chain(core::iter::once(&self.checklist))
    }
}

impl Default for Pipeline {
    /// Summarize, then derive the checklist from the summary.
    fn default() -> Self {
        Self {
            summarize: vec![PipelineStage::summarize()],
            checklist: PipelineStage::checklist(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::generator::ChatRole;

    struct Echo {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        reply: Result<String, AiError>,
    }

    #[async_trait::async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.reply.clone()
        }
    }

    fn echo(reply: Result<&str, AiError>) -> Echo {
        Echo {
            seen: Mutex::new(Vec::new()),
            reply: reply.map(str::to_string),
        }
    }

    #[test]
    fn render_tags_roles_and_substitutes_input() {
        let msgs = PipelineStage::summarize().render("Fast for 12 hours.");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, ChatRole::System);
        assert_eq!(msgs[1].role, ChatRole::User);
        assert!(msgs[1].content.ends_with("Fast for 12 hours."));
        assert!(!msgs[1].content.contains(INPUT_PLACEHOLDER));
    }

    #[tokio::test]
    async fn run_trims_generator_output() {
        let generator = echo(Ok("  A short summary.\n"));
        let out = PipelineStage::summarize().run(&generator, "doc").await.unwrap();
        assert_eq!(out, "A short summary.");
        assert_eq!(generator.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn whitespace_only_output_is_an_error() {
        let generator = echo(Ok(" \n "));
        let err = PipelineStage::checklist().run(&generator, "sum").await.unwrap_err();
        assert_eq!(err, AiError::EmptyResponse);
    }

    #[tokio::test]
    async fn generator_failure_is_propagated() {
        let generator = echo(Err(AiError::request("connection reset")));
        let err = PipelineStage::summarize().run(&generator, "doc").await.unwrap_err();
        assert_eq!(err, AiError::request("connection reset"));
    }

    #[test]
    fn default_pipeline_is_summarize_then_checklist() {
        let pipeline = Pipeline::default();
        let kinds: Vec<_> = pipeline.stages().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StageKind::Summarize, StageKind::Checklist]);
        assert_eq!(Pipeline::new(pipeline.stages().cloned().collect()), Ok(pipeline));
    }

    #[test]
    fn rejects_pipelines_without_trailing_checklist() {
        assert!(Pipeline::new(vec![]).is_err());
        assert!(Pipeline::new(vec![PipelineStage::summarize()]).is_err());
        assert!(
            Pipeline::new(vec![PipelineStage::checklist(), PipelineStage::summarize()]).is_err()
        );
        assert!(
            Pipeline::new(vec![PipelineStage::checklist(), PipelineStage::checklist()]).is_err()
        );
        assert!(Pipeline::new(vec![PipelineStage::checklist()]).is_err());
    }

    #[test]
    fn rejects_templates_without_placeholder() {
        let stage = PipelineStage::new(StageKind::Checklist, "sys", "no placeholder here");
        assert!(matches!(
            Pipeline::new(vec![PipelineStage::summarize(), stage]),
            Err(AiError::InvalidStage(msg)) if msg.contains("stage 2")
        ));
    }

    #[test]
    fn extra_summarize_stages_are_allowed() {
        let refine = PipelineStage::new(StageKind::Summarize, "Editor.", "Tighten:\n{input}");
        let pipeline = Pipeline::new(vec![
            PipelineStage::summarize(),
            refine,
            PipelineStage::checklist(),
        ])
        .unwrap();
        assert_eq!(pipeline.stages().count(), 3);
        assert_eq!(pipeline.summarize_stages().len(), 2);
    }
}
