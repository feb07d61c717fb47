//! Prompt construction for grounded answers

use ragline_core::RetrievalContext;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant. You answer questions using \
the passages of context supplied with each question.";

/// Fixed system instruction plus a user template carrying context and question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    system: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    /// Wrap the context in `<context>` tags and the question in `<question>` tags.
    pub fn user_prompt(&self, context: &RetrievalContext, question: &str) -> String {
        format!(
            "Answer the question inside the <question> tags using the information \
inside the <context> tags.\n<context>\n{}\n</context>\n<question>\n{}\n</question>",
            context.render(),
            question
        )
    }
}
