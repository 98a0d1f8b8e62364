//! Prompt assembly from retrieved worked examples

use crate::corpus::CorpusExample;
use thiserror::Error;

/// Number of worked examples spliced into every prompt
pub const PROMPT_EXAMPLES: usize = 2;

#[derive(Error, Debug, PartialEq)]
pub enum PromptError {
    #[error("Prompt needs {required} examples, got {found}")]
    InsufficientExamples { required: usize, found: usize },
}

/// Renders the fixed generation template
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Build the prompt from the two nearest examples (closest first)
    ///
    /// Only the first two examples are used; fewer than two is an error.
    pub fn assemble(
        &self,
        examples: &[CorpusExample],
        question: &str,
        schema: &str,
    ) -> Result<String, PromptError> {
        let [first, second, ..] = examples else {
            return Err(PromptError::InsufficientExamples {
                required: PROMPT_EXAMPLES,
                found: examples.len(),
            });
        };

        Ok(format!(
            "
You are an expert in answering SQL-related questions.

You will be provided with two relevant examples. Each example includes:
- A SQL task description
- The corresponding SQL query
- An explanation of the SQL statement
- The schema or context used

Using these examples and your own SQL knowledge, generate an appropriate SQL query to answer the given question based on the provided schema.

***IMPORTANT:*** Output only the SQL query.
Do NOT include any explanations, markdown code fences, or other text.

Relevant Example 1:
{example1}

Relevant Example 2:
{example2}

User Question:
{question}

Schema:
{schema}
",
            example1 = render_example(first),
            example2 = render_example(second),
        ))
    }
}

fn render_example(example: &CorpusExample) -> String {
    format!(
        "Task: {}\nSQL: {}\nExplanation: {}\nContext: {}",
        example.task_text, example.sql_statement, example.explanation, example.schema_context
    )
}
