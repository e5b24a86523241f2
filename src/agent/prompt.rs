//! System prompts and template builders for agents.
//!
//! Prompts are the core instructions that define each agent's behavior.
//! Template builders format user messages with the question, feedback,
//! evidence digests, and user context.

use std::path::{Path, PathBuf};

/// System prompt for the query classifier.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You route questions for an investment research assistant.

Decide whether the question can be answered directly ("simple") or needs evidence from financial documents, news, a company relationship graph, or the web ("complex").

- Greetings, thanks, small talk, and questions about the assistant itself are simple.
- Questions about the current date or time are simple.
- Anything about a company, sector, market, stock, or investment decision is complex.

Return ONLY a JSON object:
{"type": "simple" | "complex", "reason": "one short sentence"}"#;

/// System prompt for the planner's decomposition step.
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are a research planner. Break the user's question into independent, information-bearing sub-questions that can each be answered by one search.

## Rules

- Produce between 1 and 5 sub-questions.
- Each sub-question must name the company or sector it is about; never use pronouns.
- Cover different angles: financial performance, recent news, related companies, market outlook.
- When feedback from a previous review is provided, focus on the gaps it names and do not repeat angles that were already covered.
- Write the sub-questions in the language of the user's question.

Return ONLY a JSON array of strings, no surrounding text."#;

/// System prompt for LLM tool selection.
pub const TOOL_SELECTOR_SYSTEM_PROMPT: &str = r#"Pick the single best knowledge source for a research sub-question.

- "document": financial statements, earnings, filings, ratios (ROE, PER, PBR).
- "news": recent events, announcements, press coverage.
- "graph": relationships between companies: affiliates, suppliers, partners, sector peers.
- "web": market outlook, analyst opinion, industry trends.

Return ONLY a JSON object: {"tool": "document" | "news" | "graph" | "web"}"#;

/// System prompt for sub-query rewriting.
pub const REWRITER_SYSTEM_PROMPT: &str = r"Rewrite a research sub-question into the phrasing that works best for the named knowledge source.

- document: keyword style with company name, metric, and period.
- news: company name plus the event or topic.
- graph: the entity name and the relationship of interest.
- web: a natural search-engine query.

Keep the language of the input. Return ONLY the rewritten text on one line, without quotes.";

/// System prompt for the critic.
pub const CRITIC_SYSTEM_PROMPT: &str = r#"You review evidence gathered for an investment question and decide whether it is sufficient to write a grounded answer.

Judge coverage, not perfection: the evidence is sufficient when the main aspects of the question are supported by at least one concrete source.

Return ONLY a JSON object:
{"sufficiency": true | false, "feedback": "what to search next, or why it is enough", "missing_areas": ["area", "..."]}"#;

/// System prompt for the report generator.
pub const REPORTER_SYSTEM_PROMPT: &str = r"You are a personal investment analyst. Write a report that answers the user's question from the supplied evidence and tailors the implications to the user's profile and holdings.

## Output Format (markdown)

## Summary
Two to four sentences answering the question directly.

## Evidence-Based Analysis
Findings grouped by theme, each tied to the evidence it comes from. Quote figures exactly.

## What This Means For You
Implications for the user's risk tolerance, goals, holdings, and preferred sectors.

## Caveats
Evidence gaps, uncertainty, and a reminder that this is not financial advice.

## Rules

- Do not invent figures or events that are not in the evidence.
- If evidence is thin, say so in Caveats rather than guessing.
- Write in the language of the user's question.";

/// System prompt for the simple-path responder.
pub const RESPONDER_SYSTEM_PROMPT: &str = r"You are a friendly investment research assistant. Answer greetings, small talk, and simple questions briefly and warmly, in the language of the user's message. If the user seems interested in investing, mention that you can analyze companies, sectors, and their portfolio.";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/insight-rs/prompts";

/// Filename for the classifier prompt template.
const CLASSIFIER_FILENAME: &str = "classifier.md";
/// Filename for the planner prompt template.
const PLANNER_FILENAME: &str = "planner.md";
/// Filename for the tool selector prompt template.
const TOOL_SELECTOR_FILENAME: &str = "tool_selector.md";
/// Filename for the rewriter prompt template.
const REWRITER_FILENAME: &str = "rewriter.md";
/// Filename for the critic prompt template.
const CRITIC_FILENAME: &str = "critic.md";
/// Filename for the reporter prompt template.
const REPORTER_FILENAME: &str = "reporter.md";
/// Filename for the responder prompt template.
const RESPONDER_FILENAME: &str = "responder.md";

const TEMPLATES: [(&str, &str); 7] = [
    (CLASSIFIER_FILENAME, CLASSIFIER_SYSTEM_PROMPT),
    (PLANNER_FILENAME, PLANNER_SYSTEM_PROMPT),
    (TOOL_SELECTOR_FILENAME, TOOL_SELECTOR_SYSTEM_PROMPT),
    (REWRITER_FILENAME, REWRITER_SYSTEM_PROMPT),
    (CRITIC_FILENAME, CRITIC_SYSTEM_PROMPT),
    (REPORTER_FILENAME, REPORTER_SYSTEM_PROMPT),
    (RESPONDER_FILENAME, RESPONDER_SYSTEM_PROMPT),
];

/// A set of system prompts for all agents.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Query classifier.
    pub classifier: String,
    /// Planner decomposition.
    pub planner: String,
    /// Planner tool selection.
    pub tool_selector: String,
    /// Planner sub-query rewriting.
    pub rewriter: String,
    /// Sufficiency critic.
    pub critic: String,
    /// Report generator.
    pub reporter: String,
    /// Simple-path responder.
    pub responder: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument
    /// 2. `INSIGHT_PROMPT_DIR` environment variable
    /// 3. `~/.config/insight-rs/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("INSIGHT_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|content| !content.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            classifier: load_file(CLASSIFIER_FILENAME, CLASSIFIER_SYSTEM_PROMPT),
            planner: load_file(PLANNER_FILENAME, PLANNER_SYSTEM_PROMPT),
            tool_selector: load_file(TOOL_SELECTOR_FILENAME, TOOL_SELECTOR_SYSTEM_PROMPT),
            rewriter: load_file(REWRITER_FILENAME, REWRITER_SYSTEM_PROMPT),
            critic: load_file(CRITIC_FILENAME, CRITIC_SYSTEM_PROMPT),
            reporter: load_file(REPORTER_FILENAME, REPORTER_SYSTEM_PROMPT),
            responder: load_file(RESPONDER_FILENAME, RESPONDER_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            classifier: CLASSIFIER_SYSTEM_PROMPT.to_string(),
            planner: PLANNER_SYSTEM_PROMPT.to_string(),
            tool_selector: TOOL_SELECTOR_SYSTEM_PROMPT.to_string(),
            rewriter: REWRITER_SYSTEM_PROMPT.to_string(),
            critic: CRITIC_SYSTEM_PROMPT.to_string(),
            reporter: REPORTER_SYSTEM_PROMPT.to_string(),
            responder: RESPONDER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten; use this for initial scaffolding only.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for (filename, content) in &TEMPLATES {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the classifier user message.
#[must_use]
pub fn build_classifier_prompt(query: &str) -> String {
    format!("<question>{query}</question>")
}

/// Builds the planner user message, including critic feedback when re-planning.
#[must_use]
pub fn build_planner_prompt(query: &str, feedback: Option<&str>, max_sub_queries: usize) -> String {
    let mut prompt = format!(
        "<question>{query}</question>\n\nProduce at most {max_sub_queries} sub-questions."
    );
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n\n<review_feedback>{feedback}</review_feedback>\n\
             Target the gaps named in the feedback."
        ));
    }
    prompt
}

/// Builds the tool selector user message.
#[must_use]
pub fn build_tool_selector_prompt(sub_query: &str) -> String {
    format!("<sub_question>{sub_query}</sub_question>")
}

/// Builds the rewriter user message.
#[must_use]
pub fn build_rewriter_prompt(sub_query: &str, tool: &str) -> String {
    format!("<tool>{tool}</tool>\n<sub_question>{sub_query}</sub_question>")
}

/// Builds the critic user message from the evidence digest.
#[must_use]
pub fn build_critic_prompt(query: &str, digest: &str) -> String {
    format!(
        "<question>{query}</question>\n\n<evidence>\n{digest}\n</evidence>\n\n\
         Is this evidence sufficient to answer the question?"
    )
}

/// Builds the report generator user message.
#[must_use]
pub fn build_report_prompt(query: &str, narrative: &str, user_context: &str) -> String {
    format!(
        "<question>{query}</question>\n\n\
         <evidence>\n{narrative}\n</evidence>\n\n\
         <user_context>\n{user_context}\n</user_context>\n\n\
         Write the report."
    )
}

/// Builds the simple responder user message.
#[must_use]
pub fn build_responder_prompt(query: &str, context_summary: &str, now: &str) -> String {
    format!(
        "<message>{query}</message>\n<user_context>{context_summary}</user_context>\n<current_time>{now}</current_time>"
    )
}
