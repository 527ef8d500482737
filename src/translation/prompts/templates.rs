/*!
 * Prompt templates for subtitle translation.
 *
 * The system prompt names the language pair and the placeholder rules; the
 * user message carries read-only context followed by the numbered lines.
 */

use crate::app_config::JobOptions;
use crate::language_utils;
use crate::providers::GatewayRequest;

use super::numbered::{encode_newlines, render_numbered};

/// System prompt template for subtitle translation.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// The default system prompt for subtitle translation.
    pub const SUBTITLE_TRANSLATOR: &'static str = r#"You are a professional subtitle translator.
Translate from {source_language} to {target_language}.

Rules:
- Keep the meaning natural and concise for subtitles.
- Preserve placeholders like [[TAG_0]] exactly and keep them next to the words they wrap.
- Keep <NL> tokens where the line should break.
- Lines under CONTEXT are for reference only; never translate or return them.
- Return only the numbered list between BEGIN and END."#;

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Create the default subtitle translator template.
    pub fn subtitle_translator() -> Self {
        Self::new(Self::SUBTITLE_TRANSLATOR)
    }

    /// Render the template with the given variables.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::subtitle_translator()
    }
}

/// Builder for one batch request.
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    source_language: String,
    target_language: String,
    model: String,
    template: PromptTemplate,
    context_before: Vec<String>,
    entries: Vec<String>,
    context_after: Vec<String>,
}

impl TranslationPromptBuilder {
    /// Create a builder for the job's language pair and model.
    pub fn new(options: &JobOptions) -> Self {
        let source_language = if language_utils::is_auto(&options.source_language) {
            "the source language (detect it automatically)".to_string()
        } else {
            language_utils::display_name(&options.source_language)
        };

        Self {
            source_language,
            target_language: language_utils::display_name(&options.target_language),
            model: options.provider.model().to_string(),
            template: PromptTemplate::default(),
            context_before: Vec::new(),
            entries: Vec::new(),
            context_after: Vec::new(),
        }
    }

    /// Set the masked cue texts to translate.
    pub fn with_entries(mut self, entries: Vec<String>) -> Self {
        self.entries = entries;
        self
    }

    /// Set preceding cues shown as context.
    pub fn with_context_before(mut self, context: Vec<String>) -> Self {
        self.context_before = context;
        self
    }

    /// Set following cues shown as context.
    pub fn with_context_after(mut self, context: Vec<String>) -> Self {
        self.context_after = context;
        self
    }

    /// Build the system prompt.
    pub fn build_system_prompt(&self) -> String {
        self.template.render(&self.source_language, &self.target_language)
    }

    /// Build the numbered list the provider must translate.
    pub fn build_text(&self) -> String {
        let count = self.entries.len();
        format!(
            "Translate the following {count} subtitles to {target}.\n\n\
             RULES:\n\
             - Return exactly {count} lines\n\
             - Each line MUST start with its number followed by a period: \"1. \", \"2. \", etc.\n\
             - Line breaks are encoded as <NL>; do not insert real line breaks inside items\n\
             - No markdown, no code blocks, no extra blank lines\n\
             - Do not merge or split items\n\n\
             {list}",
            count = count,
            target = self.target_language,
            list = render_numbered(&self.entries),
        )
    }

    /// Build the read-only context section (empty when there is none).
    pub fn build_context(&self) -> String {
        let mut sections = Vec::new();
        if !self.context_before.is_empty() {
            sections.push(context_section("CONTEXT BEFORE (do not translate):", &self.context_before));
        }
        if !self.context_after.is_empty() {
            sections.push(context_section("CONTEXT AFTER (do not translate):", &self.context_after));
        }
        sections.join("\n\n")
    }

    /// Build the complete gateway request.
    pub fn build(&self) -> GatewayRequest {
        GatewayRequest {
            system_prompt: self.build_system_prompt(),
            text: self.build_text(),
            context: self.build_context(),
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            model: self.model.clone(),
            expected_lines: self.entries.len(),
        }
    }
}

fn context_section(heading: &str, lines: &[String]) -> String {
    let mut out = heading.to_string();
    for line in lines {
        out.push_str("\n- ");
        out.push_str(&encode_newlines(line));
    }
    out
}
