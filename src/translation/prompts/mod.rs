/*!
 * Prompt construction and response parsing for batch requests.
 *
 * This module provides:
 * - System prompt templates naming the language pair
 * - The numbered-list request builder with read-only context sections
 * - A strict parser for numbered-list responses
 */

pub mod numbered;
pub mod templates;

// Re-export main types
pub use numbered::{decode_newlines, encode_newlines, parse_numbered_response, render_numbered};
pub use templates::{PromptTemplate, TranslationPromptBuilder};
