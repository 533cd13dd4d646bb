//! Seam to the HTML generator.
//!
//! The generator itself lives outside this crate. This module builds the
//! prompt it consumes from a [`DesignContext`] and decodes its reply once,
//! into a plain HTML string.

use serde::Deserialize;

use crate::context::DesignContext;
use crate::{Error, Result};

const INSTRUCTIONS: &str = "\
You are an expert front-end engineer.
Given the <head> HTML, the rendered <body> HTML (images already inlined as base64),
and the CSS that was in effect while the page rendered, produce a single standalone
HTML document that visually replicates the original page as closely as possible.

Requirements:
- Keep the <meta> tags and <title> from the original <head>.
- Inline the CSS inside a <style> tag in the final <head>.
- Preserve class names, IDs and structural tags.
- Do not introduce external references; the document must be self-contained.
- Start with <!DOCTYPE html> and keep the original <html lang> if present.

Return only the final HTML, without commentary or markdown fences.";

/// Build the generator prompt for `context`.
pub fn build_prompt(context: &DesignContext) -> String {
    format!(
        "{}\n\n<ORIGINAL_HEAD>\n{}\n</ORIGINAL_HEAD>\n\n<CURRENT_BODY>\n{}\n</CURRENT_BODY>\n\n<CRITICAL_CSS>\n{}\n</CRITICAL_CSS>\n",
        INSTRUCTIONS,
        context.head(),
        context.body(),
        context.css()
    )
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Reply shapes the generator providers are known to return
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GeneratorReply {
    /// Text-generation endpoints: `{"generated_text": "..."}`
    Generated { generated_text: String },
    /// Chat endpoints: `{"choices": [{"message": {"content": "..."}}]}`
    Chat { choices: Vec<ChatChoice> },
}

impl GeneratorReply {
    /// Decode a raw provider reply into HTML.
    ///
    /// JSON replies must match one of the known shapes. A non-JSON reply is
    /// taken as HTML only when it looks like a document.
    pub fn decode(raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        match serde_json::from_str::<GeneratorReply>(trimmed) {
            Ok(reply) => reply.into_html(),
            Err(_) if looks_like_document(trimmed) => Ok(trimmed.to_string()),
            Err(e) => Err(Error::Generator(format!("unrecognized reply ({})", e))),
        }
    }

    fn into_html(self) -> Result<String> {
        let html = match self {
            GeneratorReply::Generated { generated_text } => generated_text,
            GeneratorReply::Chat { choices } => choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| Error::Generator("chat reply has no choices".into()))?,
        };
        Ok(html.trim().to_string())
    }
}

fn looks_like_document(text: &str) -> bool {
    let head: String = text.chars().take(16).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}
