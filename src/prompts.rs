//! Prompts used by the pipeline itself.
//!
//! The user's prompt drives the main pass; the only prompt the pipeline
//! owns is the one for the optional context pre-pass, plus the rules for
//! splicing the synthesised context in front of the user's prompt.

use serde_json::Value;

/// Number of leading pages scanned by the context pre-pass.
pub const MAX_CONTEXT_PAGES: usize = 3;

/// Prompt for the context pre-pass. The reply must be a JSON object.
pub const CONTEXT_PROMPT: &str = r#"You are analysing one page from the opening of a longer document. Your answer will be used as background for processing every other page of the same document.

Describe the document as a whole, as far as this page reveals it. Reply with a single JSON object and nothing else, using these keys:

{
  "document_type": "kind of document (invoice, contract, research paper, slide deck, form, ...)",
  "title": "document title if visible, otherwise null",
  "issuer": "organisation or author if visible, otherwise null",
  "date": "most prominent date on the page if any, otherwise null",
  "language": "primary language of the text",
  "layout": "short description of the page layout (columns, tables, forms, figures)",
  "key_entities": ["important names, identifiers or amounts"],
  "summary": "one or two sentences on what this page contains"
}

Do not wrap the JSON in code fences. Do not add commentary."#;

/// Build the context block from the pre-pass answers that succeeded.
///
/// Returns `None` when there is nothing to say, so the main pass uses the
/// user's prompt unchanged.
pub fn context_block(entries: &[(usize, Value)]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut block = format!(
        "Document Context Summary (from first {} page(s)):\n",
        entries.len()
    );
    for (page, data) in entries {
        block.push_str(&format!("- Page {page}: {data}\n"));
    }
    Some(block.trim().to_string())
}

/// Prefix the user's prompt with the document context, if there is any.
pub fn compose_prompt(context: Option<&str>, user_prompt: &str) -> String {
    match context {
        Some(ctx) if !ctx.trim().is_empty() => {
            format!("DOCUMENT CONTEXT:\n{ctx}\n\n---\n\nUSER TASK:\n{user_prompt}")
        }
        _ => user_prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_entries_no_block() {
        assert_eq!(context_block(&[]), None);
    }

    #[test]
    fn block_lists_each_page() {
        let block = context_block(&[
            (1, json!({"document_type": "invoice"})),
            (3, json!({"title": "Q3"})),
        ])
        .unwrap();
        assert!(block.starts_with("Document Context Summary (from first 2 page(s)):"));
        assert!(block.contains("- Page 1: {\"document_type\":\"invoice\"}"));
        assert!(block.ends_with("- Page 3: {\"title\":\"Q3\"}"));
    }

    #[test]
    fn compose_without_context_is_identity() {
        assert_eq!(compose_prompt(None, "Extract totals"), "Extract totals");
        assert_eq!(compose_prompt(Some("  "), "Extract totals"), "Extract totals");
    }

    #[test]
    fn compose_with_context() {
        let p = compose_prompt(Some("ctx"), "Extract totals");
        assert_eq!(p, "DOCUMENT CONTEXT:\nctx\n\n---\n\nUSER TASK:\nExtract totals");
    }

    #[test]
    fn context_prompt_asks_for_json() {
        assert!(CONTEXT_PROMPT.contains("JSON object"));
    }
}
