//! Prompt templates for question rewriting and answer generation
//!
//! The rewrite prompt asks the model to normalize city abbreviations and
//! restate the question as review-style text, returning a fixed
//! `City:` / `Rewritten:` two-line format that [`parse_rewrite_output`]
//! understands. The answer prompt grounds the model in retrieved reviews.

/// Rewrites a user question for semantic search and extracts the city
pub const REWRITE_TEMPLATE: &str = r#"You are a helpful assistant preparing a user query for semantic search on pizza reviews.

Your job has TWO steps:
1. Normalize city abbreviations to full names, using this list:
   - TLV → Tel Aviv
   - JLM → Jerusalem
   - Haifa → Haifa

   Only extract the city if it is **explicitly** mentioned. DO NOT guess or infer it.

2. Rewrite the user's question into a sentence that sounds like a review someone might write after visiting a pizza place.

Return your response **exactly** like this (no extra text):

City: <Tel Aviv / Jerusalem / Haifa / no city found>
Rewritten: <review-style sentence>

Here are examples:

---
Question: Where can I find good pizza in TLV?
City: Tel Aviv
Rewritten: I found amazing pizza in Tel Aviv.

Question: I want the crispiest pizza crust.
City: no city found
Rewritten: I'm looking for pizza places with the crispiest crust.

Question: Best pizza in JLM?
City: Jerusalem
Rewritten: I had the best pizza experience in Jerusalem.

Now process this:
Question: {question}
"#;

/// Generates the final answer from retrieved reviews
pub const ANSWER_TEMPLATE: &str = r#"You are a helpful assistant answering questions about pizza restaurants in Israeli cities,
based on real customer reviews.

Instructions:
- Add location to the answer.
- Use only relevant information from the reviews.
- Recommend 1–2 standout pizza places if appropriate.
- If no relevant reviews exist, say so clearly and politely.

Here are the reviews:
{reviews}

Question: {question}
"#;

/// Parsed fields of the rewrite model's output
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutput {
    /// Normalized city name, `None` when the model found none
    pub city: Option<String>,

    /// Review-style restatement of the question, may be empty if the model
    /// ignored the format
    pub rewritten: String,
}

/// Fill the rewrite template with the user's question
pub fn rewrite_prompt(question: &str) -> String {
    REWRITE_TEMPLATE.replace("{question}", question)
}

/// Fill the answer template with the formatted review block and question
pub fn answer_prompt(reviews: &str, question: &str) -> String {
    ANSWER_TEMPLATE
        .replace("{question}", question)
        .replace("{reviews}", reviews)
}

/// Parse the `City:` / `Rewritten:` lines out of the rewrite model's output
///
/// Prefixes match case-insensitively and values are trimmed. A city of
/// "no city found" (any case) or an empty value maps to `None`. Lines the
/// model adds around the expected two are ignored.
pub fn parse_rewrite_output(output: &str) -> RewriteOutput {
    let mut city = None;
    let mut rewritten = String::new();

    for line in output.lines() {
        let lower = line.to_lowercase();
        if lower.starts_with("city:") {
            let value = line.splitn(2, ':').nth(1).unwrap_or("").trim();
            city = if value.is_empty() || value.eq_ignore_ascii_case("no city found") {
                None
            } else {
                Some(value.to_string())
            };
        } else if lower.starts_with("rewritten:") {
            rewritten = line.splitn(2, ':').nth(1).unwrap_or("").trim().to_string();
        }
    }

    RewriteOutput { city, rewritten }
}
