//! Answer synthesis over routed search results.

use std::sync::Arc;

use leasekb_core::Metadata;
use leasekb_core::traits::Completer;
use leasekb_vector::SearchResult;
use serde::Serialize;
use serde_json::Value;

use crate::corpus::CorpusKind;
use crate::router::Router;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on \
internal knowledge base documents. Provide clear, accurate answers based on the provided context.";

pub const EMPTY_QUESTION: &str = "❌ Please provide a question.";
pub const NO_RESULTS: &str = "🤔 No relevant information found in internal knowledge base.";

/// Contract fields shown in a no-LLM answer, in display order.
const CONTRACT_FIELDS: &[&str] = &[
    "Document Name",
    "Parties",
    "Agreement Date",
    "Effective Date",
    "Expiration Date",
    "Governing Law",
    "Non-Compete",
    "Exclusivity",
];

/// Final answer plus what it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub corpus: Option<CorpusKind>,
    pub text: String,
    pub sources: Vec<SearchResult>,
    /// True when `text` came from the completer.
    pub synthesized: bool,
}

impl Answer {
    fn fixed(corpus: Option<CorpusKind>, text: impl Into<String>) -> Self {
        Self {
            corpus,
            text: text.into(),
            sources: Vec::new(),
            synthesized: false,
        }
    }
}

/// Non-empty `key: value` pairs of a source row, in column order.
fn present_fields(meta: &Metadata) -> impl Iterator<Item = (&str, String)> {
    meta.iter().filter_map(|(k, v)| {
        let v = match v {
            Value::String(s) => s.trim().to_string(),
            Value::Null => return None,
            other => other.to_string(),
        };
        (!v.is_empty()).then(|| (k.as_str(), v))
    })
}

fn meta_str<'a>(result: &'a SearchResult, key: &str) -> Option<&'a str> {
    result.metadata.as_ref()?.get(key)?.as_str()
}

fn context_block(corpus: CorpusKind, result: &SearchResult) -> String {
    match corpus {
        CorpusKind::Qa => format!(
            "Q: {}\nA: {}",
            meta_str(result, "question").unwrap_or_default(),
            meta_str(result, "answer").unwrap_or(&result.text)
        ),
        CorpusKind::Property | CorpusKind::MasterClauses => {
            let header = if corpus == CorpusKind::Property {
                "Property Data:"
            } else {
                "Contract Data:"
            };
            let lines: Vec<String> = match &result.metadata {
                Some(meta) => present_fields(meta).map(|(k, v)| format!("{k}: {v}")).collect(),
                None => vec![result.text.clone()],
            };
            format!("{header}\n{}", lines.join("\n"))
        }
    }
}

/// Context for the completer: one block per hit, best first, stopping
/// before `char_budget` would be exceeded. The first block is truncated
/// rather than dropped.
pub fn format_context(corpus: CorpusKind, results: &[SearchResult], char_budget: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for (i, result) in results.iter().enumerate() {
        let block = context_block(corpus, result);
        let sep = if i == 0 { 0 } else { 2 };
        let len = block.chars().count();
        if used + sep + len > char_budget {
            if i == 0 {
                out.extend(block.chars().take(char_budget));
            }
            break;
        }
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&block);
        used += sep + len;
    }
    out
}

/// Answer from the top hit alone, without a completer.
pub fn format_simple(corpus: CorpusKind, results: &[SearchResult]) -> String {
    let Some(top) = results.first() else {
        return "No results found.".to_string();
    };
    match corpus {
        CorpusKind::Qa => format!(
            "**Q:** {}\n**A:** {}",
            meta_str(top, "question").unwrap_or_default(),
            meta_str(top, "answer").unwrap_or(&top.text)
        ),
        CorpusKind::Property => {
            let mut out = String::from("**Property Information:**\n");
            match &top.metadata {
                Some(meta) => {
                    for (k, v) in present_fields(meta) {
                        out.push_str(&format!("- {k}: {v}\n"));
                    }
                }
                None => out.push_str(&format!("- {}\n", top.text)),
            }
            out
        }
        CorpusKind::MasterClauses => {
            let mut out = String::from("**Contract Information:**\n");
            if let Some(meta) = &top.metadata {
                for field in CONTRACT_FIELDS {
                    let value = meta.get(*field).and_then(Value::as_str).map(str::trim);
                    if let Some(v) = value.filter(|v| !v.is_empty()) {
                        out.push_str(&format!("- {field}: {v}\n"));
                    }
                }
            }
            out
        }
    }
}

/// Routes a question, retrieves context, and optionally asks the completer.
pub struct Answerer {
    router: Arc<Router>,
    completer: Option<Arc<dyn Completer>>,
    top_k: usize,
    char_budget: usize,
}

impl Answerer {
    pub fn new(router: Arc<Router>, top_k: usize, char_budget: usize) -> Self {
        Self {
            router,
            completer: None,
            top_k,
            char_budget,
        }
    }

    /// Enable synthesis. Without a completer answers use `format_simple`.
    pub fn with_completer(mut self, completer: Arc<dyn Completer>) -> Self {
        self.completer = Some(completer);
        self
    }

    pub async fn answer(&self, question: &str) -> Answer {
        let question = question.trim();
        if question.is_empty() {
            return Answer::fixed(None, EMPTY_QUESTION);
        }

        let routed = match self.router.search(question, self.top_k).await {
            Ok(routed) => routed,
            Err(e) => {
                tracing::warn!("⚠️ Retrieval failed: {e}");
                return Answer::fixed(None, format!("❌ Error processing question: {e}"));
            }
        };
        let corpus = routed.corpus;
        if routed.results.is_empty() {
            return Answer::fixed(Some(corpus), NO_RESULTS);
        }

        let Some(completer) = &self.completer else {
            return Answer {
                corpus: Some(corpus),
                text: format_simple(corpus, &routed.results),
                sources: routed.results,
                synthesized: false,
            };
        };

        let context = format_context(corpus, &routed.results, self.char_budget);
        let prompt = format!(
            "Context from knowledge base:\n{context}\n\nUser question: {question}\n\n\
             Provide a comprehensive answer based on the context above."
        );
        match completer.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => Answer {
                corpus: Some(corpus),
                text: text.trim().to_string(),
                sources: routed.results,
                synthesized: true,
            },
            Err(e) => {
                tracing::warn!("⚠️ {} completion failed: {e}", completer.name());
                Answer {
                    corpus: Some(corpus),
                    text: format!(
                        "⚠️ LLM failed: {e}\n\n{}",
                        format_simple(corpus, &routed.results)
                    ),
                    sources: routed.results,
                    synthesized: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KnowledgeRegistry;
    use crate::router::Classifier;
    use crate::source::Record;
    use crate::testing::{EchoCompleter, FailingEmbedder, KeywordEmbedder};
    use leasekb_vector::RecordId;
    use serde_json::json;

    fn hit(text: &str, meta: &[(&str, &str)]) -> SearchResult {
        SearchResult {
            position: 0,
            id: RecordId(0),
            text: text.into(),
            score: 0.9,
            metadata: Some(meta.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()),
        }
    }

    #[test]
    fn test_format_simple_qa() {
        let results = vec![hit("Net 30", &[("question", "Payment terms?"), ("answer", "Net 30")])];
        assert_eq!(
            format_simple(CorpusKind::Qa, &results),
            "**Q:** Payment terms?\n**A:** Net 30"
        );
        assert_eq!(format_simple(CorpusKind::Qa, &[]), "No results found.");
    }

    #[test]
    fn test_format_simple_property_skips_blank_fields() {
        let results = vec![hit(
            "Property: 1 Main St",
            &[("Property Address", "1 Main St"), ("Suite", " "), ("Floor", "3")],
        )];
        assert_eq!(
            format_simple(CorpusKind::Property, &results),
            "**Property Information:**\n- Property Address: 1 Main St\n- Floor: 3\n"
        );
    }

    #[test]
    fn test_format_simple_contract_uses_important_fields() {
        let results = vec![hit(
            "Document: Acme",
            &[
                ("Governing Law", "Delaware"),
                ("Document Name", "Acme Supply"),
                ("Insurance", "Required"),
            ],
        )];
        assert_eq!(
            format_simple(CorpusKind::MasterClauses, &results),
            "**Contract Information:**\n- Document Name: Acme Supply\n- Governing Law: Delaware\n"
        );
    }

    #[test]
    fn test_format_context_blocks() {
        let results = vec![
            hit("x", &[("Property Address", "1 Main St"), ("Floor", "3")]),
            hit("y", &[("Property Address", "9 Oak Rd")]),
        ];
        assert_eq!(
            format_context(CorpusKind::Property, &results, 1000),
            "Property Data:\nProperty Address: 1 Main St\nFloor: 3\n\n\
             Property Data:\nProperty Address: 9 Oak Rd"
        );
    }

    #[test]
    fn test_format_context_budget() {
        let results = vec![
            hit("a", &[("question", "q1"), ("answer", "a1")]),
            hit("b", &[("question", "q2"), ("answer", "a2")]),
        ];
        // Each block is "Q: qN\nA: aN" = 11 chars
        assert_eq!(format_context(CorpusKind::Qa, &results, 20), "Q: q1\nA: a1");
        assert_eq!(format_context(CorpusKind::Qa, &results, 24).matches("Q:").count(), 2);
        assert_eq!(format_context(CorpusKind::Qa, &results, 5), "Q: q1");
    }

    fn answerer(embedder: Arc<dyn leasekb_core::traits::Embedder>, name: &str) -> Answerer {
        let dir = std::env::temp_dir().join(format!("leasekb-answer-{name}-test"));
        std::fs::remove_dir_all(&dir).ok();
        let mut row = Record::new();
        row.insert("question".into(), json!("When is rent due?"));
        row.insert("answer".into(), json!("On the first business day"));
        let registry = KnowledgeRegistry::new(embedder).with_corpus(
            CorpusKind::Qa,
            vec![row],
            dir.join("qa.lkb"),
        );
        let router = Router::new(Classifier::new(vec![], CorpusKind::Qa), Arc::new(registry));
        Answerer::new(Arc::new(router), 3, 4000)
    }

    #[tokio::test]
    async fn test_answer_fixed_messages() {
        let a = answerer(Arc::new(KeywordEmbedder), "fixed");
        assert_eq!(a.answer("   ").await.text, EMPTY_QUESTION);

        let a = answerer(Arc::new(FailingEmbedder), "fixed-fail");
        let answer = a.answer("rent?").await;
        assert_eq!(answer.text, NO_RESULTS);
        assert_eq!(answer.corpus, Some(CorpusKind::Qa));
    }

    #[tokio::test]
    async fn test_answer_without_completer() {
        let answer = answerer(Arc::new(KeywordEmbedder), "simple")
            .answer("rent due?")
            .await;
        assert!(!answer.synthesized);
        assert_eq!(answer.text, "**Q:** When is rent due?\n**A:** On the first business day");
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_with_completer() {
        let answer = answerer(Arc::new(KeywordEmbedder), "llm")
            .with_completer(Arc::new(EchoCompleter::ok()))
            .answer("rent due?")
            .await;
        assert!(answer.synthesized);
        assert!(answer.text.starts_with("SYNTH[Context from knowledge base:\nQ: When is rent due?"));
        assert!(answer.text.contains("User question: rent due?"));
        assert!(answer.text.ends_with(']'));
    }

    #[tokio::test]
    async fn test_completion_failure_falls_back() {
        let answer = answerer(Arc::new(KeywordEmbedder), "llm-fail")
            .with_completer(Arc::new(EchoCompleter::failing()))
            .answer("rent due?")
            .await;
        assert!(!answer.synthesized);
        assert!(answer.text.starts_with("⚠️ LLM failed: "));
        assert!(answer.text.ends_with("**A:** On the first business day"));
    }
}
