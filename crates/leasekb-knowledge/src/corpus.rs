//! Corpus kinds and how their records become embeddable text.

use std::fmt;

use leasekb_core::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::{Record, field};

/// The knowledge bases LeaseKB knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusKind {
    /// Curated question/answer pairs.
    Qa,
    /// Property listings: address, floor, suite, rent, brokers.
    Property,
    /// Contract clause extractions.
    MasterClauses,
}

const PROPERTY_KEYWORDS: &[&str] = &[
    "property", "address", "floor", "suite", "rent", "sf", "square feet", "broker",
    "associate", "lease", "monthly", "annual", "gci",
];

const LEGAL_KEYWORDS: &[&str] = &[
    "contract", "agreement", "clause", "term", "expiration", "renewal", "governing law",
    "non-compete", "exclusivity", "termination", "assignment", "license", "warranty",
    "insurance", "liability",
];

/// Clause columns indexed for the master-clauses corpus. Each has a
/// companion `<term>-Answer` column.
pub const KEY_TERMS: &[&str] = &[
    "Agreement Date",
    "Effective Date",
    "Expiration Date",
    "Renewal Term",
    "Governing Law",
    "Non-Compete",
    "Exclusivity",
    "Termination For Convenience",
    "Anti-Assignment",
    "License Grant",
    "Warranty Duration",
    "Insurance",
];

impl CorpusKind {
    pub const ALL: [CorpusKind; 3] = [CorpusKind::Qa, CorpusKind::Property, CorpusKind::MasterClauses];

    pub fn name(self) -> &'static str {
        match self {
            CorpusKind::Qa => "qa",
            CorpusKind::Property => "property",
            CorpusKind::MasterClauses => "master_clauses",
        }
    }

    /// Parse a corpus name. `legal` and `clauses` alias the clause corpus.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "qa" => Some(CorpusKind::Qa),
            "property" | "properties" => Some(CorpusKind::Property),
            "master_clauses" | "clauses" | "legal" => Some(CorpusKind::MasterClauses),
            _ => None,
        }
    }

    /// Built-in routing keywords. The QA corpus is the fallback and has none.
    pub fn default_keywords(self) -> Vec<String> {
        let words: &[&str] = match self {
            CorpusKind::Qa => &[],
            CorpusKind::Property => PROPERTY_KEYWORDS,
            CorpusKind::MasterClauses => LEGAL_KEYWORDS,
        };
        words.iter().map(|w| w.to_string()).collect()
    }

    /// Turn raw source records into store entries. Records that yield no
    /// text are skipped.
    pub fn prepare(self, records: Vec<Record>) -> PreparedCorpus {
        let mut prepared = PreparedCorpus::default();
        let total = records.len();
        for record in records {
            let entry = match self {
                CorpusKind::Qa => qa_entry(record),
                CorpusKind::Property => {
                    let text = property_text(&record);
                    (!text.is_empty()).then(|| (text.clone(), text, record))
                }
                CorpusKind::MasterClauses => {
                    let text = clause_text(&record);
                    (!text.is_empty()).then(|| (text.clone(), text, record))
                }
            };
            if let Some((embed, text, metadata)) = entry {
                prepared.embed_texts.push(embed);
                prepared.texts.push(text);
                prepared.metadata.push(metadata);
            }
        }
        if prepared.len() < total {
            tracing::debug!(
                "{}: skipped {} empty records",
                self.name(),
                total - prepared.len()
            );
        }
        prepared
    }
}

impl fmt::Display for CorpusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Store-ready columns for one corpus.
#[derive(Debug, Clone, Default)]
pub struct PreparedCorpus {
    /// Text sent to the embedder.
    pub embed_texts: Vec<String>,
    /// Text stored alongside each vector.
    pub texts: Vec<String>,
    pub metadata: Vec<Metadata>,
}

impl PreparedCorpus {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// QA rows embed the question and store the answer.
fn qa_entry(record: Record) -> Option<(String, String, Metadata)> {
    let question = field(&record, "question")?.into_owned();
    let answer = field(&record, "answer")?.into_owned();
    let mut meta = Metadata::new();
    meta.insert("question".into(), Value::String(question.clone()));
    meta.insert("answer".into(), Value::String(answer.clone()));
    Some((question, answer, meta))
}

/// `Property: .. | Floor: .. | ..` from whichever listing columns are set.
pub fn property_text(record: &Record) -> String {
    const COLUMNS: &[(&str, &str, &str, &str)] = &[
        ("Property Address", "Property: ", "", ""),
        ("Floor", "Floor: ", "", ""),
        ("Suite", "Suite: ", "", ""),
        ("Size (SF)", "Size: ", "", " SF"),
        ("Rent/SF/Year", "Rent per SF: ", "$", ""),
        ("Annual Rent", "Annual Rent: ", "$", ""),
        ("Monthly Rent", "Monthly Rent: ", "$", ""),
        ("Associate 1", "Associate: ", "", ""),
        ("BROKER Email ID", "Broker: ", "", ""),
    ];

    COLUMNS
        .iter()
        .filter_map(|(column, label, prefix, suffix)| {
            field(record, column).map(|v| format!("{label}{prefix}{v}{suffix}"))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// `Document: .. | Parties: .. | <Term>: <answer>` for every extracted term.
pub fn clause_text(record: &Record) -> String {
    let mut parts = Vec::new();
    if let Some(doc) = field(record, "Document Name") {
        parts.push(format!("Document: {doc}"));
    }
    if let Some(parties) = field(record, "Parties") {
        parts.push(format!("Parties: {parties}"));
    }
    for term in KEY_TERMS {
        if field(record, term).is_none() {
            continue;
        }
        if let Some(answer) = field(record, &format!("{term}-Answer")) {
            parts.push(format!("{term}: {answer}"));
        }
    }
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_names_round_trip() {
        for kind in CorpusKind::ALL {
            assert_eq!(CorpusKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(CorpusKind::from_name("Legal"), Some(CorpusKind::MasterClauses));
        assert_eq!(CorpusKind::from_name("weather"), None);
    }

    #[test]
    fn test_default_keywords() {
        assert!(CorpusKind::Qa.default_keywords().is_empty());
        assert!(CorpusKind::Property.default_keywords().contains(&"square feet".to_string()));
        assert!(CorpusKind::MasterClauses.default_keywords().contains(&"governing law".to_string()));
    }

    #[test]
    fn test_property_text() {
        let r = record(&[
            ("Property Address", "36 W 36th St"),
            ("Floor", "E3"),
            ("Suite", ""),
            ("Size (SF)", "18650"),
            ("Rent/SF/Year", "87.00"),
            ("Monthly Rent", "135,212.50"),
            ("BROKER Email ID", "jane@broker.test"),
        ]);
        assert_eq!(
            property_text(&r),
            "Property: 36 W 36th St | Floor: E3 | Size: 18650 SF | Rent per SF: $87.00 | \
             Monthly Rent: $135,212.50 | Broker: jane@broker.test"
        );
    }

    #[test]
    fn test_clause_text_requires_both_columns() {
        let r = record(&[
            ("Document Name", "Acme Supply Agreement"),
            ("Parties", "Acme; Globex"),
            ("Governing Law", "This Agreement is governed by..."),
            ("Governing Law-Answer", "Delaware"),
            ("Exclusivity", ""),
            ("Exclusivity-Answer", "Yes"),
            ("Insurance-Answer", "No"),
        ]);
        assert_eq!(
            clause_text(&r),
            "Document: Acme Supply Agreement | Parties: Acme; Globex | Governing Law: Delaware"
        );
    }

    #[test]
    fn test_prepare_qa_embeds_question_stores_answer() {
        let records = vec![
            record(&[("question", "What is GCI?"), ("answer", "Gross commission income")]),
            record(&[("question", "orphan"), ("answer", "")]),
        ];
        let prepared = CorpusKind::Qa.prepare(records);
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared.embed_texts[0], "What is GCI?");
        assert_eq!(prepared.texts[0], "Gross commission income");
        assert_eq!(prepared.metadata[0]["question"], json!("What is GCI?"));
    }

    #[test]
    fn test_prepare_keeps_source_row_as_metadata() {
        let row = record(&[("Property Address", "1 Main St"), ("Floor", "2")]);
        let prepared = CorpusKind::Property.prepare(vec![row.clone(), Record::new()]);
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared.metadata[0], row);
        assert_eq!(prepared.embed_texts[0], prepared.texts[0]);
    }
}
