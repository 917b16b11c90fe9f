//! Retrieval-backed search and research over a local document corpus.
//! Every quoted snippet lands in the citation store first, so the claim
//! verifier can entail the reply against resolvable evidence.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, ToolHandler};
use crate::executor::context::ExecutionContext;
use crate::executor::{ExecError, SideEffectRecord, ToolOutput};
use crate::registry::Capability;
use crate::services::embedding::tokenize;
use crate::verifier::citations::CitationRef;

#[derive(Debug, Clone)]
pub struct Document {
    pub uri: String,
    pub title: String,
    pub text: String,
}

/// Keyword-overlap relevance in [0, 1].
fn relevance(query: &str, doc: &Document) -> f32 {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let haystack = tokenize(&format!("{} {}", doc.title, doc.text));
    let hits = query_tokens.iter().filter(|t| haystack.contains(t)).count();
    hits as f32 / query_tokens.len() as f32
}

fn ranked<'a>(query: &str, corpus: &'a [Document]) -> Vec<(&'a Document, f32)> {
    let mut scored: Vec<(&Document, f32)> = corpus
        .iter()
        .map(|d| (d, relevance(query, d)))
        .filter(|(_, s)| *s > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

pub fn split_sentences(text: &str) -> Vec<String> {
    text.split_inclusive(&['.', '!', '?'][..])
        .map(|s| s.trim().to_string())
        .filter(|s| s.len() > 12)
        .collect()
}

fn cite_snippet(ctx: &ExecutionContext, doc: &Document, snippet: &str) -> CitationRef {
    let start = doc.text.find(snippet).unwrap_or(0);
    ctx.deps
        .citations
        .put(&doc.uri, (start, start + snippet.len()), snippet.as_bytes())
}

pub struct SearchWebTool;

#[async_trait]
impl ToolHandler for SearchWebTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::Network)?;
        let query = arg_str(args, "query")?;
        let k = args.get("k").and_then(Value::as_u64).unwrap_or(5) as usize;

        let hits = ranked(query, &ctx.deps.corpus);
        let mut results = Vec::new();
        let mut side_effects = Vec::new();
        let mut citations = Vec::new();
        let mut lines = Vec::new();

        for (doc, score) in hits.into_iter().take(k) {
            let snippet = split_sentences(&doc.text)
                .into_iter()
                .next()
                .unwrap_or_else(|| doc.text.chars().take(200).collect());
            citations.push(cite_snippet(ctx, doc, &snippet));
            side_effects.push(SideEffectRecord::UrlFetched { url: doc.uri.clone(), status: 200 });
            lines.push(snippet.clone());
            results.push(json!({
                "title": doc.title.clone(),
                "url": doc.uri.clone(),
                "snippet": snippet,
                "score": score,
            }));
        }

        if results.is_empty() {
            return Ok(ToolOutput {
                value: json!({ "query": query, "results": [], "status": 200 }),
                reply: format!("No sources found for '{query}'."),
                side_effects: Vec::new(),
                citations: Vec::new(),
            });
        }

        Ok(ToolOutput {
            value: json!({ "query": query, "results": results, "status": 200 }),
            reply: lines.join(" "),
            side_effects,
            citations,
        })
    }
}

/// One research tool, one surface: `query -> {answer_text, citations,
/// confidence}`. Synthesis goes through the language model when one is
/// wired, otherwise an extractive summary of the best sources. Either
/// way the standard verifier applies.
pub struct ResearchTool;

#[async_trait]
impl ToolHandler for ResearchTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::Network)?;
        let query = arg_str(args, "query")?;

        let hits = ranked(query, &ctx.deps.corpus);
        if hits.is_empty() {
            return Ok(ToolOutput {
                value: json!({
                    "query": query,
                    "answer_text": "",
                    "citations": [],
                    "confidence": 0.0,
                }),
                reply: format!("I couldn't find sources on '{query}'."),
                side_effects: Vec::new(),
                citations: Vec::new(),
            });
        }

        let mut citations = Vec::new();
        let mut side_effects = Vec::new();
        let mut evidence = Vec::new();
        for (doc, _) in hits.iter().take(3) {
            for sentence in split_sentences(&doc.text).into_iter().take(2) {
                citations.push(cite_snippet(ctx, doc, &sentence));
                evidence.push(sentence);
            }
            side_effects.push(SideEffectRecord::UrlFetched { url: doc.uri.clone(), status: 200 });
        }

        let extractive = evidence.join(" ");
        let answer_text = match &ctx.deps.model {
            Some(model) => {
                let prompt = format!(
                    "Summarize the evidence below into a short factual answer. \
                     Use only the evidence, no outside knowledge.\n\nQuestion: {query}\n\nEvidence:\n{extractive}\n\nAnswer:"
                );
                match model.complete(&prompt, None, ctx.deadline).await {
                    Ok(text) if !text.trim().is_empty() => text,
                    _ => extractive.clone(),
                }
            }
            None => extractive.clone(),
        };

        let confidence = hits.first().map(|(_, s)| *s).unwrap_or(0.0).min(1.0);
        let citation_values: Vec<Value> = citations
            .iter()
            .map(|c| {
                json!({
                    "source_uri": c.source_uri.clone(),
                    "byte_span": [c.byte_span.0, c.byte_span.1],
                    "content_hash": c.content_hash.clone(),
                })
            })
            .collect();

        Ok(ToolOutput {
            value: json!({
                "query": query,
                "answer_text": answer_text.clone(),
                "citations": citation_values,
                "confidence": confidence,
            }),
            reply: answer_text,
            side_effects,
            citations,
        })
    }
}

/// Small built-in corpus for offline deployments and tests. A real
/// deployment replaces this with fetched, normalized pages.
pub fn default_corpus() -> Vec<Document> {
    vec![
        Document {
            uri: "doc://rust-async".into(),
            title: "Asynchronous Rust".into(),
            text: "Rust async functions compile into state machines driven by an executor. \
                   Tokio is the most widely used async runtime for Rust services. \
                   Cancellation in Tokio is cooperative and usually modeled by dropping futures."
                .into(),
        },
        Document {
            uri: "doc://voice-assistants".into(),
            title: "Voice assistant pipelines".into(),
            text: "A voice assistant turn flows from transcription to planning to execution. \
                   Grammar constrained decoding keeps model output inside a strict JSON schema. \
                   Post-execution verification compares tool results against expected conditions."
                .into(),
        },
        Document {
            uri: "doc://memory-systems".into(),
            title: "Conversational memory".into(),
            text: "Semantic memory stores embed past interactions as vectors for similarity search. \
                   Clustering groups related experiences so assistants can surface themes. \
                   Importance scoring decides which memories survive pruning."
                .into(),
        },
        Document {
            uri: "doc://entailment".into(),
            title: "Claim verification".into(),
            text: "Natural language inference scores whether a premise entails a hypothesis. \
                   Claim coverage measures the fraction of generated sentences supported by evidence. \
                   Batching inference calls amortizes model startup cost."
                .into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_ranks_matching_doc_first() {
        let corpus = default_corpus();
        let hits = ranked("tokio async runtime", &corpus);
        assert_eq!(hits[0].0.uri, "doc://rust-async");
    }

    #[test]
    fn sentences_split_on_terminators() {
        let sentences = split_sentences("One sentence here. Another follows! Short. A third one?");
        assert_eq!(sentences.len(), 3, "the 'Short.' fragment is dropped");
    }
}
