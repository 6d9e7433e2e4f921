//! Stage memory (C3, §4.3): append-only turn history plus a BM25-bounded
//! view over compact per-step summaries, shared by the architect, skeleton
//! and code loops. The only behavioral difference between the skeleton
//! loop and the other two is whether the most recent message is pinned
//! ahead of BM25 selection — modeled here as [`RetentionPolicy`] rather
//! than three near-duplicate structs.

use std::collections::HashMap;

use serde_json::Value;

/// BM25 Okapi constants, matched to `rank_bm25`'s defaults.
const K1: f64 = 1.5;
const B: f64 = 0.75;
const EPSILON: f64 = 0.25;

/// Ranks a fixed corpus of feedback strings against a query, the same
/// algorithm `rank_bm25.BM25Okapi` implements. Corpus documents are
/// tokenized on a literal space (mirroring the original's `doc.split(" ")`,
/// which — unlike a generic whitespace split — yields a single empty-string
/// token for an empty document rather than no tokens at all); queries are
/// tokenized on runs of whitespace (`query.split()`).
struct Bm25 {
    doc_freqs: Vec<HashMap<String, usize>>,
    doc_len: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25 {
    fn new(corpus: &[String]) -> Self {
        let tokenized: Vec<Vec<&str>> = corpus.iter().map(|d| d.split(' ').collect()).collect();

        let mut doc_freqs = Vec::with_capacity(tokenized.len());
        let mut doc_len = Vec::with_capacity(tokenized.len());
        let mut nd: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for doc in &tokenized {
            doc_len.push(doc.len());
            total_len += doc.len();
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for word in doc {
                *freqs.entry((*word).to_string()).or_insert(0) += 1;
            }
            for word in freqs.keys() {
                *nd.entry(word.clone()).or_insert(0) += 1;
            }
            doc_freqs.push(freqs);
        }

        let corpus_size = tokenized.len().max(1);
        let avgdl = total_len as f64 / corpus_size as f64;

        let mut idf: HashMap<String, f64> = HashMap::new();
        let mut idf_sum = 0.0;
        let mut negative: Vec<String> = Vec::new();
        for (word, freq) in &nd {
            let value = ((tokenized.len() as f64) - (*freq as f64) + 0.5).ln()
                - ((*freq as f64) + 0.5).ln();
            idf.insert(word.clone(), value);
            idf_sum += value;
            if value < 0.0 {
                negative.push(word.clone());
            }
        }
        let average_idf = if idf.is_empty() { 0.0 } else { idf_sum / idf.len() as f64 };
        let eps = EPSILON * average_idf;
        for word in negative {
            idf.insert(word, eps);
        }

        Bm25 {
            doc_freqs,
            doc_len,
            avgdl: if avgdl == 0.0 { 1.0 } else { avgdl },
            idf,
        }
    }

    fn scores(&self, query_tokens: &[&str]) -> Vec<f64> {
        let mut scores = vec![0.0; self.doc_freqs.len()];
        for q in query_tokens {
            let idf = self.idf.get(*q).copied().unwrap_or(0.0);
            for (i, freqs) in self.doc_freqs.iter().enumerate() {
                let q_freq = freqs.get(*q).copied().unwrap_or(0) as f64;
                let len = self.doc_len[i] as f64;
                let denom = q_freq + K1 * (1.0 - B + B * len / self.avgdl);
                if denom != 0.0 {
                    scores[i] += idf * (q_freq * (K1 + 1.0)) / denom;
                }
            }
        }
        scores
    }
}

/// Rank `corpus` indices by descending score, breaking ties by ascending
/// index — the effect of Python's stable `sorted(..., reverse=True)` over
/// equal keys.
fn ranked_indices(scores: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    idx
}

/// A single append-only full-history turn: the raw inputs/outputs of one
/// generator or judge invocation, kept for audit purposes only (never
/// consulted by `load_history`).
#[derive(Debug, Clone)]
pub struct Turn {
    pub inputs: Value,
    pub outputs: Value,
}

/// A compact per-step summary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub step: u32,
    pub feedback: String,
    pub content: String,
}

/// One entry of a rendered history: a real message, or a synthetic gap
/// marker inserted where consecutive selected steps are non-adjacent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryItem {
    Real(Message),
    Placeholder(String),
}

/// How `load_history` narrows `messages` down to at most `k` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// BM25 top-k over every message. `keep_recent` pins the most recent
    /// message ahead of selection and draws BM25 top-(k-1) from the rest —
    /// the skeleton loop's variant (§4.3 point 4).
    AlwaysFull { keep_recent: bool },
}

/// Per-stage memory: raw turn log plus BM25-bounded compact summaries.
/// `label` is purely cosmetic, used only by [`render`] to match the
/// original's per-stage message tag (`CODESTEP`, `SKELETONSTEP`, ...).
pub struct StageMemory {
    label: &'static str,
    policy: RetentionPolicy,
    full_history: Vec<Turn>,
    messages: Vec<Message>,
}

impl StageMemory {
    pub fn new(label: &'static str, policy: RetentionPolicy) -> Self {
        StageMemory {
            label,
            policy,
            full_history: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn full_history(&self) -> &[Turn] {
        &self.full_history
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append `suffix` to the most recent message recorded for `step`, if
    /// any. The code loop uses this to retroactively attach a "test pass
    /// status changed" line to the PRIOR step's message once both that
    /// step's and the current step's test status are known (§4.3
    /// supplement, ported from `code_memory.py`'s reversed-scan update).
    pub fn append_to_message(&mut self, step: u32, suffix: &str) {
        if let Some(msg) = self.messages.iter_mut().rev().find(|m| m.step == step) {
            msg.content.push_str(suffix);
        }
    }

    /// Append a turn to `full_history` and a pre-composed summary message
    /// to `messages`. The caller builds `content`/`feedback` per the
    /// per-stage composition rules in §4.3 (step 1 = rendered initial
    /// artifact; step > 1 = prior feedback + diff, with the code loop's
    /// test-status line appended when known). Returns the new step number.
    pub fn save_context(&mut self, turn: Turn, content: String, feedback: String) -> u32 {
        self.full_history.push(turn);
        let step = self.full_history.len() as u32;
        self.messages.push(Message {
            step,
            feedback,
            content,
        });
        step
    }

    /// §4.3 `load_history`: at most `k` real messages (a step-order
    /// subsequence of `messages`) plus gap placeholders. Returns `messages`
    /// verbatim, with no placeholders, when `|messages| <= k`.
    pub fn load_history(&self, query_feedback: &str, k: usize) -> Vec<HistoryItem> {
        if self.messages.len() <= k {
            return self.messages.iter().cloned().map(HistoryItem::Real).collect();
        }

        let query_tokens: Vec<&str> = query_feedback.split_whitespace().collect();

        let selected: Vec<Message> = match self.policy {
            RetentionPolicy::AlwaysFull { keep_recent: false } => {
                let corpus: Vec<String> = self.messages.iter().map(|m| m.feedback.clone()).collect();
                let bm25 = Bm25::new(&corpus);
                let scores = bm25.scores(&query_tokens);
                let mut top = ranked_indices(&scores);
                top.truncate(k);
                top.sort_unstable();
                top.into_iter().map(|i| self.messages[i].clone()).collect()
            }
            RetentionPolicy::AlwaysFull { keep_recent: true } => {
                let (middle, last) = self.messages.split_at(self.messages.len() - 1);
                let last = last[0].clone();
                let corpus: Vec<String> = middle.iter().map(|m| m.feedback.clone()).collect();
                let bm25 = Bm25::new(&corpus);
                let scores = bm25.scores(&query_tokens);
                let mut top = ranked_indices(&scores);
                let middle_limit = k.saturating_sub(1);
                top.truncate(middle_limit);
                top.sort_unstable();
                let mut selected: Vec<Message> = top.into_iter().map(|i| middle[i].clone()).collect();
                selected.push(last);
                selected.sort_by_key(|m| m.step);
                selected
            }
        };

        let mut out = Vec::with_capacity(selected.len() + 2);
        let mut prev_step: Option<u32> = None;
        for (idx, msg) in selected.into_iter().enumerate() {
            let step = msg.step;
            if idx == 0 && step > 1 {
                out.push(HistoryItem::Placeholder(format!(
                    "[...skipping steps 1 to {}...]",
                    step - 1
                )));
            }
            if let Some(prev) = prev_step {
                if step.saturating_sub(prev) > 1 {
                    out.push(HistoryItem::Placeholder(format!(
                        "[...skipping steps {} to {}...]",
                        prev + 1,
                        step - 1
                    )));
                }
            }
            out.push(HistoryItem::Real(msg));
            prev_step = Some(step);
        }
        out
    }

    /// Render a loaded history to the newline-joined text the generator
    /// prompts embed, in `[SUMMARY@LABEL] content` form per item.
    pub fn render(&self, query_feedback: &str, k: usize) -> String {
        self.load_history(query_feedback, k)
            .into_iter()
            .map(|item| match item {
                HistoryItem::Real(m) => format!("[SUMMARY@{}] {}", self.label, m.content),
                HistoryItem::Placeholder(text) => format!("[SUMMARY@{}] {}", self.label, text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(mem: &mut StageMemory, feedback: &str, content: &str) -> u32 {
        mem.save_context(
            Turn {
                inputs: Value::Null,
                outputs: Value::Null,
            },
            content.to_string(),
            feedback.to_string(),
        )
    }

    #[test]
    fn returns_all_messages_verbatim_when_under_k() {
        let mut mem = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        push(&mut mem, "fix the loop", "step 1");
        push(&mut mem, "add tests", "step 2");
        let items = mem.load_history("anything", 5);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], HistoryItem::Real(ref m) if m.step == 1));
        assert!(matches!(items[1], HistoryItem::Real(ref m) if m.step == 2));
    }

    #[test]
    fn selects_top_k_by_bm25_relevance() {
        let mut mem = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        push(&mut mem, "borrow checker error in parser", "s1");
        push(&mut mem, "totally unrelated formatting nit here", "s2");
        push(&mut mem, "borrow checker error again in parser", "s3");
        push(&mut mem, "typo in comment block", "s4");
        push(&mut mem, "another irrelevant line of text", "s5");

        let items = mem.load_history("borrow checker parser", 2);
        let real: Vec<u32> = items
            .iter()
            .filter_map(|i| match i {
                HistoryItem::Real(m) => Some(m.step),
                _ => None,
            })
            .collect();
        assert_eq!(real, vec![1, 3]);
    }

    #[test]
    fn leading_placeholder_when_first_selected_step_gt_1() {
        let mut mem = StageMemory::new("ARCHSTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        for i in 1..=6 {
            push(&mut mem, &format!("feedback {i}"), &format!("content {i}"));
        }
        // Query nothing in particular; force top-2 selection skewed to later steps
        // by making the query match only the later feedback text exactly.
        let items = mem.load_history("feedback 5", 1);
        assert!(matches!(items.first(), Some(HistoryItem::Placeholder(_))));
    }

    #[test]
    fn internal_gap_placeholder_inserted_between_nonadjacent_steps() {
        let mut mem = StageMemory::new("ARCHSTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        push(&mut mem, "alpha", "c1");
        push(&mut mem, "unrelated", "c2");
        push(&mut mem, "unrelated", "c3");
        push(&mut mem, "alpha", "c4");
        push(&mut mem, "unrelated", "c5");

        // k = 2 should surface steps 1 and 4 (both mention "alpha"), with an
        // internal gap placeholder for the skipped 2..3 range.
        let items = mem.load_history("alpha", 2);
        let rendered: Vec<String> = items
            .iter()
            .map(|i| match i {
                HistoryItem::Real(m) => format!("real:{}", m.step),
                HistoryItem::Placeholder(t) => format!("placeholder:{t}"),
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                "real:1".to_string(),
                "placeholder:[...skipping steps 2 to 3...]".to_string(),
                "real:4".to_string()
            ]
        );
    }

    #[test]
    fn skeleton_variant_always_retains_most_recent_message() {
        let mut mem = StageMemory::new("SKELETONSTEP", RetentionPolicy::AlwaysFull { keep_recent: true });
        push(&mut mem, "totally irrelevant text", "c1");
        push(&mut mem, "totally irrelevant text", "c2");
        push(&mut mem, "totally irrelevant text", "c3");
        push(&mut mem, "totally irrelevant text", "c4");

        // Query matches nothing; without pinning, BM25 ties would still
        // include step 4 is not guaranteed. With keep_recent, step 4 (the
        // last pushed) must always appear.
        let items = mem.load_history("query matching nothing at all", 2);
        let steps: Vec<u32> = items
            .iter()
            .filter_map(|i| match i {
                HistoryItem::Real(m) => Some(m.step),
                _ => None,
            })
            .collect();
        assert!(steps.contains(&4));
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn render_joins_items_with_label_and_newline() {
        let mut mem = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        push(&mut mem, "fb", "hello");
        let rendered = mem.render("fb", 5);
        assert_eq!(rendered, "[SUMMARY@CODESTEP] hello");
    }

    #[test]
    fn append_to_message_targets_the_right_step() {
        let mut mem = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        push(&mut mem, "fb1", "c1");
        push(&mut mem, "fb2", "c2");
        mem.append_to_message(1, "\nsuffix");
        assert_eq!(mem.messages()[0].content, "c1\nsuffix");
        assert_eq!(mem.messages()[1].content, "c2");
    }

    #[test]
    fn empty_memory_renders_empty_string() {
        let mem = StageMemory::new("CODESTEP", RetentionPolicy::AlwaysFull { keep_recent: false });
        assert_eq!(mem.render("anything", 5), "");
    }
}
