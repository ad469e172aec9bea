//! Topic title cleaning, normalization and deduplication.
//!
//! Titles coming back from analysis carry artifacts of the source structure
//! (numbering, `SCORM:` style prefixes, `=== TOPIC: ... ===` markers). They are
//! cleaned into display titles, and the lowercased cleaned title is the
//! identity used for deduplication. First seen wins: later duplicates are
//! absorbed into the earliest topic with the same identity.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::models::{AnalyzedTopic, NewTopic, Topic};

static TOPIC_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^=+\s*(?i:topic)\s*:\s*(.*?)\s*(?:\([^()]*\))?\s*=+$").expect("valid regex")
});

static BOILERPLATE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?i:scorm|section|course|lesson|topic|module|page|book|activity|resource|unit|chapter|week)\s*:\s*",
    )
    .expect("valid regex")
});

static NUMBERING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?i:chapter|module|week|unit|part|section|lesson)\s+(?:\d+|[IVXLC]+)[a-z]?\s*[:.)\-\x{2013}]?\s+|\d+(?:\.\d+)+\.?\s+|\d+[.):]\s*|\d+\s+[\-\x{2013}]\s+|[IVXLC]+[.)]\s+)",
    )
    .expect("valid regex")
});

static FORMAT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\s*\((?i:lesson|scorm|page|forum|book|resource|quiz|url|file|folder|assignment|activity|label|h5p)\)\s*$",
    )
    .expect("valid regex")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Words that name a delivery format or navigation element, not a subject.
const NON_TOPIC_WORDS: &[&str] = &[
    "scorm",
    "lesson",
    "forum",
    "page",
    "book",
    "resource",
    "quiz",
    "url",
    "file",
    "folder",
    "label",
    "exercise",
    "practice",
    "worksheet",
    "next",
    "previous",
    "home",
    "back",
];

const TRIM_CHARS: &[char] = &[
    '-', '\u{2013}', '\u{2014}', ':', ';', ',', '|', '*', '#', '_', '"', '\'', '`', '=',
];

/// Clean an analyzer title into its display form.
pub fn clean_title(raw: &str) -> String {
    let mut title = WHITESPACE.replace_all(raw.trim(), " ").into_owned();

    if let Some(caps) = TOPIC_MARKER.captures(&title) {
        title = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
    }

    // Prefixes and numbering can stack ("SECTION: 2. Valves"), so strip until stable.
    loop {
        let before = title.len();
        title = BOILERPLATE_PREFIX.replace(&title, "").into_owned();
        title = NUMBERING.replace(&title, "").into_owned();
        title = FORMAT_SUFFIX.replace(&title, "").into_owned();
        title = title.trim_matches(TRIM_CHARS).trim().to_string();
        if title.len() == before {
            break;
        }
    }

    WHITESPACE.replace_all(&title, " ").trim().to_string()
}

/// Comparison identity of a title: cleaned, trimmed and lowercased.
pub fn normalized_identity(title: &str) -> String {
    clean_title(title).trim().to_lowercase()
}

/// Whether a cleaned title names actual subject matter.
pub fn is_meaningful(cleaned: &str) -> bool {
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ',' || c.is_whitespace())
    {
        return false;
    }
    let lower = trimmed.to_lowercase();
    let first_word = lower.split_whitespace().next().unwrap_or("");
    let rest_is_number = lower
        .split_whitespace()
        .skip(1)
        .all(|w| w.chars().all(|c| c.is_ascii_digit() || c == '.'));
    !(NON_TOPIC_WORDS.contains(&first_word) && rest_is_number)
}

/// Flatten analyzer output into clean, insertable topics.
///
/// Subtopics follow their parent at level 2. Topics whose cleaned title is not
/// meaningful are dropped. No deduplication happens here.
pub fn flatten(analyzed: Vec<AnalyzedTopic>) -> Vec<NewTopic> {
    let mut out = Vec::new();
    for topic in analyzed {
        let subtopics = topic.subtopics;
        let title = clean_title(&topic.title);
        if is_meaningful(&title) {
            out.push(NewTopic {
                title,
                description: topic.description.trim().to_string(),
                content_excerpt: topic.content_excerpt.trim().to_string(),
                learning_objectives: topic.learning_objectives,
                level: topic.level.clamp(1, 2),
                selected: false,
                quota: 0,
            });
        }
        for sub in subtopics {
            let title = clean_title(&sub.title);
            if !is_meaningful(&title) {
                continue;
            }
            out.push(NewTopic {
                title,
                description: sub.description.trim().to_string(),
                content_excerpt: sub.content_excerpt.trim().to_string(),
                learning_objectives: sub.learning_objectives,
                level: 2,
                selected: false,
                quota: 0,
            });
        }
    }
    out
}

/// Result of first-seen-wins deduplication over an ordered title list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupPlan {
    /// Indices of kept titles, in original order.
    pub kept: Vec<usize>,
    /// `(dropped, kept)` index pairs.
    pub merges: Vec<(usize, usize)>,
}

impl DedupPlan {
    pub fn is_noop(&self) -> bool {
        self.merges.is_empty()
    }
}

/// Plan deduplication of titles by normalized identity.
pub fn plan_dedup<S: AsRef<str>>(titles: &[S]) -> DedupPlan {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut plan = DedupPlan::default();
    for (idx, title) in titles.iter().enumerate() {
        let identity = normalized_identity(title.as_ref());
        match first_seen.get(&identity) {
            Some(&kept) => plan.merges.push((idx, kept)),
            None => {
                first_seen.insert(identity, idx);
                plan.kept.push(idx);
            }
        }
    }
    plan
}

/// Clean and deduplicate topics that have not been persisted yet.
///
/// Duplicates are folded into the first topic with the same identity: quota is
/// summed, selection is OR-ed and missing learning objectives are appended.
pub fn normalize(topics: Vec<NewTopic>) -> Vec<NewTopic> {
    let topics: Vec<NewTopic> = topics
        .into_iter()
        .filter_map(|mut t| {
            t.title = clean_title(&t.title);
            is_meaningful(&t.title).then_some(t)
        })
        .collect();

    let titles: Vec<&str> = topics.iter().map(|t| t.title.as_str()).collect();
    let plan = plan_dedup(&titles);
    if plan.is_noop() {
        return topics;
    }

    let mut slots: Vec<Option<NewTopic>> = topics.into_iter().map(Some).collect();
    for &(dropped, kept) in &plan.merges {
        let Some(dup) = slots[dropped].take() else {
            continue;
        };
        if let Some(target) = slots[kept].as_mut() {
            target.quota += dup.quota;
            target.selected |= dup.selected;
            union_objectives(&mut target.learning_objectives, &dup.learning_objectives);
            if target.content_excerpt.is_empty() {
                target.content_excerpt = dup.content_excerpt;
            }
        }
    }
    slots.into_iter().flatten().collect()
}

fn union_objectives(into: &mut Vec<String>, from: &[String]) {
    for objective in from {
        if !into.iter().any(|o| o.eq_ignore_ascii_case(objective)) {
            into.push(objective.clone());
        }
    }
}

/// A persisted merge: `absorb` topics fold into `keep`, which takes the new values.
///
/// Applied as reassign-questions-then-delete inside one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMerge {
    pub keep: Uuid,
    pub absorb: Vec<Uuid>,
    pub title: String,
    pub content_excerpt: String,
    pub learning_objectives: Vec<String>,
    pub quota: u32,
    pub selected: bool,
}

/// Plan persisted deduplication over a request's topics (in display order).
pub fn plan_topic_merges(topics: &[Topic]) -> Vec<TopicMerge> {
    let titles: Vec<&str> = topics.iter().map(|t| t.title.as_str()).collect();
    let plan = plan_dedup(&titles);

    let mut merges: Vec<TopicMerge> = Vec::new();
    let mut by_keep: HashMap<usize, usize> = HashMap::new();
    for &(dropped, kept) in &plan.merges {
        let pos = *by_keep.entry(kept).or_insert_with(|| {
            let base = &topics[kept];
            merges.push(TopicMerge {
                keep: base.id,
                absorb: Vec::new(),
                title: clean_title(&base.title),
                content_excerpt: base.content_excerpt.clone(),
                learning_objectives: base.learning_objectives.clone(),
                quota: base.quota,
                selected: base.selected,
            });
            merges.len() - 1
        });
        let dup = &topics[dropped];
        let merge = &mut merges[pos];
        merge.absorb.push(dup.id);
        merge.quota += dup.quota;
        merge.selected |= dup.selected;
        union_objectives(&mut merge.learning_objectives, &dup.learning_objectives);
        if merge.content_excerpt.is_empty() {
            merge.content_excerpt = dup.content_excerpt.clone();
        }
    }
    merges
}

/// User-triggered merge of `second` into `first`.
pub fn merge_pair(first: &Topic, second: &Topic, separator: &str) -> TopicMerge {
    let excerpt = [first.content_excerpt.trim(), second.content_excerpt.trim()]
        .into_iter()
        .filter(|e| !e.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let mut objectives = first.learning_objectives.clone();
    union_objectives(&mut objectives, &second.learning_objectives);

    TopicMerge {
        keep: first.id,
        absorb: vec![second.id],
        title: format!("{}{}{}", first.title, separator, second.title),
        content_excerpt: excerpt,
        learning_objectives: objectives,
        quota: first.quota + second.quota,
        selected: first.selected || second.selected,
    }
}
