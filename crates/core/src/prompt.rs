//! Structured prompt builder.
//!
//! A [`Prompt`] is a task plus typed sections (guide, rules, feedback,
//! examples, context, input, blob). Rendering produces one canonical text
//! block: the task first, then sections grouped by type in the fixed order
//! Guide → Rules → Feedback → Example → Context → Input → Blob. Insertion
//! order is preserved within a type.
//!
//! All free text is whitespace-normalized and sentence-terminated before it
//! is concatenated; blob text is the only verbatim exception.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::Message;

/// Structured user turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// What the model is asked to do
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task: String,

    /// Remarks in insertion order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
}

impl Prompt {
    /// An empty prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task, replacing any previous one.
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    /// Append a section.
    pub fn with(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Whether the prompt has neither a task nor sections.
    pub fn is_empty(&self) -> bool {
        self.task.trim().is_empty() && self.sections.is_empty()
    }

    /// Wrap the prompt as a single-element message sequence.
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::Prompt(self.clone())]
    }

    /// Like `to_messages`, consuming the prompt.
    pub fn into_messages(self) -> Vec<Message> {
        vec![Message::Prompt(self)]
    }

    /// Render the canonical text of the prompt.
    pub fn render(&self) -> String {
        let mut blocks = Vec::with_capacity(self.sections.len() + 1);

        let task = sentence(&self.task, '.');
        if !task.is_empty() {
            blocks.push(task);
        }

        let mut sections: Vec<&Section> = self.sections.iter().collect();
        // stable: keeps insertion order inside a kind
        sections.sort_by_key(|section| section.kind());

        for section in sections {
            let text = section.render();
            if !text.is_empty() {
                blocks.push(text);
            }
        }

        blocks.join("\n\n")
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Section kinds, declared in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionKind {
    Guide,
    Rules,
    Feedback,
    Example,
    Context,
    Input,
    Blob,
}

/// An optional lead-in note followed by a list of items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl Snippet {
    /// Create a snippet from a note and its items.
    pub fn new<I, S>(note: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            note: note.into(),
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

/// A typed remark of the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Section {
    /// How to complete the task
    Guide(Snippet),

    /// Requirements, rendered as a numbered list
    Rules(Snippet),

    /// Feedback on a previous completion, bulleted
    Feedback(Snippet),

    /// Input/output pair
    Example { input: String, reply: String },

    /// Additional information, bulleted
    Context(Snippet),

    /// Input data, bulleted
    Input(Snippet),

    /// Unformatted data, copied verbatim
    Blob { note: String, text: String },
}

impl Section {
    /// Guidance on how to complete the task.
    pub fn guide<I, S>(note: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Guide(Snippet::new(note, items))
    }

    /// Requirements, rendered as a numbered list.
    pub fn rules<I, S>(note: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Rules(Snippet::new(note, items))
    }

    /// Feedback on a previous completion.
    pub fn feedback<I, S>(note: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Feedback(Snippet::new(note, items))
    }

    /// An input with its expected output.
    pub fn example(input: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::Example {
            input: input.into(),
            reply: reply.into(),
        }
    }

    /// Additional background information.
    pub fn context<I, S>(note: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Context(Snippet::new(note, items))
    }

    /// Input data for the task.
    pub fn input<I, S>(note: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Input(Snippet::new(note, items))
    }

    /// Unformatted text, copied verbatim.
    pub fn blob(note: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Blob {
            note: note.into(),
            text: text.into(),
        }
    }

    /// The kind that decides where the section renders.
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::Guide(_) => SectionKind::Guide,
            Self::Rules(_) => SectionKind::Rules,
            Self::Feedback(_) => SectionKind::Feedback,
            Self::Example { .. } => SectionKind::Example,
            Self::Context(_) => SectionKind::Context,
            Self::Input(_) => SectionKind::Input,
            Self::Blob { .. } => SectionKind::Blob,
        }
    }

    /// Render the section on its own.
    pub fn render(&self) -> String {
        match self {
            Self::Guide(snippet) => {
                let mut lines = Vec::with_capacity(snippet.items.len() + 1);
                push_nonempty(&mut lines, sentence(&snippet.note, '.'));
                for item in &snippet.items {
                    push_nonempty(&mut lines, sentence(item, '.'));
                }
                lines.join("\n")
            }
            Self::Rules(snippet) => {
                let mut lines = Vec::with_capacity(snippet.items.len() + 1);
                push_nonempty(&mut lines, sentence(&snippet.note, ':'));
                let rules = snippet
                    .items
                    .iter()
                    .map(|item| sentence(item, '.'))
                    .filter(|rule| !rule.is_empty());
                for (i, rule) in rules.enumerate() {
                    lines.push(format!("{}. {rule}", i + 1));
                }
                lines.join("\n")
            }
            Self::Feedback(snippet) | Self::Context(snippet) | Self::Input(snippet) => {
                bulleted(snippet)
            }
            Self::Example { input, reply } => format!(
                "Example Input: {}\nExpected Output: {}",
                normalize(input),
                normalize(reply)
            ),
            Self::Blob { note, text } => {
                let note = sentence(note, ':');
                if note.is_empty() {
                    text.clone()
                } else {
                    format!("{note}\n{text}")
                }
            }
        }
    }
}

/// A single item without a note renders as a plain sentence; anything else
/// renders as a labelled bullet list.
fn bulleted(snippet: &Snippet) -> String {
    let items: Vec<String> = snippet
        .items
        .iter()
        .map(|item| sentence(item, '.'))
        .filter(|item| !item.is_empty())
        .collect();
    let note = sentence(&snippet.note, ':');

    if note.is_empty() && items.len() == 1 {
        return items.into_iter().next().unwrap_or_default();
    }

    let mut lines = Vec::with_capacity(items.len() + 1);
    push_nonempty(&mut lines, note);
    lines.extend(items.into_iter().map(|item| format!("- {item}")));
    lines.join("\n")
}

fn push_nonempty(lines: &mut Vec<String>, line: String) {
    if !line.is_empty() {
        lines.push(line);
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize `text` into a sentence: upper-case first letter, trailing
/// `. : ; ,` replaced by `terminator`. Text already ending in `!` or `?` keeps
/// its punctuation. Blank input yields an empty string.
pub fn sentence(text: &str, terminator: char) -> String {
    let text = normalize(text);
    let body = text.trim_end_matches(|c| matches!(c, '.' | ':' | ';' | ','));

    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut out: String = first.to_uppercase().chain(chars).collect();
    if !out.ends_with(|c| c == '!' || c == '?') {
        out.push(terminator);
    }
    out
}
