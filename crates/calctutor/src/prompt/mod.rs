//! System prompt assembly.
//!
//! [`build`] renders a [`PolicyDocument`] and the exercise catalog into the
//! single instruction string sent at the head of every transcript. The
//! output depends only on its inputs: no clock, no randomness, so a frozen
//! policy and catalog always produce byte-identical prompts.
//!
//! Section order is fixed:
//!
//! 1. preamble, numbered operating rules, derivative rule reference
//! 2. incorrect/correct formatting examples, verbatim
//! 3. the catalog rendering (or the "no exercises" sentinel)

mod policy;

pub use policy::{CatalogLabels, FixedReplies, FormattingExample, PolicyDocument};

use crate::catalog::Catalog;

/// Builder for multi-section system prompts.
///
/// Sections are joined with blank lines. Empty sections are skipped so a
/// policy with no reference block does not leave a dangling heading.
///
/// ```
/// use calctutor::prompt::SystemPromptBuilder;
///
/// let prompt = SystemPromptBuilder::new("You are a calculus tutor.")
///     .section("Rules", "1. Stay on topic.")
///     .section_opt("Reference", None::<String>)
///     .raw("EXERCISES: none")
///     .build();
///
/// assert!(prompt.contains("## Rules"));
/// assert!(!prompt.contains("## Reference"));
/// assert!(prompt.ends_with("EXERCISES: none"));
/// ```
pub struct SystemPromptBuilder {
    sections: Vec<String>,
}

impl SystemPromptBuilder {
    /// Start with a preamble, included as-is.
    pub fn new(preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        let sections = if preamble.is_empty() {
            Vec::new()
        } else {
            vec![preamble]
        };
        Self { sections }
    }

    /// Append a section under a `## ` heading. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(format!("## {heading}\n\n{content}"));
        }
        self
    }

    /// Append a section only if the content is `Some`.
    pub fn section_opt(self, heading: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.section(heading, c),
            None => self,
        }
    }

    /// Append text without a heading. Skipped if empty.
    pub fn raw(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(content);
        }
        self
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

/// Number items as `1. ...`, `2. ...`, one per line.
fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_examples(policy: &PolicyDocument) -> String {
    let mut blocks = Vec::new();
    for example in [&policy.incorrect_example, &policy.correct_example] {
        blocks.push(format!("**{}**\n\n\"{}\"", example.label, example.text));
    }
    if !policy.examples_closing.is_empty() {
        blocks.push(policy.examples_closing.clone());
    }
    blocks.join("\n\n")
}

/// Render the catalog block.
///
/// Each record is delimited by a header line carrying its id and a closing
/// rule. An absent or empty catalog renders the `no_exercises` sentinel.
pub fn render_catalog(catalog: Option<&Catalog>, labels: &CatalogLabels) -> String {
    let Some(catalog) = catalog.filter(|c| !c.is_empty()) else {
        return labels.no_exercises.clone();
    };

    let mut out = format!("{}\n\n", labels.heading);
    for record in catalog {
        out.push_str(&format!("--- {} {} ---\n", labels.exercise, record.id));
        out.push_str(&format!("{}: {}\n", labels.function, record.function));
        out.push_str(&format!("{}: {}\n", labels.target, record.target));
        if let Some(ref conclusion) = record.conclusion {
            out.push_str(&format!("{}: {conclusion}\n", labels.conclusion));
        }
        out.push_str(&labels.delimiter);
        out.push('\n');
    }
    out
}

/// Build the full system prompt for one model call.
pub fn build(catalog: Option<&Catalog>, policy: &PolicyDocument) -> String {
    SystemPromptBuilder::new(policy.preamble.clone())
        .section(&policy.rules_heading, numbered(&policy.rules))
        .section(&policy.reference_heading, policy.reference.clone())
        .section(&policy.examples_heading, render_examples(policy))
        .raw(render_catalog(catalog, &policy.catalog))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExerciseRecord;

    fn record(id: &str, function: &str, target: &str) -> ExerciseRecord {
        ExerciseRecord {
            id: id.into(),
            function: function.into(),
            target: target.into(),
            conclusion: None,
        }
    }

    fn sample_catalog() -> Catalog {
        Catalog::new(vec![
            record("101", "7q^5 + 3q", "35q^4 + 3"),
            record("102", "ln(5w)", "1/w"),
            record("103", "tan(9z)", "9sec^2(9z)"),
        ])
        .unwrap()
    }

    #[test]
    fn builder_joins_sections() {
        let prompt = SystemPromptBuilder::new("Preamble")
            .section("Context", "Some context")
            .build();
        assert_eq!(prompt, "Preamble\n\n## Context\n\nSome context");
    }

    #[test]
    fn builder_skips_empty_parts() {
        let prompt = SystemPromptBuilder::new("")
            .section("Empty", "")
            .raw("")
            .raw("only")
            .build();
        assert_eq!(prompt, "only");
    }

    #[test]
    fn numbered_rules() {
        let rules = vec!["first".to_string(), "second".to_string()];
        assert_eq!(numbered(&rules), "1. first\n2. second");
    }

    #[test]
    fn catalog_lists_each_record_once_in_order() {
        let catalog = sample_catalog();
        let rendered = render_catalog(Some(&catalog), &CatalogLabels::english());

        let mut last = 0;
        for r in catalog.iter() {
            assert_eq!(rendered.matches(&r.function).count(), 1, "{}", r.function);
            let header = format!("--- EXERCISE ID {} ---", r.id);
            assert_eq!(rendered.matches(&header).count(), 1);
            let pos = rendered.find(&header).unwrap();
            assert!(pos >= last, "records out of order");
            last = pos;
        }
    }

    #[test]
    fn catalog_renders_conclusion_when_present() {
        let mut r = record("7", "x^3 - 3x", "3x^2 - 3");
        r.conclusion = Some("minimum at x = 1".into());
        let catalog = Catalog::new(vec![r]).unwrap();
        let rendered = render_catalog(Some(&catalog), &CatalogLabels::english());
        assert!(rendered.contains("CONCLUSION: minimum at x = 1"));
    }

    #[test]
    fn empty_catalog_renders_sentinel() {
        let labels = CatalogLabels::english();
        let empty = Catalog::default();
        assert_eq!(render_catalog(Some(&empty), &labels), labels.no_exercises);
        assert_eq!(render_catalog(None, &labels), labels.no_exercises);

        let prompt = build(Some(&empty), &PolicyDocument::english());
        assert!(prompt.ends_with(&labels.no_exercises));
        assert!(!prompt.contains(&labels.heading));
    }

    #[test]
    fn build_is_deterministic() {
        let catalog = sample_catalog();
        let policy = PolicyDocument::spanish();
        assert_eq!(build(Some(&catalog), &policy), build(Some(&catalog), &policy));
    }

    #[test]
    fn build_orders_policy_examples_then_catalog() {
        let catalog = sample_catalog();
        let policy = PolicyDocument::english();
        let prompt = build(Some(&catalog), &policy);

        let rules = prompt.find(&policy.rules_heading).unwrap();
        let examples = prompt.find(&policy.correct_example.label).unwrap();
        let listing = prompt.find(&policy.catalog.heading).unwrap();
        assert!(prompt.starts_with(&policy.preamble));
        assert!(rules < examples && examples < listing);
    }

    #[test]
    fn english_prompt_states_the_mandates() {
        let prompt = build(None, &PolicyDocument::english());
        assert!(prompt.contains("politely decline"));
        assert!(prompt.contains("follow-up questions"));
        assert!(prompt.contains("its own line"));
        assert!(prompt.contains("Step 1"));
    }

    #[test]
    fn spanish_prompt_golden_catalog_block() {
        let catalog = Catalog::new(vec![record("1", "x^2", "2x")]).unwrap();
        let prompt = build(Some(&catalog), &PolicyDocument::spanish());
        assert!(prompt.ends_with(
            "BASE DE DATOS DE EJERCICIOS QUE PUEDES ENSEÑAR:\n\n\
             --- EJERCICIO ID: 1 ---\n\
             FUNCION: x^2\n\
             DERIVADA FINAL (OBJETIVO): 2x\n\
             ------------------------\n"
        ));
    }
}
