//! Prompt templates with named slots.
//!
//! A [`PromptTemplate`] is parsed once from text containing `{slot}`
//! placeholders (`{{` and `}}` produce literal braces). Rendering requires a
//! value for every slot and rejects values for slots the template does not
//! declare, so a misspelled or forgotten slot fails loudly in tests instead
//! of shipping a half-filled prompt.
//!
//! Rendering is single-pass: text substituted into a slot is never scanned
//! for further placeholders, so a question containing `{context}` stays
//! literal.
//!
//! ```rust
//! use query_harness_core::prompt::PromptTemplate;
//!
//! let t = PromptTemplate::parse("Translate to {lang}: {text}").unwrap();
//! let out = t.render(&[("lang", "French"), ("text", "hello")]).unwrap();
//! assert_eq!(out, "Translate to French: hello");
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("unclosed '{{' at byte {0}")]
    UnclosedSlot(usize),
    #[error("unmatched '}}' at byte {0}")]
    UnmatchedBrace(usize),
    #[error("invalid slot name '{0}'")]
    InvalidSlotName(String),
    #[error("missing value for slot '{0}'")]
    MissingValue(String),
    #[error("template has no slot named '{0}'")]
    UnknownSlot(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    slots: Vec<String>,
}

impl PromptTemplate {
    pub fn parse(template: &str) -> Result<Self, PromptError> {
        let mut segments = Vec::new();
        let mut slots: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(PromptError::UnclosedSlot(pos));
                    }
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(PromptError::InvalidSlotName(name));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    if !slots.contains(&name) {
                        slots.push(name.clone());
                    }
                    segments.push(Segment::Slot(name));
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(PromptError::UnmatchedBrace(pos));
                    }
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments, slots })
    }

    /// Slot names in order of first appearance.
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// Fill every slot. Each slot must be given exactly the values it declares.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, PromptError> {
        for (name, _) in values {
            if !self.slots.iter().any(|s| s == name) {
                return Err(PromptError::UnknownSlot(name.to_string()));
            }
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let value = values
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| PromptError::MissingValue(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_in_order() {
        let t = PromptTemplate::parse("{b} then {a} then {b}").unwrap();
        assert_eq!(t.slots(), &["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_escaped_braces() {
        let t = PromptTemplate::parse("{{literal}} {x}").unwrap();
        assert_eq!(t.render(&[("x", "1")]).unwrap(), "{literal} 1");
    }

    #[test]
    fn test_missing_value() {
        let t = PromptTemplate::parse("Q: {question}").unwrap();
        assert_eq!(
            t.render(&[]),
            Err(PromptError::MissingValue("question".to_string()))
        );
    }

    #[test]
    fn test_unknown_value() {
        let t = PromptTemplate::parse("Q: {question}").unwrap();
        assert_eq!(
            t.render(&[("question", "x"), ("qeustion", "y")]),
            Err(PromptError::UnknownSlot("qeustion".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            PromptTemplate::parse("abc {oops"),
            Err(PromptError::UnclosedSlot(4))
        );
        assert_eq!(
            PromptTemplate::parse("abc } def"),
            Err(PromptError::UnmatchedBrace(4))
        );
        assert!(matches!(
            PromptTemplate::parse("{has space}"),
            Err(PromptError::InvalidSlotName(_))
        ));
        assert!(matches!(
            PromptTemplate::parse("{}"),
            Err(PromptError::InvalidSlotName(_))
        ));
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let t = PromptTemplate::parse("C: {context}\nQ: {question}").unwrap();
        let out = t
            .render(&[("context", "facts"), ("question", "what is {context}?")])
            .unwrap();
        assert_eq!(out, "C: facts\nQ: what is {context}?");
    }
}
