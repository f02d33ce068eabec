//! Lookup grammar.
//!
//! Variables may contain `${key}` (environment) and
//! `${output Stack::Key}` (another stack's output) expressions, either as
//! the whole value or embedded in a longer string. Lookups inside sequences
//! and mappings are found recursively.

mod resolver;

pub use resolver::{
    value_to_string, verify_environment, ResolveMode, ResolvedVariables, VariableResolver,
};

use crate::config::StackDefinition;
use crate::errors::LookupSyntaxError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const OUTPUT_PREFIX: &str = "output";
const OUTPUT_SEPARATOR: &str = "::";

fn lookup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"\$\{([^}]*)\}").expect("lookup pattern is a valid regex")
    })
}

/// A deferred value inside a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lookup {
    /// `${key}`
    Environment {
        /// The environment key.
        key: String,
    },
    /// `${output Stack::Key}`
    Output {
        /// The stack publishing the output.
        stack: String,
        /// The output name.
        key: String,
    },
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment { key } => write!(f, "${{{key}}}"),
            Self::Output { stack, key } => write!(f, "${{output {stack}::{key}}}"),
        }
    }
}

/// A piece of a parsed string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied verbatim.
    Literal(String),
    /// A lookup to substitute.
    Lookup(Lookup),
}

/// Why an expression was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLookup {
    /// The full `${...}` text.
    pub expression: String,
    /// What is wrong with it.
    pub message: String,
}

impl MalformedLookup {
    fn new(expression: &str, message: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            message: message.into(),
        }
    }

    /// Attaches stack and variable context.
    #[must_use]
    pub fn in_variable(self, stack: &str, variable: &str) -> LookupSyntaxError {
        LookupSyntaxError::new(stack, variable, self.expression, self.message)
    }
}

/// Splits a string into literals and lookups.
pub fn parse(text: &str) -> Result<Vec<Segment>, MalformedLookup> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for captures in lookup_pattern().captures_iter(text) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(Segment::Literal(text[cursor..whole.start()].to_string()));
        }
        segments.push(Segment::Lookup(parse_expression(whole.as_str(), inner.as_str())?));
        cursor = whole.end();
    }

    if cursor < text.len() {
        segments.push(Segment::Literal(text[cursor..].to_string()));
    }
    Ok(segments)
}

fn parse_expression(expression: &str, inner: &str) -> Result<Lookup, MalformedLookup> {
    let inner = inner.trim();
    if inner.is_empty() {
        return Err(MalformedLookup::new(expression, "empty lookup"));
    }

    let mut words = inner.splitn(2, char::is_whitespace);
    let head = words.next().unwrap_or_default();
    let rest = words.next().map(str::trim);

    match rest {
        None => Ok(Lookup::Environment {
            key: head.to_string(),
        }),
        Some(target) if head == OUTPUT_PREFIX => {
            let Some((stack, key)) = target.split_once(OUTPUT_SEPARATOR) else {
                return Err(MalformedLookup::new(
                    expression,
                    "output lookups must look like ${output Stack::Key}",
                ));
            };
            let (stack, key) = (stack.trim(), key.trim());
            if stack.is_empty() || key.is_empty() {
                return Err(MalformedLookup::new(
                    expression,
                    "output lookups need both a stack and a key",
                ));
            }
            Ok(Lookup::Output {
                stack: stack.to_string(),
                key: key.to_string(),
            })
        }
        Some(_) => Err(MalformedLookup::new(
            expression,
            format!("unknown lookup type \"{head}\""),
        )),
    }
}

/// Collects every lookup inside a raw value, in document order.
pub fn lookups_in(value: &serde_json::Value) -> Result<Vec<Lookup>, MalformedLookup> {
    let mut found = Vec::new();
    collect(value, &mut found)?;
    Ok(found)
}

fn collect(value: &serde_json::Value, found: &mut Vec<Lookup>) -> Result<(), MalformedLookup> {
    match value {
        serde_json::Value::String(text) => {
            for segment in parse(text)? {
                if let Segment::Lookup(lookup) = segment {
                    found.push(lookup);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect(item, found)?;
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect(item, found)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Returns the stacks whose outputs a definition consumes, in first-use order.
pub fn output_dependencies(definition: &StackDefinition) -> Result<Vec<String>, LookupSyntaxError> {
    let mut stacks: Vec<String> = Vec::new();
    for (variable, value) in &definition.variables {
        let lookups = lookups_in(value).map_err(|e| e.in_variable(&definition.name, variable))?;
        for lookup in lookups {
            if let Lookup::Output { stack, .. } = lookup {
                if !stacks.contains(&stack) {
                    stacks.push(stack);
                }
            }
        }
    }
    Ok(stacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn env(key: &str) -> Segment {
        Segment::Lookup(Lookup::Environment {
            key: key.to_string(),
        })
    }

    fn output(stack: &str, key: &str) -> Segment {
        Segment::Lookup(Lookup::Output {
            stack: stack.to_string(),
            key: key.to_string(),
        })
    }

    #[test]
    fn test_parse_plain_string() {
        assert_eq!(
            parse("hello").unwrap(),
            vec![Segment::Literal("hello".to_string())]
        );
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_whole_lookups() {
        assert_eq!(parse("${region}").unwrap(), vec![env("region")]);
        assert_eq!(
            parse("${output vpc::VpcId}").unwrap(),
            vec![output("vpc", "VpcId")]
        );
        assert_eq!(
            parse("${ output  vpc :: VpcId }").unwrap(),
            vec![output("vpc", "VpcId")]
        );
    }

    #[test]
    fn test_parse_embedded_lookups() {
        assert_eq!(
            parse("arn:${partition}:s3:::${output bucket::Name}/*").unwrap(),
            vec![
                Segment::Literal("arn:".to_string()),
                env("partition"),
                Segment::Literal(":s3:::".to_string()),
                output("bucket", "Name"),
                Segment::Literal("/*".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_lookups() {
        assert!(parse("${}").is_err());
        assert!(parse("${output vpc}").is_err());
        assert!(parse("${output ::Key}").is_err());
        let err = parse("${xref vpc::Id}").unwrap_err();
        assert!(err.message.contains("xref"));
    }

    #[test]
    fn test_lookup_display() {
        let lookup = Lookup::Output {
            stack: "vpc".to_string(),
            key: "VpcId".to_string(),
        };
        assert_eq!(lookup.to_string(), "${output vpc::VpcId}");
        assert_eq!(
            Lookup::Environment { key: "k".to_string() }.to_string(),
            "${k}"
        );
    }

    #[test]
    fn test_lookups_in_nested_values() {
        let value = json!({
            "subnets": ["${output vpc::SubnetA}", "${output vpc::SubnetB}"],
            "name": "app-${env}",
            "count": 3
        });
        let lookups = lookups_in(&value).unwrap();
        assert_eq!(lookups.len(), 3);
    }

    #[test]
    fn test_output_dependencies_deduplicated() {
        let definition = StackDefinition::new("app", "app.json")
            .with_variable("A", json!("${output vpc::A}"))
            .with_variable("B", json!("${output vpc::B}"))
            .with_variable("C", json!("${output db::Endpoint}"))
            .with_variable("D", json!("${region}"));

        assert_eq!(
            output_dependencies(&definition).unwrap(),
            vec!["vpc".to_string(), "db".to_string()]
        );
    }

    #[test]
    fn test_output_dependencies_syntax_error_has_context() {
        let definition =
            StackDefinition::new("app", "app.json").with_variable("Bad", json!("${output vpc}"));
        let err = output_dependencies(&definition).unwrap_err();
        assert_eq!(err.stack, "app");
        assert_eq!(err.variable, "Bad");
    }
}
