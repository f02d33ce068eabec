//! Structural comparison of applied and desired stack state.

use super::{RemoteStack, StackRequest, UpdateStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Sections compared entry by entry; other template keys compare whole.
const KEYED_SECTIONS: [&str; 2] = ["Resources", "Outputs"];

/// Parameter declarations surface through the parameter values instead.
const SKIPPED_SECTIONS: [&str; 1] = ["Parameters"];

/// What happened to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present only in the desired state.
    Added,
    /// Present only in the applied state.
    Removed,
    /// Present in both with different content.
    Modified,
}

impl ChangeKind {
    fn symbol(self) -> char {
        match self {
            Self::Added => '+',
            Self::Removed => '-',
            Self::Modified => '~',
        }
    }
}

/// Which part of the stack changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeScope {
    /// The template body.
    Template,
    /// A parameter value.
    Parameter,
    /// A stack tag.
    Tag,
}

/// One difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Which part changed.
    pub scope: ChangeScope,
    /// Dotted path within the scope, e.g. `Resources.Bucket`.
    pub path: String,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Applied value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    /// Desired value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    /// The resource will be replaced rather than modified in place.
    #[serde(default)]
    pub replacement: bool,
}

impl Change {
    fn new(
        scope: ChangeScope,
        path: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        let kind = match (&before, &after) {
            (None, _) => ChangeKind::Added,
            (_, None) => ChangeKind::Removed,
            _ => ChangeKind::Modified,
        };
        Self {
            scope,
            path: path.into(),
            kind,
            before,
            after,
            replacement: false,
        }
    }

    /// Renders the change as one line.
    #[must_use]
    pub fn line(&self) -> String {
        let mut line = format!("{} {}", self.kind.symbol(), self.path);
        if self.scope != ChangeScope::Template {
            let show = |v: &Option<serde_json::Value>| {
                v.as_ref().map_or_else(|| "<none>".to_string(), ToString::to_string)
            };
            match self.kind {
                ChangeKind::Added => line.push_str(&format!(" = {}", show(&self.after))),
                ChangeKind::Removed => {}
                ChangeKind::Modified => {
                    line.push_str(&format!(": {} -> {}", show(&self.before), show(&self.after)));
                }
            }
        }
        if self.replacement {
            line.push_str(" (replacement)");
        }
        line
    }
}

/// The differences between applied and desired state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackDiff {
    /// Changes ordered by scope then path.
    pub changes: Vec<Change>,
}

impl StackDiff {
    /// Compares an existing stack with a request.
    #[must_use]
    pub fn between(current: &RemoteStack, desired: &StackRequest) -> Self {
        let mut changes = Vec::new();

        let same_template = !current.fingerprint.is_empty()
            && current.fingerprint == desired.fingerprint;
        if !same_template {
            diff_template(&current.template, &desired.template, &mut changes);
        }
        diff_strings(ChangeScope::Parameter, "Parameters", &current.parameters, &desired.parameters, &mut changes);
        diff_strings(ChangeScope::Tag, "Tags", &current.tags, &desired.tags, &mut changes);

        changes.sort_by(|a, b| (a.scope, &a.path).cmp(&(b.scope, &b.path)));
        Self { changes }
    }

    /// Describes a stack that does not exist yet: everything is added.
    #[must_use]
    pub fn creation(desired: &StackRequest) -> Self {
        let empty = RemoteStack {
            fqn: desired.fqn.clone(),
            template: serde_json::Value::Object(serde_json::Map::new()),
            parameters: BTreeMap::new(),
            outputs: BTreeMap::new(),
            tags: BTreeMap::new(),
            fingerprint: String::new(),
        };
        Self::between(&empty, desired)
    }

    /// Marks modified resources as replacements under `ReplacementsOnly`.
    ///
    /// Added and removed resources are left alone.
    #[must_use]
    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        if strategy == UpdateStrategy::ReplacementsOnly {
            for change in &mut self.changes {
                change.replacement = change.scope == ChangeScope::Template
                    && change.kind == ChangeKind::Modified
                    && change.path.starts_with("Resources.");
            }
        }
        self
    }

    /// Returns true if nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Counts changes of one kind.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    /// Renders one line per change.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.changes.iter().map(Change::line).collect()
    }
}

impl fmt::Display for StackDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn diff_template(current: &serde_json::Value, desired: &serde_json::Value, changes: &mut Vec<Change>) {
    let empty = serde_json::Map::new();
    let current = current.as_object().unwrap_or(&empty);
    let desired = desired.as_object().unwrap_or(&empty);

    let keys: BTreeSet<&String> = current.keys().chain(desired.keys()).collect();
    for key in keys {
        let before = current.get(key);
        let after = desired.get(key);
        if before == after || SKIPPED_SECTIONS.contains(&key.as_str()) {
            continue;
        }
        if KEYED_SECTIONS.contains(&key.as_str()) {
            diff_section(key, before, after, changes);
        } else {
            changes.push(Change::new(ChangeScope::Template, key.clone(), before.cloned(), after.cloned()));
        }
    }
}

fn diff_section(
    section: &str,
    current: Option<&serde_json::Value>,
    desired: Option<&serde_json::Value>,
    changes: &mut Vec<Change>,
) {
    let empty = serde_json::Map::new();
    let current = current.and_then(serde_json::Value::as_object).unwrap_or(&empty);
    let desired = desired.and_then(serde_json::Value::as_object).unwrap_or(&empty);

    let names: BTreeSet<&String> = current.keys().chain(desired.keys()).collect();
    for name in names {
        let before = current.get(name);
        let after = desired.get(name);
        if before != after {
            changes.push(Change::new(
                ChangeScope::Template,
                format!("{section}.{name}"),
                before.cloned(),
                after.cloned(),
            ));
        }
    }
}

fn diff_strings(
    scope: ChangeScope,
    prefix: &str,
    current: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
    changes: &mut Vec<Change>,
) {
    let names: BTreeSet<&String> = current.keys().chain(desired.keys()).collect();
    for name in names {
        let before = current.get(name);
        let after = desired.get(name);
        if before != after {
            let to_value = |v: &String| serde_json::Value::String(v.clone());
            changes.push(Change::new(
                scope,
                format!("{prefix}.{name}"),
                before.map(to_value),
                after.map(to_value),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(template: serde_json::Value, params: &[(&str, &str)]) -> StackRequest {
        StackRequest::new(
            "ns-app",
            template,
            params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_identical_state_has_no_changes() {
        let desired = request(json!({"Resources": {"A": {"Type": "X"}}}), &[("Size", "1")]);
        let current = RemoteStack::from_request(&desired);

        assert!(StackDiff::between(&current, &desired).is_empty());
    }

    #[test]
    fn test_resource_and_parameter_changes() {
        let applied = request(
            json!({"Resources": {"A": {"Type": "X"}, "B": {"Type": "Y"}}}),
            &[("Size", "small")],
        );
        let current = RemoteStack::from_request(&applied);
        let desired = request(
            json!({"Resources": {"A": {"Type": "X2"}, "C": {"Type": "Z"}}}),
            &[("Size", "large")],
        );

        let diff = StackDiff::between(&current, &desired);
        assert_eq!(
            diff.lines(),
            vec![
                "~ Resources.A",
                "- Resources.B",
                "+ Resources.C",
                "~ Parameters.Size: \"small\" -> \"large\"",
            ]
        );
        assert_eq!(diff.count(ChangeKind::Added), 1);
        assert_eq!(diff.count(ChangeKind::Removed), 1);
    }

    #[test]
    fn test_replacements_only_tolerates_additions() {
        let applied = request(json!({"Resources": {"A": {"Type": "X"}}}), &[]);
        let current = RemoteStack::from_request(&applied);
        let desired = request(
            json!({"Resources": {"A": {"Type": "X2"}, "New": {"Type": "Y"}}}),
            &[],
        );

        let diff = StackDiff::between(&current, &desired).with_strategy(UpdateStrategy::ReplacementsOnly);
        assert_eq!(diff.lines(), vec!["~ Resources.A (replacement)", "+ Resources.New"]);
    }

    #[test]
    fn test_creation_diff() {
        let desired = request(json!({"Resources": {"A": {"Type": "X"}}}), &[("Size", "1")]);
        let diff = StackDiff::creation(&desired);

        assert_eq!(diff.lines(), vec!["+ Resources.A", "+ Parameters.Size = \"1\""]);
    }

    #[test]
    fn test_parameter_declarations_not_listed_twice() {
        let applied = request(json!({"Parameters": {"Size": {}}}), &[("Size", "1")]);
        let current = RemoteStack::from_request(&applied);
        let desired = request(
            json!({"Parameters": {"Size": {}, "Count": {"Default": "2"}}}),
            &[("Size", "1"), ("Count", "2")],
        );

        let diff = StackDiff::between(&current, &desired);
        assert_eq!(diff.lines(), vec!["+ Parameters.Count = \"2\""]);
    }

    #[test]
    fn test_whole_section_compare() {
        let applied = request(json!({"Description": "old"}), &[]);
        let current = RemoteStack::from_request(&applied);
        let desired = request(json!({"Description": "new"}), &[]);

        let diff = StackDiff::between(&current, &desired);
        assert_eq!(diff.lines(), vec!["~ Description"]);
        assert_eq!(diff.to_string(), "~ Description\n");
    }
}
