use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type InputId = String;
pub type GroupId = String;
pub type FlagId = String;

/// The kind of form control an input is rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Single checkbox
    Toggle,
    /// Radio set sharing one name
    Choice,
    Select,
    Text,
}

impl InputKind {
    /// Whether an input of this kind may drive a visibility policy.
    pub fn can_control(self) -> bool {
        !matches!(self, InputKind::Text)
    }
}

/// Current state of a form control, as rendered by the server or edited by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputValue {
    Toggle {
        /// The checkbox's `value` attribute
        value: String,
        #[serde(default)]
        checked: bool,
    },
    Choice {
        options: Vec<String>,
        #[serde(default)]
        selected: Option<String>,
    },
    Select {
        options: Vec<String>,
        #[serde(default)]
        selected: Option<String>,
    },
    Text {
        #[serde(default)]
        value: String,
    },
}

impl InputValue {
    pub fn kind(&self) -> InputKind {
        match self {
            InputValue::Toggle { .. } => InputKind::Toggle,
            InputValue::Choice { .. } => InputKind::Choice,
            InputValue::Select { .. } => InputKind::Select,
            InputValue::Text { .. } => InputKind::Text,
        }
    }
}

/// A user-visible edit to a single input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputChange {
    Checked(bool),
    Selected(Option<String>),
    Text(String),
}

impl InputChange {
    /// Parse a textual change for an input of the given kind.
    ///
    /// Toggles accept `true/false`, `on/off`, `yes/no` and `checked/unchecked`.
    /// An empty string deselects a choice or select.
    pub fn from_raw(kind: InputKind, raw: &str) -> Option<Self> {
        match kind {
            InputKind::Toggle => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "checked" | "1" => Some(InputChange::Checked(true)),
                "false" | "off" | "no" | "unchecked" | "0" => Some(InputChange::Checked(false)),
                _ => None,
            },
            InputKind::Choice | InputKind::Select => {
                if raw.is_empty() {
                    Some(InputChange::Selected(None))
                } else {
                    Some(InputChange::Selected(Some(raw.to_string())))
                }
            }
            InputKind::Text => Some(InputChange::Text(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInput {
    pub id: InputId,
    #[serde(flatten)]
    pub value: InputValue,
}

impl FormInput {
    pub fn new(id: impl Into<InputId>, value: InputValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    pub fn toggle(id: impl Into<InputId>, value: &str, checked: bool) -> Self {
        Self::new(
            id,
            InputValue::Toggle {
                value: value.to_string(),
                checked,
            },
        )
    }

    pub fn choice(id: impl Into<InputId>, options: &[&str], selected: Option<&str>) -> Self {
        Self::new(
            id,
            InputValue::Choice {
                options: options.iter().map(|o| o.to_string()).collect(),
                selected: selected.map(str::to_string),
            },
        )
    }

    pub fn select(id: impl Into<InputId>, options: &[&str], selected: Option<&str>) -> Self {
        Self::new(
            id,
            InputValue::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
                selected: selected.map(str::to_string),
            },
        )
    }

    pub fn text(id: impl Into<InputId>, value: &str) -> Self {
        Self::new(
            id,
            InputValue::Text {
                value: value.to_string(),
            },
        )
    }

    pub fn kind(&self) -> InputKind {
        self.value.kind()
    }

    /// The values this input would currently submit with the form.
    pub fn selected_values(&self) -> Vec<&str> {
        match &self.value {
            InputValue::Toggle { value, checked } => {
                if *checked {
                    vec![value.as_str()]
                } else {
                    Vec::new()
                }
            }
            InputValue::Choice { selected, .. } | InputValue::Select { selected, .. } => {
                selected.as_deref().into_iter().collect()
            }
            InputValue::Text { value } => {
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![value.as_str()]
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected_values().is_empty()
    }

    /// Reset to the empty state. Returns `true` when something was cleared.
    pub fn clear(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }
        match &mut self.value {
            InputValue::Toggle { checked, .. } => *checked = false,
            InputValue::Choice { selected, .. } | InputValue::Select { selected, .. } => {
                *selected = None
            }
            InputValue::Text { value } => value.clear(),
        }
        true
    }

    /// Apply a change of matching kind. Returns `false` (leaving the input
    /// untouched) for mismatched kinds or unknown options.
    pub fn apply(&mut self, change: InputChange) -> bool {
        match (&mut self.value, change) {
            (InputValue::Toggle { checked, .. }, InputChange::Checked(next)) => {
                *checked = next;
                true
            }
            (
                InputValue::Choice { options, selected } | InputValue::Select { options, selected },
                InputChange::Selected(next),
            ) => {
                if let Some(value) = next.as_deref() {
                    if !options.iter().any(|o| o == value) {
                        return false;
                    }
                }
                *selected = next;
                true
            }
            (InputValue::Text { value }, InputChange::Text(next)) => {
                *value = next;
                true
            }
            _ => false,
        }
    }

    /// The change that would make this input submit `value`.
    pub fn enabling_change(&self, value: Option<&str>) -> Option<InputChange> {
        match self.kind() {
            InputKind::Toggle => Some(InputChange::Checked(true)),
            InputKind::Choice | InputKind::Select => {
                value.map(|v| InputChange::Selected(Some(v.to_string())))
            }
            InputKind::Text => None,
        }
    }
}

/// A cluster of dependent inputs shown or hidden together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub id: GroupId,
    /// Dependent inputs in document order
    #[serde(default)]
    pub members: Vec<InputId>,
    /// Enclosing group, for nested sections
    #[serde(default)]
    pub parent: Option<GroupId>,
    /// Visibility as currently rendered
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl FieldGroup {
    pub fn new(id: impl Into<GroupId>, members: &[&str]) -> Self {
        Self {
            id: id.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            parent: None,
            visible: true,
        }
    }

    pub fn nested_in(mut self, parent: impl Into<GroupId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// The inputs and field groups present on a page.
#[derive(Debug, Clone, Default)]
pub struct Form {
    inputs: BTreeMap<InputId, FormInput>,
    groups: BTreeMap<GroupId, FieldGroup>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, input: FormInput) {
        self.inputs.insert(input.id.clone(), input);
    }

    pub fn add_group(&mut self, group: FieldGroup) {
        self.groups.insert(group.id.clone(), group);
    }

    pub fn with_input(mut self, input: FormInput) -> Self {
        self.add_input(input);
        self
    }

    pub fn with_group(mut self, group: FieldGroup) -> Self {
        self.add_group(group);
        self
    }

    pub fn input(&self, id: &str) -> Option<&FormInput> {
        self.inputs.get(id)
    }

    pub fn group(&self, id: &str) -> Option<&FieldGroup> {
        self.groups.get(id)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &FormInput> {
        self.inputs.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &FieldGroup> {
        self.groups.values()
    }

    pub(crate) fn input_mut(&mut self, id: &str) -> Option<&mut FormInput> {
        self.inputs.get_mut(id)
    }

    pub(crate) fn group_mut(&mut self, id: &str) -> Option<&mut FieldGroup> {
        self.groups.get_mut(id)
    }

    /// Groups that list `input` among their members.
    pub fn groups_containing(&self, input: &str) -> Vec<GroupId> {
        self.groups
            .values()
            .filter(|g| g.members.iter().any(|m| m == input))
            .map(|g| g.id.clone())
            .collect()
    }

    /// Groups whose direct parent is `group`.
    pub fn children_of(&self, group: &str) -> Vec<GroupId> {
        self.groups
            .values()
            .filter(|g| g.parent.as_deref() == Some(group))
            .map(|g| g.id.clone())
            .collect()
    }

    /// Nesting depth of a group; bounded so malformed parent chains terminate.
    pub fn depth(&self, group: &str) -> usize {
        let mut depth = 0;
        let mut current = self.groups.get(group).and_then(|g| g.parent.as_deref());
        while let Some(parent) = current {
            depth += 1;
            if depth > self.groups.len() {
                break;
            }
            current = self.groups.get(parent).and_then(|g| g.parent.as_deref());
        }
        depth
    }

    /// Apply a change to an input. Unknown inputs and invalid changes are ignored.
    pub fn apply_change(&mut self, id: &str, change: InputChange) -> bool {
        let Some(input) = self.inputs.get_mut(id) else {
            tracing::debug!(input = id, "change for unknown input ignored");
            return false;
        };
        let applied = input.apply(change);
        if !applied {
            tracing::warn!(input = id, kind = ?input.kind(), "rejected change that does not fit input");
        }
        applied
    }
}
