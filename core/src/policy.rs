use serde::{Deserialize, Deserializer, Serialize};

use crate::form::{FlagId, InputId};

/// Decides whether a field group is shown, from the state of the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityPolicy {
    /// Shown while a toggle is checked. With `value`, only while the checked
    /// toggle carries exactly that value.
    ShowWhenChecked {
        input: InputId,
        #[serde(default)]
        value: Option<String>,
    },
    /// Shown while the input selects one of `allowed` (exact string match).
    ShowWhenValueIn {
        input: InputId,
        allowed: TriggerValues,
    },
    /// Shown while an override flag is active.
    ShowWhenFlagged { flag: FlagId },
}

impl VisibilityPolicy {
    pub fn checked(input: impl Into<InputId>) -> Self {
        VisibilityPolicy::ShowWhenChecked {
            input: input.into(),
            value: None,
        }
    }

    pub fn value_in(input: impl Into<InputId>, allowed: &[&str]) -> Self {
        VisibilityPolicy::ShowWhenValueIn {
            input: input.into(),
            allowed: TriggerValues::new(allowed.iter().copied()),
        }
    }

    pub fn flagged(flag: impl Into<FlagId>) -> Self {
        VisibilityPolicy::ShowWhenFlagged { flag: flag.into() }
    }

    /// The input this policy reads, if any.
    pub fn controlling_input(&self) -> Option<&str> {
        match self {
            VisibilityPolicy::ShowWhenChecked { input, .. }
            | VisibilityPolicy::ShowWhenValueIn { input, .. } => Some(input.as_str()),
            VisibilityPolicy::ShowWhenFlagged { .. } => None,
        }
    }

    /// Whether the controlling input's selected values satisfy this policy.
    /// `None` for flag policies, which read no input.
    pub fn matches_selection(&self, selected: &[&str]) -> Option<bool> {
        match self {
            VisibilityPolicy::ShowWhenChecked { value, .. } => Some(match value {
                Some(expected) => selected.contains(&expected.as_str()),
                None => !selected.is_empty(),
            }),
            VisibilityPolicy::ShowWhenValueIn { allowed, .. } => {
                Some(selected.iter().any(|v| allowed.contains(v)))
            }
            VisibilityPolicy::ShowWhenFlagged { .. } => None,
        }
    }

    /// The value that, selected on the controlling input, shows the group.
    pub fn enabling_value(&self) -> Option<&str> {
        match self {
            VisibilityPolicy::ShowWhenChecked { value, .. } => value.as_deref(),
            VisibilityPolicy::ShowWhenValueIn { allowed, .. } => allowed.first(),
            VisibilityPolicy::ShowWhenFlagged { .. } => None,
        }
    }
}

/// Ordered, de-duplicated trigger values.
///
/// Deserializes from a list or from a comma-separated string as written in
/// markup (`data-toggle-value="yes,maybe"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TriggerValues(Vec<String>);

impl TriggerValues {
    pub fn new<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut out: Vec<String> = Vec::new();
        for value in values {
            if !out.iter().any(|v| v == value) {
                out.push(value.to_string());
            }
        }
        TriggerValues(out)
    }

    pub fn parse_markup(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for TriggerValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Markup(String),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Markup(raw) => TriggerValues::parse_markup(&raw),
            Raw::List(list) => TriggerValues::new(list.iter().map(String::as_str)),
        })
    }
}

/// A policy together with what happens to the group's values when it hides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRule {
    pub policy: VisibilityPolicy,
    /// Reset contained inputs when the group is hidden
    #[serde(default)]
    pub clear_on_hide: bool,
    /// Flag that forces this group hidden and cleared while active
    #[serde(default)]
    pub overridden_by: Option<FlagId>,
}

impl GroupRule {
    pub fn new(policy: VisibilityPolicy) -> Self {
        Self {
            policy,
            clear_on_hide: false,
            overridden_by: None,
        }
    }

    pub fn clear_on_hide(mut self) -> Self {
        self.clear_on_hide = true;
        self
    }

    pub fn overridden_by(mut self, flag: impl Into<FlagId>) -> Self {
        self.overridden_by = Some(flag.into());
        self
    }
}

impl From<VisibilityPolicy> for GroupRule {
    fn from(policy: VisibilityPolicy) -> Self {
        GroupRule::new(policy)
    }
}

/// A cross-cutting flag raised by selecting an exclusive option.
///
/// While active it replaces the policy of every group that names it in
/// `overridden_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideFlag {
    pub trigger: InputId,
    pub exclusive: TriggerValues,
    pub active: bool,
}

impl OverrideFlag {
    pub fn new(trigger: impl Into<InputId>, exclusive: TriggerValues) -> Self {
        Self {
            trigger: trigger.into(),
            exclusive,
            active: false,
        }
    }

    /// Whether the trigger's submitted values select an exclusive option.
    pub fn selects_exclusive(&self, selected: &[&str]) -> bool {
        selected.iter().any(|v| self.exclusive.contains(v))
    }
}
