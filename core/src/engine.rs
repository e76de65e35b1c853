use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::error::{EngineError, TargetKind};
use crate::form::{FlagId, Form, GroupId, InputChange, InputId, InputKind};
use crate::policy::{GroupRule, OverrideFlag, TriggerValues, VisibilityPolicy};

/// The outcome of applying one group's rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupUpdate {
    pub group: GroupId,
    pub visible: bool,
    /// Visibility differs from what was rendered before
    pub changed: bool,
    /// Inputs reset to empty as part of this update
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleared: Vec<InputId>,
    /// Text input that should take focus after the group appears
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<InputId>,
}

/// Serializable view of everything collaborators can observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibilitySnapshot {
    pub groups: BTreeMap<GroupId, bool>,
    pub flags: BTreeMap<FlagId, bool>,
    pub values: BTreeMap<InputId, Vec<String>>,
}

/// Keeps field group visibility equal to the registered policies.
///
/// Every mutating operation settles the whole page before returning, so a
/// caller never observes a group whose visibility disagrees with its policy.
#[derive(Debug, Clone, Default)]
pub struct VisibilityEngine {
    form: Form,
    rules: BTreeMap<GroupId, GroupRule>,
    flags: BTreeMap<FlagId, OverrideFlag>,
    /// controlling input -> groups whose policy reads it
    dependents: BTreeMap<InputId, BTreeSet<GroupId>>,
}

impl VisibilityEngine {
    pub fn new(form: Form) -> Self {
        Self {
            form,
            ..Self::default()
        }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    /// Associate a group with a rule, replacing any earlier one.
    pub fn register_policy(
        &mut self,
        group: impl Into<GroupId>,
        rule: impl Into<GroupRule>,
    ) -> Result<(), EngineError> {
        let group = group.into();
        let rule = rule.into();
        if self.form.group(&group).is_none() {
            return Err(EngineError::PolicyTargetMissing {
                target: TargetKind::Group,
                id: group,
            });
        }
        self.check_nesting(&group)?;

        if let Some(previous) = self.rules.remove(&group) {
            if let Some(input) = previous.policy.controlling_input() {
                if let Some(set) = self.dependents.get_mut(input) {
                    set.remove(&group);
                }
            }
        }

        if let Some(input) = rule.policy.controlling_input() {
            match self.form.input(input) {
                None => tracing::warn!(
                    group = %group,
                    input,
                    "policy reads an input that is not on the page; group left as rendered"
                ),
                Some(found) if !found.kind().can_control() => tracing::warn!(
                    group = %group,
                    input,
                    "policy reads a text input; it will only match exact values"
                ),
                Some(_) => {}
            }
            self.dependents
                .entry(input.to_string())
                .or_default()
                .insert(group.clone());
        }

        tracing::debug!(group = %group, policy = ?rule.policy, "registered visibility policy");
        self.rules.insert(group, rule);
        Ok(())
    }

    /// Declare an override flag raised when `trigger` selects one of `exclusive`.
    pub fn register_flag(
        &mut self,
        flag: impl Into<FlagId>,
        trigger: impl Into<InputId>,
        exclusive: TriggerValues,
    ) -> Result<(), EngineError> {
        let flag = flag.into();
        let trigger = trigger.into();
        let Some(input) = self.form.input(&trigger) else {
            return Err(EngineError::PolicyTargetMissing {
                target: TargetKind::Input,
                id: trigger,
            });
        };
        let selected = input.selected_values();
        let mut declared = OverrideFlag::new(trigger, exclusive);
        declared.active = declared.selects_exclusive(&selected);
        self.flags.insert(flag, declared);
        Ok(())
    }

    pub fn rule(&self, group: &str) -> Option<&GroupRule> {
        self.rules.get(group)
    }

    pub fn is_visible(&self, group: &str) -> Option<bool> {
        self.form.group(group).map(|g| g.visible)
    }

    pub fn flag_active(&self, flag: &str) -> Option<bool> {
        self.flags.get(flag).map(|f| f.active)
    }

    /// Whether `group` should be shown given the current page state.
    ///
    /// `None` when the group, its rule, or anything the rule reads is missing;
    /// such groups keep whatever visibility the server rendered.
    pub fn evaluate(&self, group: &str) -> Option<bool> {
        self.evaluate_bounded(group, self.form.groups().count())
    }

    fn evaluate_bounded(&self, group: &str, budget: usize) -> Option<bool> {
        let found = self.form.group(group)?;
        let rule = self.rules.get(group)?;

        if self.override_active(rule) {
            return Some(false);
        }

        let own = match &rule.policy {
            VisibilityPolicy::ShowWhenFlagged { flag } => self.flags.get(flag)?.active,
            policy => {
                let input = self.form.input(policy.controlling_input()?)?;
                policy.matches_selection(&input.selected_values())?
            }
        };

        // A parent whose own rule cannot be evaluated counts as rendered.
        let parent_visible = match found.parent.as_deref() {
            None => true,
            Some(_) if budget == 0 => return None,
            Some(parent) => self
                .evaluate_bounded(parent, budget - 1)
                .or_else(|| self.form.group(parent).map(|p| p.visible))
                .unwrap_or(true),
        };

        Some(own && parent_visible)
    }

    fn override_active(&self, rule: &GroupRule) -> bool {
        rule.overridden_by
            .as_deref()
            .and_then(|flag| self.flags.get(flag))
            .is_some_and(|flag| flag.active)
    }

    /// Evaluate `group` and render the result, settling any groups affected
    /// by values it clears.
    pub fn apply(&mut self, group: &str) -> Vec<GroupUpdate> {
        let mut queue = VecDeque::new();
        queue.push_back(group.to_string());
        self.settle(queue)
    }

    /// Record a change to a controlling input and re-apply everything that
    /// depends on it.
    pub fn on_controlling_input_changed(
        &mut self,
        input: &str,
        change: InputChange,
    ) -> Vec<GroupUpdate> {
        if !self.form.apply_change(input, change) {
            return Vec::new();
        }
        let affected = self.sync_flags_for(input);
        let mut queue = self.dependents_of(input);
        queue.extend(affected);
        self.settle(self.by_depth(queue))
    }

    /// Record an edit inside a field group. If the group is governed by a
    /// choice, that choice is switched to its enabling value first, so the
    /// edited section stays open across a validation round trip.
    pub fn on_dependent_input_edited(
        &mut self,
        input: &str,
        change: InputChange,
    ) -> Vec<GroupUpdate> {
        if !self.form.apply_change(input, change) {
            return Vec::new();
        }

        let mut updates = Vec::new();
        for group in self.form.groups_containing(input) {
            let Some(rule) = self.rules.get(&group) else {
                continue;
            };
            if self.override_active(rule) {
                continue;
            }
            let Some(controller) = rule.policy.controlling_input() else {
                continue;
            };
            let Some(current) = self.form.input(controller) else {
                continue;
            };
            // Leave a selection that already shows the group alone.
            if rule.policy.matches_selection(&current.selected_values()) == Some(true) {
                continue;
            }
            let enabling = current.enabling_change(rule.policy.enabling_value());
            if let Some(enabling) = enabling {
                let controller = controller.to_string();
                tracing::debug!(group = %group, input = %controller, "preselecting enabling option");
                updates.extend(self.on_controlling_input_changed(&controller, enabling));
            }
        }

        let mut queue = self.dependents_of(input);
        queue.extend(self.sync_flags_for(input));
        updates.extend(self.settle(self.by_depth(queue)));
        updates
    }

    /// Bring every group in line with the values the server rendered, e.g.
    /// after a validation failure echoed the user's selections back.
    pub fn initialize_from_server_state(&mut self) -> Vec<GroupUpdate> {
        let flag_ids: Vec<FlagId> = self.flags.keys().cloned().collect();
        for flag in flag_ids {
            self.sync_flag(&flag);
        }
        let groups: BTreeSet<GroupId> = self.rules.keys().cloned().collect();
        let updates = self.settle(self.by_depth(groups));
        tracing::debug!(updates = updates.len(), "initialized visibility from server state");
        updates
    }

    pub fn snapshot(&self) -> VisibilitySnapshot {
        VisibilitySnapshot {
            groups: self
                .form
                .groups()
                .map(|g| (g.id.clone(), g.visible))
                .collect(),
            flags: self
                .flags
                .iter()
                .map(|(id, f)| (id.clone(), f.active))
                .collect(),
            values: self
                .form
                .inputs()
                .map(|i| {
                    let values: Vec<String> =
                        i.selected_values().into_iter().map(str::to_string).collect();
                    (i.id.clone(), values)
                })
                .collect(),
        }
    }

    fn check_nesting(&self, group: &str) -> Result<(), EngineError> {
        let mut seen = BTreeSet::new();
        let mut current = Some(group);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(EngineError::PolicyCycle {
                    group: group.to_string(),
                });
            }
            current = self.form.group(id).and_then(|g| g.parent.as_deref());
        }
        Ok(())
    }

    fn dependents_of(&self, input: &str) -> BTreeSet<GroupId> {
        self.dependents.get(input).cloned().unwrap_or_default()
    }

    fn by_depth(&self, groups: BTreeSet<GroupId>) -> VecDeque<GroupId> {
        let mut ordered: Vec<GroupId> = groups.into_iter().collect();
        ordered.sort_by_key(|g| self.form.depth(g));
        ordered.into()
    }

    /// Re-derive every flag triggered by `input`. Returns the groups whose
    /// override or flagged policy changed as a result.
    fn sync_flags_for(&mut self, input: &str) -> BTreeSet<GroupId> {
        let flags: Vec<FlagId> = self
            .flags
            .iter()
            .filter(|(_, f)| f.trigger == input)
            .map(|(id, _)| id.clone())
            .collect();

        let mut affected = BTreeSet::new();
        for flag in flags {
            if self.sync_flag(&flag) {
                affected.extend(self.groups_reading_flag(&flag));
            }
        }
        affected
    }

    /// Returns `true` when the flag changed state.
    fn sync_flag(&mut self, flag: &str) -> bool {
        let Some(declared) = self.flags.get(flag) else {
            return false;
        };
        let selected = self
            .form
            .input(&declared.trigger)
            .map(|i| declared.selects_exclusive(&i.selected_values()))
            .unwrap_or(false);
        let Some(declared) = self.flags.get_mut(flag) else {
            return false;
        };
        if declared.active == selected {
            return false;
        }
        declared.active = selected;
        tracing::info!(flag, active = selected, "override flag changed");
        true
    }

    fn groups_reading_flag(&self, flag: &str) -> BTreeSet<GroupId> {
        self.rules
            .iter()
            .filter(|(_, rule)| {
                rule.overridden_by.as_deref() == Some(flag)
                    || matches!(&rule.policy, VisibilityPolicy::ShowWhenFlagged { flag: f } if f == flag)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Apply queued groups until nothing else changes.
    fn settle(&mut self, mut queue: VecDeque<GroupId>) -> Vec<GroupUpdate> {
        let mut updates: Vec<GroupUpdate> = Vec::new();
        // Clearing only ever empties inputs, so this terminates well inside the budget.
        let mut budget = (self.rules.len() + 1) * (self.form.inputs().count() + 2);

        while let Some(group) = queue.pop_front() {
            if budget == 0 {
                tracing::warn!(group = %group, "visibility settle budget exhausted");
                break;
            }
            budget -= 1;

            let Some(update) = self.apply_one(&group) else {
                continue;
            };
            if !update.changed && update.cleared.is_empty() {
                continue;
            }

            for input in &update.cleared {
                let flagged = self.sync_flags_for(input);
                let mut next = self.dependents_of(input);
                next.extend(flagged);
                queue.extend(self.by_depth(next));
            }
            if update.changed {
                for child in self.form.children_of(&group) {
                    if self.rules.contains_key(&child) {
                        queue.push_back(child);
                    }
                }
            }

            match updates.iter_mut().find(|u| u.group == update.group) {
                Some(existing) => {
                    let rendered = existing.visible != existing.changed;
                    existing.visible = update.visible;
                    existing.changed = rendered != update.visible;
                    existing.cleared.extend(update.cleared);
                    existing.focus = if existing.changed && update.visible {
                        update.focus.or(existing.focus.take())
                    } else {
                        None
                    };
                }
                None => updates.push(update),
            }
        }

        updates
    }

    /// Evaluate one group and render the result. Does not cascade.
    fn apply_one(&mut self, group: &str) -> Option<GroupUpdate> {
        let visible = self.evaluate(group)?;
        let rule = self.rules.get(group)?;
        let clears = !visible && (rule.clear_on_hide || self.override_active(rule));

        let found = self.form.group_mut(group)?;
        let changed = found.visible != visible;
        found.visible = visible;
        let members = found.members.clone();

        let mut cleared = Vec::new();
        if clears {
            for member in &members {
                if let Some(input) = self.form.input_mut(member) {
                    if input.clear() {
                        cleared.push(member.clone());
                    }
                }
            }
        }

        let focus = if changed && visible {
            members
                .first()
                .filter(|m| self.form.input(m).is_some_and(|i| i.kind() == InputKind::Text))
                .cloned()
        } else {
            None
        };

        if changed || !cleared.is_empty() {
            tracing::debug!(group, visible, cleared = cleared.len(), "applied visibility");
        }

        Some(GroupUpdate {
            group: group.to_string(),
            visible,
            changed,
            cleared,
            focus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::VisibilityEngine;
    use crate::error::EngineError;
    use crate::form::{FieldGroup, Form, FormInput, InputChange};
    use crate::policy::{GroupRule, TriggerValues, VisibilityPolicy};

    fn select(value: &str) -> InputChange {
        InputChange::Selected(Some(value.to_string()))
    }

    /// Company car form: fuel type drives CO2 questions, electricity
    /// raises an override that hides the fuel-benefit questions.
    fn car_benefit_engine(fuel: Option<&str>) -> VisibilityEngine {
        let form = Form::new()
            .with_input(FormInput::choice(
                "fuelType",
                &["petrol", "diesel", "electricity"],
                fuel,
            ))
            .with_input(FormInput::text("co2Figure", "130"))
            .with_input(FormInput::toggle("co2NoFigure", "true", false))
            .with_input(FormInput::toggle("fuelProvided", "yes", true))
            .with_input(FormInput::select("fuelWithdrawn", &["jan", "feb"], Some("feb")))
            .with_input(FormInput::text("electricNote", ""))
            .with_group(FieldGroup::new("co2", &["co2Figure", "co2NoFigure"]))
            .with_group(FieldGroup::new("fuelBenefit", &["fuelProvided", "fuelWithdrawn"]))
            .with_group(FieldGroup::new("electricInfo", &["electricNote"]).hidden());

        let mut engine = VisibilityEngine::new(form);
        engine
            .register_flag("electric", "fuelType", TriggerValues::new(["electricity"]))
            .expect("flag trigger exists");
        engine
            .register_policy(
                "co2",
                GroupRule::new(VisibilityPolicy::value_in("fuelType", &["petrol", "diesel"]))
                    .clear_on_hide(),
            )
            .expect("co2 group exists");
        engine
            .register_policy(
                "fuelBenefit",
                GroupRule::new(VisibilityPolicy::value_in(
                    "fuelType",
                    &["petrol", "diesel", "electricity"],
                ))
                .overridden_by("electric"),
            )
            .expect("fuel benefit group exists");
        engine
            .register_policy("electricInfo", VisibilityPolicy::flagged("electric"))
            .expect("electric info group exists");
        engine
    }

    #[test]
    fn evaluate_is_pure_and_repeatable() {
        let engine = car_benefit_engine(Some("petrol"));
        let before = engine.snapshot();
        assert_eq!(engine.evaluate("co2"), Some(true));
        assert_eq!(engine.evaluate("co2"), Some(true));
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn choice_membership_is_exact_string_match() {
        let form = Form::new()
            .with_input(FormInput::choice("count", &["1", "01", "1.0"], Some("01")))
            .with_group(FieldGroup::new("extra", &[]));
        let mut engine = VisibilityEngine::new(form);
        engine
            .register_policy("extra", VisibilityPolicy::value_in("count", &["1"]))
            .expect("group exists");
        assert_eq!(engine.evaluate("extra"), Some(false));
    }

    #[test]
    fn checkbox_policy_follows_checked_flag_and_value() {
        let form = Form::new()
            .with_input(FormInput::toggle("benefits", "medical", false))
            .with_group(FieldGroup::new("medical", &[]).hidden())
            .with_group(FieldGroup::new("other", &[]).hidden());
        let mut engine = VisibilityEngine::new(form);
        engine
            .register_policy(
                "medical",
                VisibilityPolicy::ShowWhenChecked {
                    input: "benefits".to_string(),
                    value: Some("medical".to_string()),
                },
            )
            .expect("group exists");
        engine
            .register_policy(
                "other",
                VisibilityPolicy::ShowWhenChecked {
                    input: "benefits".to_string(),
                    value: Some("car".to_string()),
                },
            )
            .expect("group exists");

        engine.on_controlling_input_changed("benefits", InputChange::Checked(true));
        assert_eq!(engine.is_visible("medical"), Some(true));
        assert_eq!(engine.is_visible("other"), Some(false));

        engine.on_controlling_input_changed("benefits", InputChange::Checked(false));
        assert_eq!(engine.is_visible("medical"), Some(false));
    }

    #[test]
    fn apply_twice_is_idempotent() {
        let mut engine = car_benefit_engine(Some("petrol"));
        engine.on_controlling_input_changed("fuelType", select("electricity"));

        let first = engine.apply("co2");
        let second = engine.apply("co2");
        assert!(first.is_empty(), "already settled by the change notification");
        assert!(second.is_empty());
        assert_eq!(engine.is_visible("co2"), Some(false));
    }

    #[test]
    fn hiding_clears_every_input_kind_in_the_same_step() {
        let form = Form::new()
            .with_input(FormInput::toggle("hasExtras", "yes", true))
            .with_input(FormInput::toggle("tick", "on", true))
            .with_input(FormInput::choice("radio", &["a", "b"], Some("a")))
            .with_input(FormInput::select("pick", &["x", "y"], Some("y")))
            .with_input(FormInput::text("note", "hello"))
            .with_group(FieldGroup::new("extras", &["tick", "radio", "pick", "note"]));
        let mut engine = VisibilityEngine::new(form);
        engine
            .register_policy(
                "extras",
                GroupRule::new(VisibilityPolicy::checked("hasExtras")).clear_on_hide(),
            )
            .expect("group exists");

        let updates = engine.on_controlling_input_changed("hasExtras", InputChange::Checked(false));
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].visible);
        assert_eq!(updates[0].cleared.len(), 4);
        for id in ["tick", "radio", "pick", "note"] {
            let input = engine.form().input(id).expect("input exists");
            assert!(input.is_empty(), "{id} should be empty after hide");
        }
    }

    #[test]
    fn hiding_without_clear_on_hide_keeps_values() {
        let mut engine = car_benefit_engine(Some("petrol"));
        engine.initialize_from_server_state();
        engine.on_controlling_input_changed("fuelType", select("diesel"));
        engine.on_controlling_input_changed("fuelType", InputChange::Selected(None));
        assert_eq!(engine.is_visible("fuelBenefit"), Some(false));
        let kept = engine.form().input("fuelWithdrawn").expect("input exists");
        assert_eq!(kept.selected_values(), vec!["feb"]);
    }

    #[test]
    fn override_hides_and_clears_even_when_policy_matches() {
        let mut engine = car_benefit_engine(Some("petrol"));
        engine.initialize_from_server_state();
        assert_eq!(engine.is_visible("fuelBenefit"), Some(true));

        let updates = engine.on_controlling_input_changed("fuelType", select("electricity"));
        assert_eq!(engine.flag_active("electric"), Some(true));
        assert_eq!(engine.is_visible("fuelBenefit"), Some(false));
        assert_eq!(engine.is_visible("electricInfo"), Some(true));
        let benefit = updates
            .iter()
            .find(|u| u.group == "fuelBenefit")
            .expect("fuel benefit update reported");
        assert_eq!(benefit.cleared, vec!["fuelProvided", "fuelWithdrawn"]);

        engine.on_controlling_input_changed("fuelType", select("diesel"));
        assert_eq!(engine.flag_active("electric"), Some(false));
        assert_eq!(engine.is_visible("fuelBenefit"), Some(true));
        assert_eq!(engine.is_visible("electricInfo"), Some(false));
    }

    #[test]
    fn server_echoed_exclusive_selection_is_honoured_at_load() {
        let mut engine = car_benefit_engine(Some("electricity"));
        engine.initialize_from_server_state();
        assert_eq!(engine.flag_active("electric"), Some(true));
        assert_eq!(engine.is_visible("fuelBenefit"), Some(false));
        assert_eq!(engine.is_visible("co2"), Some(false));
        assert!(engine.form().input("co2Figure").expect("input").is_empty());
    }

    #[test]
    fn server_echoed_trigger_value_leaves_group_visible() {
        let form = Form::new()
            .with_input(FormInput::choice("claimType", &["new", "amend"], Some("amend")))
            .with_input(FormInput::text("reference", "AB123"))
            .with_group(FieldGroup::new("amendment", &["reference"]).hidden());
        let mut engine = VisibilityEngine::new(form);
        engine
            .register_policy(
                "amendment",
                GroupRule::new(VisibilityPolicy::value_in("claimType", &["amend"])).clear_on_hide(),
            )
            .expect("group exists");

        let updates = engine.initialize_from_server_state();
        assert_eq!(engine.is_visible("amendment"), Some(true));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].focus.as_deref(), Some("reference"));
        let reference = engine.form().input("reference").expect("input");
        assert_eq!(reference.selected_values(), vec!["AB123"]);
    }

    #[test]
    fn missing_targets_are_no_ops() {
        let form = Form::new().with_group(FieldGroup::new("orphan", &["gone"]));
        let mut engine = VisibilityEngine::new(form);

        let err = engine
            .register_policy("absent", VisibilityPolicy::checked("x"))
            .expect_err("unknown group must be reported");
        assert!(matches!(err, EngineError::PolicyTargetMissing { .. }));

        engine
            .register_policy("orphan", VisibilityPolicy::checked("nowhere"))
            .expect("rule for a present group is stored");
        assert_eq!(engine.evaluate("orphan"), None);
        assert!(engine.apply("orphan").is_empty());
        assert_eq!(engine.is_visible("orphan"), Some(true));
        assert!(
            engine
                .on_controlling_input_changed("nowhere", InputChange::Checked(true))
                .is_empty()
        );
        assert_eq!(engine.evaluate("absent"), None);
    }

    #[test]
    fn nested_group_hides_with_parent_and_cascades_clears() {
        let form = Form::new()
            .with_input(FormInput::toggle("employed", "yes", true))
            .with_input(FormInput::choice("payFrequency", &["weekly", "monthly"], Some("weekly")))
            .with_input(FormInput::text("weeklyAmount", "300"))
            .with_group(FieldGroup::new("employment", &["payFrequency"]))
            .with_group(FieldGroup::new("weekly", &["weeklyAmount"]).nested_in("employment"));
        let mut engine = VisibilityEngine::new(form);
        engine
            .register_policy(
                "employment",
                GroupRule::new(VisibilityPolicy::checked("employed")).clear_on_hide(),
            )
            .expect("group exists");
        engine
            .register_policy(
                "weekly",
                GroupRule::new(VisibilityPolicy::value_in("payFrequency", &["weekly"]))
                    .clear_on_hide(),
            )
            .expect("group exists");
        engine.initialize_from_server_state();
        assert_eq!(engine.is_visible("weekly"), Some(true));

        engine.on_controlling_input_changed("employed", InputChange::Checked(false));
        assert_eq!(engine.is_visible("employment"), Some(false));
        assert_eq!(engine.is_visible("weekly"), Some(false));
        assert!(engine.form().input("payFrequency").expect("input").is_empty());
        assert!(engine.form().input("weeklyAmount").expect("input").is_empty());
    }

    #[test]
    fn nesting_loops_are_rejected() {
        let form = Form::new()
            .with_group(FieldGroup::new("a", &[]).nested_in("b"))
            .with_group(FieldGroup::new("b", &[]).nested_in("a"));
        let mut engine = VisibilityEngine::new(form);
        let err = engine
            .register_policy("a", VisibilityPolicy::checked("x"))
            .expect_err("loop must be rejected");
        assert!(matches!(err, EngineError::PolicyCycle { .. }));
    }

    #[test]
    fn editing_a_contextual_input_preselects_the_enabling_option() {
        let form = Form::new()
            .with_input(FormInput::choice("hasOtherIncome", &["yes", "no"], Some("no")))
            .with_input(FormInput::text("otherIncome", ""))
            .with_group(FieldGroup::new("otherIncomeDetails", &["otherIncome"]));
        let mut engine = VisibilityEngine::new(form);
        engine
            .register_policy(
                "otherIncomeDetails",
                GroupRule::new(VisibilityPolicy::value_in("hasOtherIncome", &["yes"]))
                    .clear_on_hide(),
            )
            .expect("group exists");

        engine.on_dependent_input_edited("otherIncome", InputChange::Text("250".to_string()));
        let controller = engine.form().input("hasOtherIncome").expect("input");
        assert_eq!(controller.selected_values(), vec!["yes"]);
        assert_eq!(engine.is_visible("otherIncomeDetails"), Some(true));
        let edited = engine.form().input("otherIncome").expect("input");
        assert_eq!(edited.selected_values(), vec!["250"]);

        engine.on_controlling_input_changed("hasOtherIncome", select("no"));
        assert!(engine.form().input("otherIncome").expect("input").is_empty());
    }

    #[test]
    fn editing_inside_a_shown_group_keeps_the_users_choice() {
        let mut engine = car_benefit_engine(Some("petrol"));
        engine.initialize_from_server_state();
        engine.on_controlling_input_changed("fuelType", select("diesel"));

        engine.on_dependent_input_edited("co2Figure", InputChange::Text("130".to_string()));
        let fuel = engine.form().input("fuelType").expect("input");
        assert_eq!(fuel.selected_values(), vec!["diesel"]);
        assert_eq!(engine.is_visible("co2"), Some(true));
        let figure = engine.form().input("co2Figure").expect("input");
        assert_eq!(figure.selected_values(), vec!["130"]);
    }

    #[test]
    fn unevaluable_parent_falls_back_to_its_rendered_visibility() {
        let form = Form::new()
            .with_input(FormInput::toggle("wantsDetail", "yes", true))
            .with_input(FormInput::text("detail", "x"))
            .with_group(FieldGroup::new("outer", &[]))
            .with_group(FieldGroup::new("inner", &["detail"]).nested_in("outer"));
        let mut engine = VisibilityEngine::new(form);
        engine
            .register_policy("outer", VisibilityPolicy::checked("missingInput"))
            .expect("group exists");
        engine
            .register_policy(
                "inner",
                GroupRule::new(VisibilityPolicy::checked("wantsDetail")).clear_on_hide(),
            )
            .expect("group exists");

        assert_eq!(engine.evaluate("outer"), None);
        assert_eq!(engine.evaluate("inner"), Some(true));

        engine.on_controlling_input_changed("wantsDetail", InputChange::Checked(false));
        assert_eq!(engine.is_visible("inner"), Some(false));
        assert!(engine.form().input("detail").expect("input").is_empty());
        assert_eq!(engine.is_visible("outer"), Some(true));
    }

    #[test]
    fn re_registering_replaces_the_previous_policy() {
        let mut engine = car_benefit_engine(Some("petrol"));
        engine
            .register_policy("co2", VisibilityPolicy::value_in("fuelType", &["diesel"]))
            .expect("group exists");
        assert_eq!(engine.evaluate("co2"), Some(false));
        assert!(engine.rule("co2").is_some_and(|r| !r.clear_on_hide));
    }
}
