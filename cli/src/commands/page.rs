use clap::Args;
use formgate_core::{GroupUpdate, InputChange, PageManifest, VisibilityEngine};
use serde_json::json;

use crate::util::{exit_error, parse_assignment, print_json, read_source};

#[derive(Args)]
pub struct ReplayArgs {
    /// Page manifest JSON file ("-" for stdin)
    #[arg(long)]
    pub manifest: String,

    /// Change a controlling input, applied in order (repeatable, INPUT=VALUE)
    #[arg(long = "set", value_name = "INPUT=VALUE")]
    pub set: Vec<String>,

    /// Edit an input inside a field group (repeatable, INPUT=VALUE)
    #[arg(long = "edit", value_name = "INPUT=VALUE")]
    pub edit: Vec<String>,

    /// Skip load-time initialization from the rendered values
    #[arg(long)]
    pub no_init: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Page manifest JSON file ("-" for stdin)
    #[arg(long)]
    pub manifest: String,
}

fn load_engine(path: &str) -> (VisibilityEngine, Vec<formgate_core::ManifestIssue>) {
    let raw = read_source(path).unwrap_or_else(|e| exit_error(&e, None));
    let manifest = PageManifest::from_json_str(&raw).unwrap_or_else(|e| {
        exit_error(
            &e.to_string(),
            Some("A manifest has top-level 'inputs', 'groups' and 'flags' arrays."),
        )
    });
    manifest.into_engine()
}

fn change_for(engine: &VisibilityEngine, raw: &str) -> (String, InputChange) {
    let (input, value) = parse_assignment(raw).unwrap_or_else(|e| exit_error(&e, None));
    let Some(found) = engine.form().input(&input) else {
        exit_error(&format!("input '{input}' is not in the manifest"), None);
    };
    let Some(change) = InputChange::from_raw(found.kind(), &value) else {
        exit_error(
            &format!("'{value}' is not a valid value for {input}"),
            Some("Toggles take true/false, on/off, yes/no or checked/unchecked."),
        );
    };
    (input, change)
}

/// Load a manifest, replay changes through the engine, print the final state.
pub fn replay(args: ReplayArgs) -> i32 {
    let (mut engine, issues) = load_engine(&args.manifest);
    let mut updates: Vec<GroupUpdate> = Vec::new();

    if !args.no_init {
        updates.extend(engine.initialize_from_server_state());
    }
    for raw in &args.set {
        let (input, change) = change_for(&engine, raw);
        updates.extend(engine.on_controlling_input_changed(&input, change));
    }
    for raw in &args.edit {
        let (input, change) = change_for(&engine, raw);
        updates.extend(engine.on_dependent_input_edited(&input, change));
    }

    print_json(&json!({
        "snapshot": engine.snapshot(),
        "updates": updates,
        "issues": issues,
    }));
    0
}

/// Report declarations that reference missing groups, inputs or flags.
pub fn check(args: CheckArgs) -> i32 {
    let (engine, issues) = load_engine(&args.manifest);
    let groups = engine.form().groups().count();
    let inputs = engine.form().inputs().count();

    print_json(&json!({
        "ok": issues.is_empty(),
        "groups": groups,
        "inputs": inputs,
        "issues": issues,
    }));
    if issues.is_empty() { 0 } else { 1 }
}
