//! Incremental merge of generated functions into user edited files

use proptest::prelude::*;
use vectorsigma::{merge, NOT_IMPLEMENTED_MARKER, OWNERSHIP_MARKER};

fn stub(name: &str) -> String {
    format!(
        "{OWNERSHIP_MARKER}action:{name}\n\
         pub fn {name}(_state: &mut ExtendedState, _params: &[&str]) -> anyhow::Result<()> {{\n    \
         {NOT_IMPLEMENTED_MARKER}\n    Ok(())\n}}\n"
    )
}

fn custom(name: &str) -> String {
    format!(
        "{OWNERSHIP_MARKER}action:{name}\n\
         pub fn {name}(state: &mut ExtendedState, _params: &[&str]) -> anyhow::Result<()> {{\n    \
         state.count += 1;\n    Ok(())\n}}\n"
    )
}

fn file(functions: &[String]) -> String {
    let mut source = String::from("use super::extended_state::ExtendedState;\n");
    for function in functions {
        source.push('\n');
        source.push_str(function);
    }
    source
}

#[test]
fn test_regeneration_with_renamed_action() {
    let existing = file(&[custom("switch_in"), stub("alert")]);
    let generated = file(&[stub("switch_in"), stub("warn")]);

    let outcome = merge(&existing, &generated).unwrap();
    assert!(outcome.changed);
    assert!(outcome.source.contains("state.count += 1;"));
    assert!(!outcome.source.contains("pub fn alert("));
    assert!(outcome.source.contains("pub fn warn("));
    assert!(outcome.source.starts_with("use super::extended_state::ExtendedState;\n"));
}

#[test]
fn test_user_helpers_survive() {
    let helper = "/// Shared by several actions\nfn lamp(state: &ExtendedState) -> u8 {\n    state.count\n}\n";
    let existing = format!("{}\n{}", file(&[stub("alert")]), helper);
    let generated = file(&[stub("switch_in")]);

    let merged = merge(&existing, &generated).unwrap().source;
    assert!(merged.contains(helper));
    assert!(!merged.contains("pub fn alert("));
    assert!(merged.contains("pub fn switch_in("));
}

#[test]
fn test_stub_with_changed_signature_is_replaced() {
    let existing = file(&[stub("alert")]);
    let generated = file(&[stub("alert").replace("_params: &[&str]", "_params: &[String]")]);

    let outcome = merge(&existing, &generated).unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.source, generated);
}

#[test]
fn test_customized_function_keeps_old_signature() {
    let existing = file(&[custom("alert")]);
    let generated = file(&[stub("alert").replace("_params: &[&str]", "_params: &[String]")]);

    let outcome = merge(&existing, &generated).unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.source, existing);
}

#[test]
fn test_invalid_existing_source() {
    let err = merge("pub fn alert( {\n", &file(&[stub("alert")])).unwrap_err();
    assert!(err.to_string().contains("existing source"));
}

const NAMES: [&str; 5] = ["alert", "blink", "switch_in", "switch_out", "wait"];

#[derive(Debug, Clone, Copy)]
enum Body {
    Stub,
    Custom,
}

fn existing_functions() -> impl Strategy<Value = Vec<(usize, Body)>> {
    prop::collection::vec(
        (0..NAMES.len(), prop_oneof![Just(Body::Stub), Just(Body::Custom)]),
        0..6,
    )
    .prop_map(|mut functions| {
        functions.sort_by_key(|(index, _)| *index);
        functions.dedup_by_key(|(index, _)| *index);
        functions
    })
}

proptest! {
    #[test]
    fn merge_is_idempotent(
        existing in existing_functions(),
        generated in prop::collection::btree_set(0..NAMES.len(), 0..6),
    ) {
        let existing = file(
            &existing
                .iter()
                .map(|(index, body)| match body {
                    Body::Stub => stub(NAMES[*index]),
                    Body::Custom => custom(NAMES[*index]),
                })
                .collect::<Vec<_>>(),
        );
        let generated = file(
            &generated.iter().map(|index| stub(NAMES[*index])).collect::<Vec<_>>(),
        );

        let first = merge(&existing, &generated).unwrap();
        let second = merge(&first.source, &generated).unwrap();
        prop_assert!(!second.changed);
        prop_assert_eq!(&second.source, &first.source);

        for name in NAMES {
            let signature = format!("pub fn {name}(");
            let wanted = generated.contains(&signature);
            prop_assert_eq!(first.source.contains(&signature), wanted);
        }
    }
}
