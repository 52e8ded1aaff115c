use super::*;
use crate::error::{CatalogError, ReferenceError};

const SHIP_CATALOG: &str = r#"
fallback_prefix: state
signals:
  - name: hardpoints
    type: enum
    tier: core
    values: [retracted, deployed]
    derive: { op: flag, field: Flags, bit: 6, set: deployed, clear: retracted }
  - name: landing_gear_down
    type: bool
    derive: { op: flag, field: Flags, bit: 2 }
  - name: cargo
    type: number
    derive: { op: path, path: state.Cargo }
  - name: gui_focus
    type: enum
    values: [none, internal_panel, galaxy_map]
    derive:
      op: map
      path: GuiFocus
      table: { 0: none, 2: internal_panel, 6: galaxy_map }
      default: none
  - name: under_attack
    type: bool
    derive: { op: recent, event: UnderAttack, within: 10 }
  - name: flight_mode
    type: enum
    values: [normal, supercruise, docked]
    derive:
      op: first_match
      cases:
        - when: { op: flag, field: Flags, bit: 0 }
          value: docked
        - when: { op: and, of: [ { op: flag, field: Flags, bit: 4 }, { op: not, of: { op: path, path: state.Hyperdrive } } ] }
          value: supercruise
      default: normal
"#;

fn ship() -> Catalog {
    Catalog::from_yaml(SHIP_CATALOG).expect("catalog should load")
}

fn load_err(yaml: &str) -> CatalogError {
    Catalog::from_yaml(yaml).expect_err("catalog should be rejected")
}

#[test]
fn loads_signals_in_declaration_order() {
    let cat = ship();
    assert_eq!(cat.len(), 6);
    assert_eq!(cat.fallback_prefix(), "state");
    let names: Vec<_> = cat.names().collect();
    assert_eq!(names[0], "hardpoints");
    assert_eq!(names[5], "flight_mode");

    let hp = cat.get("hardpoints").unwrap();
    assert_eq!(hp.signal_type, SignalType::Enum);
    assert_eq!(hp.tier.as_deref(), Some("core"));
    assert_eq!(
        hp.derive,
        Derivation::Flag {
            field: "Flags".into(),
            bit: 6,
            inverted: false,
            set: Some("deployed".into()),
            clear: Some("retracted".into()),
        }
    );
}

#[test]
fn map_table_keys_are_stringified() {
    let cat = ship();
    let Derivation::Map { table, .. } = &cat.get("gui_focus").unwrap().derive else {
        panic!("expected map recipe");
    };
    assert_eq!(table.get("2").map(String::as_str), Some("internal_panel"));
}

#[test]
fn default_prefix_when_omitted() {
    let cat = Catalog::from_yaml(
        "signals:\n  - { name: docked, type: bool, derive: { op: flag, field: Flags, bit: 0 } }\n",
    )
    .unwrap();
    assert_eq!(cat.fallback_prefix(), DEFAULT_FALLBACK_PREFIX);
}

#[test]
fn duplicate_name_rejected() {
    let err = load_err(
        r#"
signals:
  - { name: docked, type: bool, derive: { op: flag, field: Flags, bit: 0 } }
  - { name: docked, type: bool, derive: { op: flag, field: Flags, bit: 1 } }
"#,
    );
    assert!(matches!(err, CatalogError::DuplicateName(ref n) if n == "docked"));
}

#[test]
fn missing_type_rejected() {
    let err = load_err("signals:\n  - { name: docked, derive: { op: flag, field: Flags, bit: 0 } }\n");
    assert!(matches!(err, CatalogError::MissingField { ref field, .. } if field == "type"));
}

#[test]
fn missing_derive_rejected() {
    let err = load_err("signals:\n  - { name: docked, type: bool }\n");
    assert!(matches!(err, CatalogError::MissingField { ref field, .. } if field == "derive"));
}

#[test]
fn unknown_type_rejected() {
    let err = load_err("signals:\n  - { name: docked, type: tristate, derive: { op: path, path: Docked } }\n");
    match err {
        CatalogError::UnknownType { signal, type_name } => {
            assert_eq!(signal, "docked");
            assert_eq!(type_name, "tristate");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_operator_rejected_with_path() {
    let err = load_err(
        r#"
signals:
  - name: mode
    type: enum
    values: [a, b]
    derive:
      op: first_match
      cases:
        - when: { op: xor, of: [] }
          value: a
"#,
    );
    match err {
        CatalogError::UnknownOperator { signal, op, path } => {
            assert_eq!(signal, "mode");
            assert_eq!(op, "xor");
            assert_eq!(path, "derive.cases[0].when");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn top_level_unknown_operator_rejected() {
    let err = load_err("signals:\n  - { name: x, type: bool, derive: { op: lookup, path: X } }\n");
    assert!(matches!(err, CatalogError::UnknownOperator { ref op, .. } if op == "lookup"));
}

#[test]
fn malformed_enum_rejected() {
    let empty = load_err("signals:\n  - { name: m, type: enum, values: [], derive: { op: path, path: M } }\n");
    assert!(matches!(empty, CatalogError::MalformedEnum { .. }));

    let dup = load_err("signals:\n  - { name: m, type: enum, values: [a, a], derive: { op: path, path: M } }\n");
    assert!(matches!(dup, CatalogError::MalformedEnum { .. }));

    let stray = load_err("signals:\n  - { name: m, type: bool, values: [a], derive: { op: path, path: M } }\n");
    assert!(matches!(stray, CatalogError::MalformedEnum { .. }));
}

#[test]
fn invalid_recipes_rejected() {
    let cases = [
        // flag labels not members
        "signals:\n  - { name: hp, type: enum, values: [a, b], derive: { op: flag, field: Flags, bit: 6, set: c, clear: a } }\n",
        // bit out of range
        "signals:\n  - { name: g, type: bool, derive: { op: flag, field: Flags, bit: 64 } }\n",
        // recent on a non-bool
        "signals:\n  - { name: r, type: number, derive: { op: recent, event: Died, within: 5 } }\n",
        // non-positive window
        "signals:\n  - { name: r, type: bool, derive: { op: recent, event: Died, within: 0 } }\n",
        // map label not a member
        "signals:\n  - { name: f, type: enum, values: [none], derive: { op: map, path: F, table: { 1: galaxy } } }\n",
        // empty path
        "signals:\n  - { name: p, type: number, derive: { op: path, path: '' } }\n",
        // default does not fit
        "signals:\n  - { name: p, type: number, default: fast, derive: { op: path, path: Speed } }\n",
    ];
    for yaml in cases {
        let err = load_err(yaml);
        assert!(
            matches!(err, CatalogError::InvalidRecipe { .. } | CatalogError::MissingField { .. }),
            "unexpected error for {yaml}: {err}"
        );
    }
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.yml");
    std::fs::write(&path, SHIP_CATALOG).unwrap();
    let cat = Catalog::load(&path).unwrap();
    assert!(cat.contains("under_attack"));

    let missing = Catalog::load(dir.path().join("nope.yml")).unwrap_err();
    assert!(matches!(missing, CatalogError::Io(_)));
}

#[test]
fn reference_to_known_enum_member() {
    let cat = ship();
    let def = cat
        .validate_reference("hardpoints", Some(&SignalValue::from("deployed")))
        .unwrap();
    assert_eq!(def.name, "hardpoints");
    assert!(cat.validate_reference("landing_gear_down", None).is_ok());
}

#[test]
fn reference_to_unknown_signal_suggests() {
    let cat = ship();
    let err = cat.validate_reference("hardpoint", None).unwrap_err();
    assert!(matches!(err, ReferenceError::UnknownSignal { .. }));
    assert_eq!(err.suggestion(), Some("hardpoints"));
}

#[test]
fn reference_to_non_member_suggests() {
    let cat = ship();
    let err = cat
        .validate_reference("hardpoints", Some(&SignalValue::from("deploy")))
        .unwrap_err();
    assert_eq!(
        err,
        ReferenceError::NotEnumMember {
            signal: "hardpoints".into(),
            value: "deploy".into(),
            suggestion: Some("deployed".into()),
        }
    );
}

#[test]
fn reference_type_mismatch() {
    let cat = ship();
    let err = cat
        .validate_reference("cargo", Some(&SignalValue::from("lots")))
        .unwrap_err();
    assert_eq!(
        err,
        ReferenceError::TypeMismatch {
            signal: "cargo".into(),
            expected: SignalType::Number,
            found: "string",
        }
    );
    assert!(cat.validate_reference("cargo", Some(&SignalValue::Number(4.0))).is_ok());
}
