//! Integration tests for combining script folders into one unit.

use rscript_core::combine::ENTRY_SYMBOL;
use rscript_core::{CombineError, Combiner, ScriptFile};

fn files(pairs: &[(&str, &str)]) -> Vec<ScriptFile> {
    pairs
        .iter()
        .map(|(name, content)| ScriptFile::new(*name, *content))
        .collect()
}

/// 1-based line of the first generated line containing `needle`.
fn line_of(source: &str, needle: &str) -> usize {
    source
        .lines()
        .position(|line| line.contains(needle))
        .map(|index| index + 1)
        .unwrap_or_else(|| panic!("{needle:?} not found in unit"))
}

const FOO: &str = "use std::fmt;

pub struct Foo {
    count: u32,
}

impl Foo {
    pub fn new() -> Self {
        Foo { count: 1 }
    }

    pub fn run(&self) {
        print(format!(\"count = {}\", self.count));
    }
}
";

#[test]
fn test_entry_pulls_in_referenced_type() {
    let unit = Combiner::default()
        .combine(&files(&[("Main.rs", "Foo::new().run();\n"), ("Foo.rs", FOO)]))
        .unwrap();
    let source = unit.source();

    assert!(source.contains("pub struct Foo {"));
    assert!(source.contains("impl Foo {"));
    assert!(source.contains("use std::fmt;"));
    assert_eq!(source.matches(ENTRY_SYMBOL).count(), 1);
    assert_eq!(unit.entry_file(), "Main.rs");

    let included: Vec<_> = unit
        .report()
        .included
        .iter()
        .map(|item| (item.file.as_str(), item.kind.label(), item.name.as_str()))
        .collect();
    assert_eq!(
        included,
        vec![("Foo.rs", "struct", "Foo"), ("Foo.rs", "impl", "Foo")]
    );
}

#[test]
fn test_combining_is_deterministic() {
    let forward = files(&[
        ("Main.rs", "let w = Wall::new(Length(3.0));\nprint(w.len());\n"),
        ("Wall.rs", "pub struct Wall(Length);\nimpl Wall { pub fn new(l: Length) -> Self { Wall(l) } pub fn len(&self) -> f64 { self.0.0 } }\n"),
        ("Length.rs", "pub struct Length(pub f64);\n"),
    ]);
    let mut backward = forward.clone();
    backward.reverse();

    let combiner = Combiner::default();
    let first = combiner.combine(&forward).unwrap();
    let again = combiner.combine(&forward).unwrap();
    let reordered = combiner.combine(&backward).unwrap();

    assert_eq!(first.source(), again.source());
    assert_eq!(first.source(), reordered.source());
}

#[test]
fn test_reachability_is_transitive() {
    let unit = Combiner::default()
        .combine(&files(&[
            ("Main.rs", "let wall = Wall::standard();\nprint(wall.height.0);\n"),
            ("Wall.rs", "use std::fmt;\npub struct Wall { pub height: Length }\nimpl Wall { pub fn standard() -> Self { Wall { height: Length::metres(3.0) } } }\n"),
            ("Length.rs", "use std::fmt;\npub struct Length(pub f64);\nimpl Length { pub fn metres(v: f64) -> Self { Length(v * UNIT) } }\n"),
            ("Units.rs", "use std::collections::HashMap;\npub const UNIT: f64 = 1.0;\n"),
            ("Unused.rs", "use std::rc::Rc;\npub struct Unused;\n"),
        ]))
        .unwrap();
    let source = unit.source();

    for needle in ["pub struct Wall", "pub struct Length", "pub const UNIT"] {
        assert!(source.contains(needle), "missing {needle}");
    }
    assert!(!source.contains("pub struct Unused"));
    assert!(!source.contains("use std::rc::Rc;"));
    assert_eq!(source.matches("use std::fmt;").count(), 1);
    assert!(line_of(source, "use std::collections::HashMap;") < line_of(source, "use std::fmt;"));
    assert_eq!(
        unit.report().imports,
        vec!["use std::collections::HashMap;", "use std::fmt;"]
    );
}

#[test]
fn test_duplicate_declarations_are_rejected() {
    let err = Combiner::default()
        .combine(&files(&[
            ("Main.rs", "let s = Shape;\n"),
            ("A.rs", "pub struct Shape;\n"),
            ("B.rs", "pub struct Shape;\n"),
        ]))
        .unwrap_err();

    assert_eq!(
        err,
        CombineError::DuplicateDeclaration {
            name: "Shape".to_string(),
            first: "A.rs".to_string(),
            second: "B.rs".to_string(),
        }
    );
}

#[test]
fn test_unreferenced_duplicates_are_ignored() {
    let unit = Combiner::default().combine(&files(&[
        ("Main.rs", "print(\"hi\");\n"),
        ("A.rs", "pub struct Shape;\n"),
        ("B.rs", "pub struct Shape;\n"),
    ]));
    assert!(unit.is_ok());
}

#[test]
fn test_entry_declaration_wins() {
    let unit = Combiner::default()
        .combine(&files(&[
            ("Main.rs", "struct Point { x: i32 }\nlet p = Point { x: 1 };\n"),
            ("Other.rs", "pub struct Point { pub x: f64, pub y: f64 }\n"),
        ]))
        .unwrap();

    assert!(unit.source().contains("struct Point { x: i32 }"));
    assert!(!unit.source().contains("pub x: f64"));
}

#[test]
fn test_matching_names_are_included_even_when_unused() {
    // `total` is a local variable here, but the scan is syntactic, so the
    // free function of the same name comes along.
    let unit = Combiner::default()
        .combine(&files(&[
            ("Main.rs", "let total = 3;\nprint(total);\n"),
            ("Totals.rs", "pub fn total() -> i32 { 1 }\n"),
        ]))
        .unwrap();
    assert!(unit.source().contains("pub fn total() -> i32"));
}

#[test]
fn test_trait_used_only_through_methods_is_missed() {
    let unit = Combiner::default()
        .combine(&files(&[
            ("Main.rs", "print(2.doubled());\n"),
            ("Ext.rs", "pub trait Doubled { fn doubled(&self) -> Self; }\nimpl Doubled for i64 { fn doubled(&self) -> Self { self * 2 } }\n"),
        ]))
        .unwrap();
    assert!(!unit.source().contains("trait Doubled"));
}

#[test]
fn test_line_map_points_at_entry_lines() {
    let unit = Combiner::default()
        .combine(&files(&[
            ("Main.rs", "let a = Foo::new();\nlet b = missing_value;\n"),
            ("Foo.rs", FOO),
        ]))
        .unwrap();
    let source = unit.source();

    let body_line = line_of(source, "let b = missing_value;");
    let location = unit.line_map().lookup(body_line).unwrap();
    assert_eq!((location.file, location.line), ("Main.rs", 2));

    let impl_line = line_of(source, "pub fn run(&self)");
    let location = unit.line_map().lookup(impl_line).unwrap();
    assert_eq!((location.file, location.line), ("Foo.rs", 12));

    let header_line = line_of(source, "fn execute(script: &Script)");
    assert!(unit.line_map().lookup(header_line).is_none());
}

#[test]
fn test_byte_order_mark_is_ignored() {
    let unit = Combiner::default()
        .combine(&files(&[("Main.rs", "\u{feff}print(\"bom\");\n")]))
        .unwrap();
    assert!(!unit.source().contains('\u{feff}'));
    assert!(unit.source().contains("print(\"bom\");"));
}

#[test]
fn test_custom_entry_name() {
    let combiner = Combiner::new("build");
    let unit = combiner
        .combine(&files(&[
            ("Build.rs", "print(1);\n"),
            ("Main.rs", "pub fn leftover() {}\n"),
        ]))
        .unwrap();
    assert_eq!(unit.entry_file(), "Build.rs");
    assert!(unit.source().contains("print(1);"));
    assert!(!unit.source().contains("fn leftover"));
}

#[test]
fn test_macros_precede_the_items_that_use_them() {
    let unit = Combiner::default()
        .combine(&files(&[
            ("Main.rs", "print(Area::of(3));\n"),
            ("Area.rs", "pub struct Area;\nimpl Area { pub fn of(n: i32) -> i32 { sq!(n) } }\n"),
            ("Macros.rs", "macro_rules! sq {\n    ($x:expr) => { $x * $x };\n}\n"),
        ]))
        .unwrap();
    let source = unit.source();

    assert!(line_of(source, "macro_rules! sq") < line_of(source, "pub struct Area;"));
    assert_eq!(unit.report().included[0].kind.label(), "macro_rules!");
    let location = unit.line_map().lookup(line_of(source, "macro_rules! sq")).unwrap();
    assert_eq!((location.file, location.line), ("Macros.rs", 1));
}
