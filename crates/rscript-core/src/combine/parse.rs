//! Classification of script files into imports, declarations and statements.

use std::ops::Range;

use quote::ToTokens;
use syn::parse::Parser;
use syn::spanned::Spanned;
use syn::visit::Visit;
use syn::{Item, ItemUse, Stmt, Type, UseTree, Visibility};

use super::CombineError;
use super::refs::IdentCollector;
use super::source::SourceText;
use crate::script::ScriptFile;

/// What a declaration is, for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Struct,
    Enum,
    Union,
    Trait,
    TraitAlias,
    TypeAlias,
    Impl,
    Fn,
    Const,
    Static,
    Mod,
    Macro,
}

impl DeclKind {
    pub fn label(self) -> &'static str {
        match self {
            DeclKind::Struct => "struct",
            DeclKind::Enum => "enum",
            DeclKind::Union => "union",
            DeclKind::Trait => "trait",
            DeclKind::TraitAlias => "trait alias",
            DeclKind::TypeAlias => "type",
            DeclKind::Impl => "impl",
            DeclKind::Fn => "fn",
            DeclKind::Const => "const",
            DeclKind::Static => "static",
            DeclKind::Mod => "mod",
            DeclKind::Macro => "macro_rules!",
        }
    }
}

/// One top-level item that can be copied into the combined unit.
#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub kind: DeclKind,
    /// Declared name; `None` for impl blocks.
    pub name: Option<String>,
    /// For impl blocks, the name of the implementing type.
    pub owner: Option<String>,
    pub text: String,
    pub line: usize,
    /// Identifiers used inside the declaration, sorted.
    pub idents: Vec<String>,
}

impl Declaration {
    pub fn display_name(&self) -> String {
        match (&self.name, &self.owner) {
            (Some(name), _) => name.clone(),
            (None, Some(owner)) => owner.clone(),
            (None, None) => "<anonymous>".to_string(),
        }
    }
}

/// A single flattened `use` line and where it came from.
#[derive(Debug, Clone)]
pub(crate) struct Import {
    pub text: String,
    pub line: usize,
}

/// The entry file split into its parts.
pub(crate) struct ParsedEntry {
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
    /// Entry text with imports and hoisted declarations blanked out.
    pub body: String,
    pub idents: Vec<String>,
}

/// A non-entry file.
pub(crate) struct ParsedModule {
    pub file: String,
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

fn syntax_error(file: &ScriptFile, err: &syn::Error) -> CombineError {
    let start = err.span().start();
    CombineError::Syntax {
        file: file.name.clone(),
        line: start.line.max(1),
        column: start.column + 1,
        message: err.to_string(),
    }
}

/// Parse the entry file as a statement list.
pub(crate) fn parse_entry(file: &ScriptFile) -> Result<ParsedEntry, CombineError> {
    let text = strip_bom(&file.content);
    let stmts = syn::Block::parse_within
        .parse_str(text)
        .map_err(|e| syntax_error(file, &e))?;
    let source = SourceText::new(text);

    let mut collector = IdentCollector::new();
    let mut imports = Vec::new();
    let mut declarations = Vec::new();
    let mut hoisted: Vec<Range<usize>> = Vec::new();

    for stmt in &stmts {
        collector.visit_stmt(stmt);

        let Stmt::Item(item) = stmt else {
            continue;
        };
        match item {
            Item::Use(item_use) => {
                imports.extend(flatten_use(item_use, &source));
                hoisted.push(source.range(item.span()));
            }
            Item::Struct(_)
            | Item::Enum(_)
            | Item::Union(_)
            | Item::Trait(_)
            | Item::TraitAlias(_)
            | Item::Type(_)
            | Item::Impl(_) => {
                if let Some(decl) = declaration(item, &source) {
                    declarations.push(decl);
                    hoisted.push(source.range(item.span()));
                }
            }
            // Local fns, consts, statics, mods and macros stay in the body.
            _ => {}
        }
    }

    Ok(ParsedEntry {
        imports,
        declarations,
        body: source.blank_out(&hoisted),
        idents: collector.into_sorted(),
    })
}

/// Parse a non-entry file as a list of items.
pub(crate) fn parse_module(file: &ScriptFile) -> Result<ParsedModule, CombineError> {
    let text = strip_bom(&file.content);
    let ast = syn::parse_file(text).map_err(|e| syntax_error(file, &e))?;
    let source = SourceText::new(text);

    let mut imports = Vec::new();
    let mut declarations = Vec::new();

    for item in &ast.items {
        match item {
            Item::Use(item_use) => imports.extend(flatten_use(item_use, &source)),
            Item::ExternCrate(_) => imports.push(Import {
                text: source.declaration_text(item.span()).trim().to_string(),
                line: item.span().start().line,
            }),
            _ => match declaration(item, &source) {
                Some(decl) => declarations.push(decl),
                None => tracing::debug!(
                    file = %file.name,
                    line = item.span().start().line,
                    "skipping item without a name"
                ),
            },
        }
    }

    Ok(ParsedModule {
        file: file.name.clone(),
        imports,
        declarations,
    })
}

fn declaration(item: &Item, source: &SourceText<'_>) -> Option<Declaration> {
    let (kind, name, owner) = match item {
        Item::Struct(i) => (DeclKind::Struct, Some(i.ident.to_string()), None),
        Item::Enum(i) => (DeclKind::Enum, Some(i.ident.to_string()), None),
        Item::Union(i) => (DeclKind::Union, Some(i.ident.to_string()), None),
        Item::Trait(i) => (DeclKind::Trait, Some(i.ident.to_string()), None),
        Item::TraitAlias(i) => (DeclKind::TraitAlias, Some(i.ident.to_string()), None),
        Item::Type(i) => (DeclKind::TypeAlias, Some(i.ident.to_string()), None),
        Item::Fn(i) => (DeclKind::Fn, Some(i.sig.ident.to_string()), None),
        Item::Const(i) => (DeclKind::Const, Some(i.ident.to_string()), None),
        Item::Static(i) => (DeclKind::Static, Some(i.ident.to_string()), None),
        Item::Mod(i) => (DeclKind::Mod, Some(i.ident.to_string()), None),
        Item::Macro(i) => (DeclKind::Macro, Some(i.ident.as_ref()?.to_string()), None),
        Item::Impl(i) => (DeclKind::Impl, None, Some(self_type_name(&i.self_ty)?)),
        _ => return None,
    };

    let mut collector = IdentCollector::new();
    collector.visit_item(item);

    Some(Declaration {
        kind,
        name,
        owner,
        text: source.declaration_text(item.span()).to_string(),
        line: item.span().start().line,
        idents: collector.into_sorted(),
    })
}

/// Name of the type an impl block is for: `Foo` in `impl<T> Trait for Foo<T>`.
fn self_type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        Type::Reference(reference) => self_type_name(&reference.elem),
        Type::Paren(paren) => self_type_name(&paren.elem),
        Type::Group(group) => self_type_name(&group.elem),
        _ => None,
    }
}

/// Split a `use` item into one line per imported leaf.
///
/// `use std::{fmt, io::{self, Write}};` becomes `use std::fmt;`,
/// `use std::io;` and `use std::io::Write;`, so identical imports written
/// differently in two files collapse into one. Items carrying attributes
/// are kept verbatim.
pub(crate) fn flatten_use(item: &ItemUse, source: &SourceText<'_>) -> Vec<Import> {
    let line = item.span().start().line;
    if !item.attrs.is_empty() {
        return vec![Import {
            text: source.declaration_text(item.span()).trim().to_string(),
            line,
        }];
    }

    let visibility = match &item.vis {
        Visibility::Inherited => String::new(),
        vis => format!("{} ", vis.to_token_stream()),
    };
    let prefix = if item.leading_colon.is_some() {
        "::".to_string()
    } else {
        String::new()
    };

    let mut leaves = Vec::new();
    collect_leaves(&item.tree, prefix, &mut leaves);
    leaves
        .into_iter()
        .map(|leaf| Import {
            text: format!("{}use {};", visibility, leaf),
            line,
        })
        .collect()
}

fn collect_leaves(tree: &UseTree, prefix: String, out: &mut Vec<String>) {
    match tree {
        UseTree::Path(path) => {
            collect_leaves(&path.tree, format!("{}{}::", prefix, path.ident), out);
        }
        UseTree::Name(name) if name.ident == "self" => {
            let parent = prefix.trim_end_matches("::");
            if !parent.is_empty() {
                out.push(parent.to_string());
            }
        }
        UseTree::Name(name) => out.push(format!("{}{}", prefix, name.ident)),
        UseTree::Rename(rename) if rename.ident == "self" => {
            let parent = prefix.trim_end_matches("::");
            if !parent.is_empty() {
                out.push(format!("{} as {}", parent, rename.rename));
            }
        }
        UseTree::Rename(rename) => {
            out.push(format!("{}{} as {}", prefix, rename.ident, rename.rename));
        }
        UseTree::Glob(_) => out.push(format!("{}*", prefix)),
        UseTree::Group(group) => {
            for tree in &group.items {
                collect_leaves(tree, prefix.clone(), out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imports_of(src: &str) -> Vec<String> {
        let module = parse_module(&ScriptFile::new("Lib.rs", src)).unwrap();
        module.imports.into_iter().map(|i| i.text).collect()
    }

    #[test]
    fn test_use_trees_are_flattened() {
        let imports = imports_of("use std::{fmt, io::{self, Write as W}, collections::*};");
        assert_eq!(
            imports,
            vec![
                "use std::fmt;",
                "use std::io;",
                "use std::io::Write as W;",
                "use std::collections::*;",
            ]
        );
    }

    #[test]
    fn test_pub_use_keeps_visibility() {
        assert_eq!(imports_of("pub use crate::a::B;"), vec!["pub use crate::a::B;"]);
    }

    #[test]
    fn test_module_declarations() {
        let src = "\
use std::fmt;

/// A point.
#[derive(Debug)]
pub struct Point { x: f64 }

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, \"{}\", self.x) }
}

fn helper() -> Point { Point { x: 1.0 } }
";
        let module = parse_module(&ScriptFile::new("Point.rs", src)).unwrap();
        let kinds: Vec<_> = module
            .declarations
            .iter()
            .map(|d| (d.kind, d.display_name()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (DeclKind::Struct, "Point".to_string()),
                (DeclKind::Impl, "Point".to_string()),
                (DeclKind::Fn, "helper".to_string()),
            ]
        );

        let point = &module.declarations[0];
        assert_eq!(point.line, 3);
        assert!(point.text.starts_with("/// A point."), "{}", point.text);
        assert!(point.text.ends_with('}'));

        let display = &module.declarations[1];
        assert!(display.idents.contains(&"Display".to_string()));
    }

    #[test]
    fn test_entry_hoists_types_but_keeps_local_items() {
        let src = "\
use std::fmt::Write;
struct Local;
fn helper() -> u32 { 1 }
let x = helper();
print(x);
";
        let entry = parse_entry(&ScriptFile::new("Main.rs", src)).unwrap();
        assert_eq!(entry.imports.len(), 1);
        assert_eq!(entry.declarations.len(), 1);
        assert_eq!(entry.declarations[0].name.as_deref(), Some("Local"));

        let lines: Vec<&str> = entry.body.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].trim().is_empty());
        assert!(lines[1].trim().is_empty());
        assert_eq!(lines[2], "fn helper() -> u32 { 1 }");
        assert_eq!(lines[3], "let x = helper();");
    }

    #[test]
    fn test_syntax_error_location() {
        let err = parse_entry(&ScriptFile::new("Main.rs", "let a = 1;\nlet b = ;\n"))
            .err()
            .unwrap();
        match err {
            CombineError::Syntax { file, line, .. } => {
                assert_eq!(file, "Main.rs");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
