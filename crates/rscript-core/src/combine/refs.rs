//! Syntactic identifier scan.
//!
//! Collects every identifier token, including those inside macro invocations.
//! No name resolution happens: a local variable spelled like a type counts
//! as a reference to it, and a name that only appears inside a string
//! literal does not.

use proc_macro2::{TokenStream, TokenTree};
use rustc_hash::FxHashSet;
use syn::visit::{self, Visit};

#[derive(Default)]
pub(crate) struct IdentCollector {
    idents: FxHashSet<String>,
}

impl IdentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers seen so far, sorted.
    pub fn into_sorted(self) -> Vec<String> {
        let mut idents: Vec<String> = self.idents.into_iter().collect();
        idents.sort();
        idents
    }

    fn scan_tokens(&mut self, tokens: TokenStream) {
        for tree in tokens {
            match tree {
                TokenTree::Ident(ident) => {
                    self.idents.insert(ident.to_string());
                }
                TokenTree::Group(group) => self.scan_tokens(group.stream()),
                TokenTree::Punct(_) | TokenTree::Literal(_) => {}
            }
        }
    }
}

impl<'ast> Visit<'ast> for IdentCollector {
    fn visit_ident(&mut self, ident: &'ast proc_macro2::Ident) {
        self.idents.insert(ident.to_string());
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        visit::visit_macro(self, mac);
        self.scan_tokens(mac.tokens.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents_of(src: &str) -> Vec<String> {
        let file: syn::File = syn::parse_str(src).unwrap();
        let mut collector = IdentCollector::new();
        collector.visit_file(&file);
        collector.into_sorted()
    }

    #[test]
    fn test_paths_types_and_methods() {
        let idents = idents_of("fn f() { let p: Point = Point::origin(); p.shift(Delta(1)); }");
        for name in ["Point", "origin", "shift", "Delta", "p", "f"] {
            assert!(idents.contains(&name.to_string()), "missing {name}");
        }
    }

    #[test]
    fn test_macro_arguments_are_scanned() {
        let idents = idents_of(r#"fn f() { println!("{}", Report::new().total()); vec![Item::default()]; }"#);
        assert!(idents.contains(&"Report".to_string()));
        assert!(idents.contains(&"Item".to_string()));
    }

    #[test]
    fn test_string_contents_are_not_identifiers() {
        let idents = idents_of(r#"fn f() { let s = "Hidden"; }"#);
        assert!(!idents.contains(&"Hidden".to_string()));
    }
}
