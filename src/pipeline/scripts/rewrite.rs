// src/pipeline/scripts/rewrite.rs

//! Module syntax: finding `import`/`export`/`require` and rewriting them
//! against the bundle runtime.
//!
//! Each module body runs inside `function (module, exports, __require)`.
//! Imports become `const` bindings over `__require(id)`, exports become
//! getters on `exports` installed before the body runs. Rewrites never add
//! or remove line breaks, so body line `n` is source line `n`.

use std::collections::HashMap;
use std::ops::Range;

use anyhow::{bail, Context, Result};

use super::lexer::{line_of, tokenize, Token, TokenKind};

/// A module-syntax construct and the source bytes it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub span: Range<usize>,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// `import ... from 'x'` or `import 'x'`; the span is the statement.
    Import { from: String, bindings: ImportBindings },
    /// `require('x')`; the span is the call.
    Require { from: String },
    /// `export const|let|var|function|class`; the span is `export `.
    ExportDeclaration { names: Vec<String> },
    /// `export default function name` or `class Name`; the span is
    /// `export default `.
    ExportDefaultDeclaration { name: String },
    /// `export default <expr>`; the span is `export default`.
    ExportDefaultExpression,
    /// `export { a, b as c } [from 'x']`; the span is the statement.
    ExportList { names: Vec<ExportName>, from: Option<String> },
    /// `export * [as ns] from 'x'`; the span is the statement.
    ExportAll { from: String, alias: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBindings {
    pub default: Option<String>,
    pub namespace: Option<String>,
    /// `(imported, local)`; `imported` keeps quotes when it is a string.
    pub named: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportName {
    pub local: String,
    pub exported: String,
}

impl Item {
    /// The module this item loads, if any.
    pub fn dependency(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Import { from, .. }
            | ItemKind::Require { from }
            | ItemKind::ExportAll { from, .. } => Some(from),
            ItemKind::ExportList { from, .. } => from.as_deref(),
            _ => None,
        }
    }

    fn is_export(&self) -> bool {
        !matches!(self.kind, ItemKind::Import { .. } | ItemKind::Require { .. })
    }
}

/// Relative specifiers are bundled; anything else is a package.
pub fn is_local(spec: &str) -> bool {
    spec.starts_with("./") || spec.starts_with("../")
}

/// Find every module-syntax item, in source order.
pub fn analyze(src: &str) -> Result<Vec<Item>> {
    let tokens = tokenize(src)?;
    let sig: Vec<Token<'_>> = tokens.into_iter().filter(|t| !t.is_trivia()).collect();
    Parser {
        src,
        sig,
        pos: 0,
        items: Vec::new(),
    }
    .run()
}

/// A module rewritten for the bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Statements that run before the body: export getters.
    pub header: String,
    pub body: String,
    /// Package imports, moved to the top of the bundle.
    pub hoisted: Vec<String>,
}

/// Rewrite `src`, mapping each local specifier through `ids`.
pub fn render(src: &str, items: &[Item], ids: &HashMap<String, String>) -> Result<Rendered> {
    let id_of = |spec: &str| -> Result<String> {
        ids.get(spec)
            .map(|id| quote(id))
            .with_context(|| format!("unresolved import '{spec}'"))
    };

    let mut out = Rendered::default();
    let mut getters: Vec<(String, String)> = Vec::new();
    let mut cursor = 0;

    for item in items {
        out.body.push_str(&src[cursor..item.span.start]);
        let original = &src[item.span.clone()];

        let replacement = match &item.kind {
            ItemKind::Import { from, .. } if !is_local(from) => {
                out.hoisted.push(original.trim_end().to_string());
                String::new()
            }
            ItemKind::Import { from, bindings } => import_statement(&id_of(from)?, bindings),
            ItemKind::Require { from } if !is_local(from) => original.to_string(),
            ItemKind::Require { from } => format!("__require({})", id_of(from)?),
            ItemKind::ExportDeclaration { names } => {
                getters.extend(names.iter().map(|n| (n.clone(), n.clone())));
                String::new()
            }
            ItemKind::ExportDefaultDeclaration { name } => {
                getters.push(("default".to_string(), name.clone()));
                String::new()
            }
            ItemKind::ExportDefaultExpression => "exports.default =".to_string(),
            ItemKind::ExportList { names, from: None } => {
                getters.extend(names.iter().map(|n| (n.exported.clone(), n.local.clone())));
                String::new()
            }
            ItemKind::ExportList {
                names,
                from: Some(from),
            } => {
                let id = id_of(from)?;
                getters.extend(
                    names
                        .iter()
                        .map(|n| (n.exported.clone(), format!("__require({id}){}", member(&n.local)))),
                );
                format!("__require({id});")
            }
            ItemKind::ExportAll { from, alias: None } => {
                format!("__exportStar(exports, __require({}));", id_of(from)?)
            }
            ItemKind::ExportAll {
                from,
                alias: Some(alias),
            } => {
                let id = id_of(from)?;
                getters.push((alias.clone(), format!("__require({id})")));
                format!("__require({id});")
            }
        };

        out.body.push_str(&replacement);
        out.body.push_str(&"\n".repeat(original.matches('\n').count()));
        cursor = item.span.end;
    }
    out.body.push_str(&src[cursor..]);

    if items.iter().any(Item::is_export) {
        let fields: Vec<String> = getters
            .iter()
            .map(|(name, expr)| format!("{}: () => {expr}", quote(unquote(name))))
            .collect();
        out.header = format!("__export(exports, {{{}}});", fields.join(", "));
    }
    Ok(out)
}

fn import_statement(id: &str, bindings: &ImportBindings) -> String {
    let mut declarators = Vec::new();
    if let Some(ns) = &bindings.namespace {
        declarators.push(format!("{ns} = __require({id})"));
    }
    if let Some(default) = &bindings.default {
        declarators.push(format!("{default} = __default(__require({id}))"));
    }
    if !bindings.named.is_empty() {
        let fields: Vec<String> = bindings
            .named
            .iter()
            .map(|(imported, local)| {
                if imported == local {
                    local.clone()
                } else {
                    format!("{imported}: {local}")
                }
            })
            .collect();
        declarators.push(format!("{{ {} }} = __require({id})", fields.join(", ")));
    }

    if declarators.is_empty() {
        format!("__require({id});")
    } else {
        format!("const {};", declarators.join(", "))
    }
}

/// Property access for an export name, which may be a string literal.
fn member(name: &str) -> String {
    if name.starts_with(['"', '\'']) {
        format!("[{}]", quote(unquote(name)))
    } else {
        format!(".{name}")
    }
}

fn unquote(text: &str) -> &str {
    text.strip_prefix(['"', '\''])
        .and_then(|t| t.strip_suffix(['"', '\'']))
        .unwrap_or(text)
}

fn quote(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

struct Parser<'a> {
    src: &'a str,
    sig: Vec<Token<'a>>,
    pos: usize,
    items: Vec<Item>,
}

impl<'a> Parser<'a> {
    fn run(mut self) -> Result<Vec<Item>> {
        let mut depth: i32 = 0;
        while let Some(tok) = self.peek(0) {
            match tok.kind {
                TokenKind::Punct if matches!(tok.text, "{" | "(" | "[") => depth += 1,
                TokenKind::Punct if matches!(tok.text, "}" | ")" | "]") => depth -= 1,
                TokenKind::Template => {
                    if tok.text.starts_with('}') {
                        depth -= 1;
                    }
                    if tok.text.ends_with("${") {
                        depth += 1;
                    }
                }
                TokenKind::Ident if tok.text == "require" && self.is_require_call() => {
                    let lit = self.sig[self.pos + 2];
                    self.items.push(Item {
                        span: tok.start..self.sig[self.pos + 3].end(),
                        kind: ItemKind::Require {
                            from: unquote(lit.text).to_string(),
                        },
                    });
                }
                TokenKind::Ident if depth == 0 && self.is_declaration_start("import") => {
                    let start = self.pos;
                    let item = self
                        .import()
                        .with_context(|| format!("malformed import on line {}", self.line(start)))?;
                    self.items.push(item);
                    continue;
                }
                TokenKind::Ident if depth == 0 && tok.text == "export" => {
                    let start = self.pos;
                    let item = self
                        .export()
                        .with_context(|| format!("malformed export on line {}", self.line(start)))?;
                    self.items.push(item);
                    continue;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Ok(self.items)
    }

    fn peek(&self, ahead: usize) -> Option<Token<'a>> {
        self.sig.get(self.pos + ahead).copied()
    }

    fn line(&self, index: usize) -> usize {
        self.sig.get(index).map_or(0, |t| line_of(self.src, t.start))
    }

    fn next(&mut self) -> Result<Token<'a>> {
        let tok = self.peek(0).context("unexpected end of file")?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect_punct(&mut self, p: &str) -> Result<()> {
        let tok = self.next()?;
        if !tok.is_punct(p) {
            bail!("expected '{p}', found '{}'", tok.text);
        }
        Ok(())
    }

    fn expect_ident(&mut self, name: &str) -> Result<()> {
        let tok = self.next()?;
        if !tok.is_ident(name) {
            bail!("expected '{name}', found '{}'", tok.text);
        }
        Ok(())
    }

    fn binding(&mut self) -> Result<String> {
        let tok = self.next()?;
        if tok.kind != TokenKind::Ident {
            bail!("expected a name, found '{}'", tok.text);
        }
        Ok(tok.text.to_string())
    }

    /// An identifier or string literal, as written.
    fn module_export_name(&mut self) -> Result<String> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Ident | TokenKind::Str => Ok(tok.text.to_string()),
            _ => bail!("expected a name, found '{}'", tok.text),
        }
    }

    fn string_literal(&mut self) -> Result<String> {
        let tok = self.next()?;
        if tok.kind != TokenKind::Str {
            bail!("expected a module specifier, found '{}'", tok.text);
        }
        Ok(unquote(tok.text).to_string())
    }

    fn previous_is_dot(&self) -> bool {
        self.pos > 0 && self.sig[self.pos - 1].is_punct(".")
    }

    fn is_require_call(&self) -> bool {
        !self.previous_is_dot()
            && self.peek(1).is_some_and(|t| t.is_punct("("))
            && self.peek(2).is_some_and(|t| t.kind == TokenKind::Str)
            && self.peek(3).is_some_and(|t| t.is_punct(")"))
    }

    /// `import` as a statement, not `import(...)` or `import.meta`.
    fn is_declaration_start(&self, keyword: &str) -> bool {
        self.peek(0).is_some_and(|t| t.is_ident(keyword))
            && !self.previous_is_dot()
            && self
                .peek(1)
                .is_some_and(|t| !t.is_punct("(") && !t.is_punct("."))
    }

    /// Span from the token at `start` to the end of the last consumed
    /// token, swallowing an optional `;`.
    fn statement_span(&mut self, start: usize) -> Range<usize> {
        if self.peek(0).is_some_and(|t| t.is_punct(";")) {
            self.pos += 1;
        }
        self.sig[start].start..self.sig[self.pos - 1].end()
    }

    /// Span from the token at `start` up to the next significant token.
    fn keyword_span(&self, start: usize) -> Range<usize> {
        let end = self.peek(0).map_or(self.src.len(), |t| t.start);
        self.sig[start].start..end
    }

    fn import(&mut self) -> Result<Item> {
        let start = self.pos;
        self.expect_ident("import")?;
        let mut bindings = ImportBindings::default();

        if self.peek(0).is_some_and(|t| t.kind == TokenKind::Str) {
            let from = self.string_literal()?;
            return Ok(Item {
                span: self.statement_span(start),
                kind: ItemKind::Import { from, bindings },
            });
        }

        if self.peek(0).is_some_and(|t| t.kind == TokenKind::Ident) {
            bindings.default = Some(self.binding()?);
            if self.peek(0).is_some_and(|t| t.is_punct(",")) {
                self.pos += 1;
            }
        }
        if self.peek(0).is_some_and(|t| t.is_punct("*")) {
            self.pos += 1;
            self.expect_ident("as")?;
            bindings.namespace = Some(self.binding()?);
        } else if self.peek(0).is_some_and(|t| t.is_punct("{")) {
            self.pos += 1;
            while !self.peek(0).is_some_and(|t| t.is_punct("}")) {
                let imported = self.module_export_name()?;
                let local = if self.peek(0).is_some_and(|t| t.is_ident("as")) {
                    self.pos += 1;
                    self.binding()?
                } else {
                    imported.clone()
                };
                bindings.named.push((imported, local));
                if self.peek(0).is_some_and(|t| t.is_punct(",")) {
                    self.pos += 1;
                }
            }
            self.expect_punct("}")?;
        }

        self.expect_ident("from")?;
        let from = self.string_literal()?;
        Ok(Item {
            span: self.statement_span(start),
            kind: ItemKind::Import { from, bindings },
        })
    }

    fn export(&mut self) -> Result<Item> {
        let start = self.pos;
        self.expect_ident("export")?;
        let tok = self.peek(0).context("unexpected end of file")?;

        if tok.is_ident("default") {
            self.pos += 1;
            if let Some(name) = self.declaration_name() {
                return Ok(Item {
                    span: self.keyword_span(start),
                    kind: ItemKind::ExportDefaultDeclaration { name },
                });
            }
            return Ok(Item {
                span: self.sig[start].start..self.sig[self.pos - 1].end(),
                kind: ItemKind::ExportDefaultExpression,
            });
        }

        if tok.is_punct("*") {
            self.pos += 1;
            let alias = if self.peek(0).is_some_and(|t| t.is_ident("as")) {
                self.pos += 1;
                Some(self.module_export_name()?)
            } else {
                None
            };
            self.expect_ident("from")?;
            let from = self.string_literal()?;
            return Ok(Item {
                span: self.statement_span(start),
                kind: ItemKind::ExportAll { from, alias },
            });
        }

        if tok.is_punct("{") {
            self.pos += 1;
            let mut names = Vec::new();
            while !self.peek(0).is_some_and(|t| t.is_punct("}")) {
                let local = self.module_export_name()?;
                let exported = if self.peek(0).is_some_and(|t| t.is_ident("as")) {
                    self.pos += 1;
                    self.module_export_name()?
                } else {
                    local.clone()
                };
                names.push(ExportName { local, exported });
                if self.peek(0).is_some_and(|t| t.is_punct(",")) {
                    self.pos += 1;
                }
            }
            self.expect_punct("}")?;
            let from = if self.peek(0).is_some_and(|t| t.is_ident("from")) {
                self.pos += 1;
                Some(self.string_literal()?)
            } else {
                None
            };
            return Ok(Item {
                span: self.statement_span(start),
                kind: ItemKind::ExportList { names, from },
            });
        }

        let span = self.keyword_span(start);
        let names = if matches!(tok.text, "const" | "let" | "var") && tok.kind == TokenKind::Ident {
            // The declaration itself is scanned again by the caller.
            let resume = self.pos;
            self.pos += 1;
            let names = self.declared_names();
            self.pos = resume;
            names
        } else {
            let name = self
                .declaration_name()
                .with_context(|| format!("unsupported export of '{}'", tok.text))?;
            vec![name]
        };
        Ok(Item {
            span,
            kind: ItemKind::ExportDeclaration { names },
        })
    }

    /// Name of a `function`, `async function`, generator or `class`
    /// declaration starting at the cursor. Leaves the cursor in place.
    fn declaration_name(&self) -> Option<String> {
        let mut ahead = 0;
        if self.peek(ahead)?.is_ident("async") {
            ahead += 1;
        }
        let keyword = self.peek(ahead)?;
        if !(keyword.is_ident("function") || keyword.is_ident("class")) {
            return None;
        }
        ahead += 1;
        if self.peek(ahead)?.is_punct("*") {
            ahead += 1;
        }
        let name = self.peek(ahead)?;
        (name.kind == TokenKind::Ident && !name.is_ident("extends")).then(|| name.text.to_string())
    }

    /// Names bound by a `const`/`let`/`var` declarator list, including
    /// destructuring patterns. Advances the cursor past the list.
    fn declared_names(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            match self.peek(0) {
                Some(t) if t.kind == TokenKind::Ident => {
                    names.push(t.text.to_string());
                    self.pos += 1;
                }
                Some(t) if t.is_punct("{") || t.is_punct("[") => self.pattern_names(&mut names),
                _ => break,
            }
            if self.peek(0).is_some_and(|t| t.is_punct("=")) {
                self.pos += 1;
                self.skip_expression();
            }
            if self.peek(0).is_some_and(|t| t.is_punct(",")) {
                self.pos += 1;
            } else {
                break;
            }
        }
        names
    }

    fn pattern_names(&mut self, names: &mut Vec<String>) {
        let mut depth = 0;
        while let Some(tok) = self.peek(0) {
            self.pos += 1;
            if tok.is_punct("{") || tok.is_punct("[") {
                depth += 1;
            } else if tok.is_punct("}") || tok.is_punct("]") {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            } else if tok.is_punct("=") {
                self.skip_expression();
            } else if tok.kind == TokenKind::Ident {
                let next = self.peek(0);
                if next.is_some_and(|n| ["}", "]", ",", "="].iter().any(|p| n.is_punct(p))) {
                    names.push(tok.text.to_string());
                }
            }
        }
    }

    /// Skip one assignment expression: up to a `,`, `;` or closing bracket
    /// at the current nesting, or a line break where the statement ends.
    fn skip_expression(&mut self) {
        let mut depth = 0;
        while let Some(tok) = self.peek(0) {
            if depth == 0 {
                if tok.is_punct(",") || tok.is_punct(";") || tok.is_punct("}") || tok.is_punct("]") {
                    return;
                }
                if self.pos > 0 && self.ends_statement(self.sig[self.pos - 1], tok) {
                    return;
                }
            }
            match tok.kind {
                TokenKind::Punct if matches!(tok.text, "{" | "(" | "[") => depth += 1,
                TokenKind::Punct if matches!(tok.text, "}" | ")" | "]") => depth -= 1,
                TokenKind::Template => {
                    if tok.text.starts_with('}') {
                        depth -= 1;
                    }
                    if tok.text.ends_with("${") {
                        depth += 1;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Whether a line break between `prev` and `next` ends the statement.
    fn ends_statement(&self, prev: Token<'_>, next: Token<'_>) -> bool {
        if !self.src[prev.end()..next.start].contains('\n') {
            return false;
        }
        let prev_complete = match prev.kind {
            TokenKind::Punct => matches!(prev.text, ")" | "]" | "}"),
            TokenKind::Template => prev.text.ends_with('`'),
            _ => true,
        };
        let next_continues = match next.kind {
            TokenKind::Punct => !matches!(next.text, "!" | "~" | "{" | ";"),
            TokenKind::Template => next.text.starts_with('`'),
            TokenKind::Ident => matches!(next.text, "in" | "instanceof" | "of"),
            _ => false,
        };
        prev_complete && !next_continues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(s, i)| (s.to_string(), i.to_string())).collect()
    }

    fn rewrite(src: &str, pairs: &[(&str, &str)]) -> Rendered {
        let items = analyze(src).unwrap();
        render(src, &items, &ids(pairs)).unwrap()
    }

    #[test]
    fn default_and_aliased_imports_bind_their_local_names() {
        let out = rewrite(
            "import menu from './menu';\nimport { a as b, c } from './lib';\nmenu(b, c);\n",
            &[("./menu", "menu.js"), ("./lib", "lib.js")],
        );
        assert_eq!(
            out.body,
            "const menu = __default(__require(\"menu.js\"));\n\
             const { a: b, c } = __require(\"lib.js\");\nmenu(b, c);\n"
        );
        assert!(out.header.is_empty());
    }

    #[test]
    fn namespace_and_mixed_imports() {
        let out = rewrite(
            "import * as util from './util';\nimport d, { x } from './d';\n",
            &[("./util", "u.js"), ("./d", "d.js")],
        );
        assert_eq!(
            out.body,
            "const util = __require(\"u.js\");\n\
             const d = __default(__require(\"d.js\")), { x } = __require(\"d.js\");\n"
        );
    }

    #[test]
    fn anonymous_default_export_becomes_an_assignment() {
        let out = rewrite("export default function () { return 1; }\n", &[]);
        assert_eq!(out.body, "exports.default = function () { return 1; }\n");
        assert_eq!(out.header, "__export(exports, {});");
    }

    #[test]
    fn named_default_export_keeps_the_declaration() {
        let out = rewrite("export default class Menu {}\n", &[]);
        assert_eq!(out.body, "class Menu {}\n");
        assert_eq!(out.header, "__export(exports, {\"default\": () => Menu});");
    }

    #[test]
    fn declarations_and_lists_become_getters() {
        let src = "export const a = 1, { b, c: [d] } = obj;\nexport async function go() {}\nconst e = 2;\nexport { e as f };\n";
        let out = rewrite(src, &[]);
        assert_eq!(
            out.body,
            "const a = 1, { b, c: [d] } = obj;\nasync function go() {}\nconst e = 2;\n\n"
        );
        assert_eq!(
            out.header,
            "__export(exports, {\"a\": () => a, \"b\": () => b, \"d\": () => d, \"go\": () => go, \"f\": () => e});"
        );
    }

    #[test]
    fn multi_line_import_keeps_line_count() {
        let src = "import {\n  slider,\n} from './slider';\nslider();\n";
        let items = analyze(src).unwrap();
        assert_eq!(items[0].dependency(), Some("./slider"));

        let out = render(src, &items, &ids(&[("./slider", "slider.js")])).unwrap();
        assert_eq!(out.body, "const { slider } = __require(\"slider.js\");\n\n\nslider();\n");
        assert_eq!(out.body.lines().count(), src.lines().count());
    }

    #[test]
    fn re_exports_and_requires() {
        let src = "export * from './a';\nexport { x as y } from './b';\nconst c = require('./c');\nconst fs = require('fs');\n";
        let out = rewrite(src, &[("./a", "a.js"), ("./b", "b.js"), ("./c", "c.js")]);
        assert_eq!(
            out.body,
            "__exportStar(exports, __require(\"a.js\"));\n__require(\"b.js\");\n\
             const c = __require(\"c.js\");\nconst fs = require('fs');\n"
        );
        assert_eq!(out.header, "__export(exports, {\"y\": () => __require(\"b.js\").x});");
    }

    #[test]
    fn package_imports_are_hoisted() {
        let out = rewrite("import React from 'react';\nReact.go();\n", &[]);
        assert_eq!(out.hoisted, vec!["import React from 'react';".to_string()]);
        assert_eq!(out.body, "\nReact.go();\n");
    }

    #[test]
    fn module_syntax_inside_strings_and_blocks_is_ignored() {
        let src = "const s = 'import x from \"./no\"';\nif (x) { const export_ = 1; }\nimport('./lazy');\n";
        assert!(analyze(src).unwrap().is_empty());
    }

    #[test]
    fn malformed_import_names_the_line() {
        let err = analyze("ok();\nimport { a from './a';\n").unwrap_err();
        assert!(format!("{err:#}").starts_with("malformed import on line 2"));
    }
}
