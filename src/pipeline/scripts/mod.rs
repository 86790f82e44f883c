// src/pipeline/scripts/mod.rs

//! Script bundler.
//!
//! The bundle holds the entry file's local import graph in dependency
//! order, every module once. Each module becomes a function in a small
//! registry and runs on first `__require`, so modules keep their own scope
//! and `import`/`export`/`require` are rewritten to registry calls (see
//! [`rewrite`]). Package imports (`import x from "lodash"`) are moved to
//! the top of the bundle untouched.
//!
//! Development builds keep comments and add a v3 sourcemap with line
//! mappings; production builds drop comments, indentation and blank lines.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::debug;

use crate::fs::FileSystem;
use crate::pipeline::sources::{normalize, to_slash};
use crate::pipeline::{PipelineContext, TaskReport};
use crate::types::BuildMode;

pub mod lexer;
pub mod rewrite;

use rewrite::{Item, Rendered};

/// Runtime shared by every bundle. Ends with the opening of the module
/// table; each line is one unmapped line of output.
const PRELUDE: &str = r#"(function () {
var __modules = {}, __cache = {};
function __require(id) {
if (__cache[id]) return __cache[id].exports;
var module = __cache[id] = { exports: {} };
__modules[id].call(module.exports, module, module.exports, __require);
return module.exports;
}
function __export(exports, getters) {
Object.defineProperty(exports, "__esModule", { value: true });
for (var name in getters) Object.defineProperty(exports, name, { enumerable: true, get: getters[name] });
}
function __exportStar(exports, source) {
Object.keys(source).forEach(function (name) {
if (name !== "default" && !(name in exports)) Object.defineProperty(exports, name, { enumerable: true, get: function () { return source[name]; } });
});
}
function __default(m) {
return m && m.__esModule ? m.default : m;
}
"#;

/// One source module, in bundle order.
#[derive(Debug, Clone)]
struct Module {
    /// Registry id and display name (root-relative, forward slashes).
    name: String,
    source: String,
    items: Vec<Item>,
    /// Local specifier to the id of the module it resolved to.
    ids: HashMap<String, String>,
}

/// A generated bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub code: String,
    /// Sourcemap JSON, development builds only.
    pub map: Option<String>,
}

/// Build the configured bundle and write it (plus its `.map`).
pub fn run(ctx: &PipelineContext, mode: BuildMode) -> TaskReport {
    let cfg = ctx.config.scripts();
    let entry = ctx.resolve(&cfg.entry_file);
    let filename = cfg.filename_for(mode.is_production());
    let out_path = ctx.resolve(&cfg.output_dir).join(filename);

    let result = bundle(ctx.fs.as_ref(), &ctx.root, &entry, mode, filename).and_then(|bundle| {
        // Nothing is written unless bundling fully succeeded.
        let mut outputs = Vec::new();
        ctx.write_artifact(&out_path, bundle.code.as_bytes())?;
        outputs.push(out_path.clone());

        if let Some(map) = bundle.map {
            let map_path = out_path.with_file_name(format!("{filename}.map"));
            ctx.write_artifact(&map_path, map.as_bytes())?;
            outputs.push(map_path);
        }
        Ok(outputs)
    });

    TaskReport::from_result(&entry, result)
}

/// Bundle `entry` and its local imports into one script.
pub fn bundle(
    fs: &dyn FileSystem,
    root: &Path,
    entry: &Path,
    mode: BuildMode,
    output_filename: &str,
) -> Result<Bundle> {
    let modules = collect_modules(fs, root, entry)?;
    debug!(entry = %entry.display(), modules = modules.len(), "resolved script modules");

    let mut rendered = Vec::with_capacity(modules.len());
    for module in &modules {
        let out = rewrite::render(&module.source, &module.items, &module.ids)
            .with_context(|| format!("rewriting {}", module.name))?;
        rendered.push(out);
    }

    match mode {
        BuildMode::Development => Ok(render_development(&modules, &rendered, output_filename)),
        BuildMode::Production => Ok(Bundle {
            code: render_production(&modules, &rendered)?,
            map: None,
        }),
    }
}

/// Depth-first walk; a module is emitted after all of its imports. The
/// entry module comes last.
fn collect_modules(fs: &dyn FileSystem, root: &Path, entry: &Path) -> Result<Vec<Module>> {
    let mut ordered = Vec::new();
    let mut visited = HashSet::new();
    visit(fs, root, &normalize(entry), &mut visited, &mut ordered)?;
    Ok(ordered)
}

fn module_name(root: &Path, path: &Path) -> String {
    to_slash(path.strip_prefix(root).unwrap_or(path))
}

fn visit(
    fs: &dyn FileSystem,
    root: &Path,
    path: &Path,
    visited: &mut HashSet<PathBuf>,
    ordered: &mut Vec<Module>,
) -> Result<()> {
    if !visited.insert(path.to_path_buf()) {
        return Ok(());
    }

    let source = fs.read_to_string(path)?;
    let items = rewrite::analyze(&source).with_context(|| format!("parsing {}", path.display()))?;
    let dir = path.parent().unwrap_or(root);

    let mut ids = HashMap::new();
    for item in &items {
        let Some(spec) = item.dependency() else {
            continue;
        };
        if !rewrite::is_local(spec) {
            if matches!(item.kind, rewrite::ItemKind::ExportList { .. } | rewrite::ItemKind::ExportAll { .. }) {
                bail!("{}: re-exporting package '{spec}' is not supported", path.display());
            }
            continue;
        }
        let dep = resolve_import(fs, dir, spec).with_context(|| {
            let line = lexer::line_of(&source, item.span.start);
            format!("{}:{line}: cannot resolve import '{spec}'", path.display())
        })?;
        visit(fs, root, &dep, visited, ordered)?;
        ids.insert(spec.to_string(), module_name(root, &dep));
    }

    ordered.push(Module {
        name: module_name(root, path),
        source,
        items,
        ids,
    });
    Ok(())
}

/// `./x` resolves to `x`, `x.js` or `x/index.js`, in that order.
fn resolve_import(fs: &dyn FileSystem, dir: &Path, spec: &str) -> Result<PathBuf> {
    let base = normalize(&dir.join(spec));
    let mut candidates = vec![base.clone()];
    if base.extension().is_none() {
        candidates.push(base.with_extension("js"));
    }
    candidates.push(base.join("index.js"));

    match candidates.into_iter().find(|c| fs.is_file(c)) {
        Some(found) => Ok(found),
        None => bail!("no such module {}", base.display()),
    }
}

fn quoted(name: &str) -> String {
    serde_json::Value::from(name).to_string()
}

fn hoisted_imports(rendered: &[Rendered]) -> String {
    let mut seen = HashSet::new();
    let mut out = String::new();
    for line in rendered.iter().flat_map(|r| &r.hoisted) {
        if seen.insert(line.as_str()) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn module_opening(module: &Module, rendered: &Rendered) -> String {
    format!(
        "__modules[{}] = function (module, exports, __require) {{{}\n",
        quoted(&module.name),
        rendered.header
    )
}

fn entry_call(modules: &[Module]) -> String {
    match modules.last() {
        Some(entry) => format!("__require({});\n}})();\n", quoted(&entry.name)),
        None => "})();\n".to_string(),
    }
}

fn render_development(modules: &[Module], rendered: &[Rendered], output_filename: &str) -> Bundle {
    let mut code = hoisted_imports(rendered);
    let mut mappings = MappingsBuilder::default();
    for _ in 0..code.lines().count() + PRELUDE.lines().count() {
        mappings.unmapped_line();
    }
    code.push_str(PRELUDE);

    for (source_idx, (module, out)) in modules.iter().zip(rendered).enumerate() {
        code.push_str(&format!("/* {} */\n", module.name));
        code.push_str(&module_opening(module, out));
        mappings.unmapped_line();
        mappings.unmapped_line();

        for (line_no, line) in out.body.lines().enumerate() {
            code.push_str(line);
            code.push('\n');
            mappings.mapped_line(source_idx, line_no);
        }
        code.push_str("};\n");
        mappings.unmapped_line();
    }
    code.push_str(&entry_call(modules));
    code.push_str(&format!("//# sourceMappingURL={output_filename}.map\n"));

    let map = json!({
        "version": 3,
        "file": output_filename,
        "sources": modules.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        "sourcesContent": modules.iter().map(|m| m.source.as_str()).collect::<Vec<_>>(),
        "names": [],
        "mappings": mappings.finish(),
    });

    Bundle {
        code,
        map: Some(map.to_string()),
    }
}

fn render_production(modules: &[Module], rendered: &[Rendered]) -> Result<String> {
    let mut code = hoisted_imports(rendered);
    code.push_str(PRELUDE);
    for (module, out) in modules.iter().zip(rendered) {
        code.push_str(&module_opening(module, out));
        code.push_str(&lexer::minify(&out.body).with_context(|| format!("minifying {}", module.name))?);
        code.push_str("};\n");
    }
    code.push_str(&entry_call(modules));
    Ok(code)
}

/// Accumulates the `mappings` field of a v3 sourcemap, one segment per
/// generated line at column 0.
#[derive(Debug, Default)]
struct MappingsBuilder {
    lines: Vec<String>,
    prev_source: i64,
    prev_line: i64,
}

impl MappingsBuilder {
    fn unmapped_line(&mut self) {
        self.lines.push(String::new());
    }

    fn mapped_line(&mut self, source: usize, line: usize) {
        let (source, line) = (source as i64, line as i64);
        let mut segment = String::new();
        vlq_encode(0, &mut segment);
        vlq_encode(source - self.prev_source, &mut segment);
        vlq_encode(line - self.prev_line, &mut segment);
        vlq_encode(0, &mut segment);
        self.prev_source = source;
        self.prev_line = line;
        self.lines.push(segment);
    }

    fn finish(self) -> String {
        self.lines.join(";")
    }
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn vlq_encode(value: i64, out: &mut String) {
    let mut v = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = (v & 0b1_1111) as usize;
        v >>= 5;
        if v > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64[digit] as char);
        if v == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn project() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/p/js/main.js",
            "import { slider } from './vendor/slider';\nimport { menu } from './vendor/menu.js';\n\nslider(menu());\n",
        );
        fs.add_file(
            "/p/js/vendor/slider.js",
            "import { menu } from './menu';\nexport function slider(x) {\n  return x;\n}\n",
        );
        fs.add_file("/p/js/vendor/menu.js", "// menu\nexport const menu = () => 1;\n");
        fs
    }

    fn build(fs: &MockFileSystem, entry: &str, mode: BuildMode) -> Bundle {
        bundle(fs, Path::new("/p"), Path::new(entry), mode, "main.js").unwrap()
    }

    #[test]
    fn dependencies_come_first_and_once() {
        let b = build(&project(), "/p/js/main.js", BuildMode::Development);

        let menu = b.code.find("/* js/vendor/menu.js */").unwrap();
        let slider = b.code.find("/* js/vendor/slider.js */").unwrap();
        let main = b.code.find("/* js/main.js */").unwrap();
        assert!(menu < slider && slider < main);
        assert_eq!(b.code.matches("const menu = () => 1;").count(), 1);
        assert!(b.code.contains("const { menu } = __require(\"js/vendor/menu.js\");"));
        assert!(b.code.contains("__export(exports, {\"slider\": () => slider});"));
        assert!(b.code.contains("__require(\"js/main.js\");\n})();\n"));
        assert!(!b.code.contains("import"));
        assert!(b.code.ends_with("//# sourceMappingURL=main.js.map\n"));
    }

    #[test]
    fn sourcemap_lists_sources_and_line_mappings() {
        let b = build(&project(), "/p/js/main.js", BuildMode::Development);

        let map: serde_json::Value = serde_json::from_str(b.map.as_deref().unwrap()).unwrap();
        assert_eq!(map["version"], 3);
        assert_eq!(
            map["sources"],
            json!(["js/vendor/menu.js", "js/vendor/slider.js", "js/main.js"])
        );
        // Runtime, banner and opening lines unmapped, then menu.js lines 0 and 1.
        let unmapped = ";".repeat(PRELUDE.lines().count() + 2);
        let mappings = map["mappings"].as_str().unwrap();
        assert!(mappings.starts_with(&format!("{unmapped}AAAA;AACA;")));
        assert_eq!(mappings.split(';').count(), b.code.lines().count() - 3);
    }

    #[test]
    fn production_drops_comments_and_map() {
        let b = build(&project(), "/p/js/main.js", BuildMode::Production);
        assert!(b.map.is_none());
        assert!(!b.code.contains("//"));
        assert!(!b.code.contains("/*"));
        assert!(!b.code.contains("\n\n"));
        assert!(b.code.contains("function slider(x) {\nreturn x;\n}\n"));
    }

    #[test]
    fn production_keeps_code_sharing_a_line_with_a_comment() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/main.js", "/* banner */ var a = 1;\nvar b = 2;\nwindow.x = a + b;\n");
        let b = build(&fs, "/p/main.js", BuildMode::Production);
        assert!(b
            .code
            .contains("= function (module, exports, __require) {\nvar a = 1;\nvar b = 2;\nwindow.x = a + b;\n};\n"));
    }

    #[test]
    fn default_and_aliased_imports_are_bound() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/p/main.js",
            "import menu from './menu';\nimport { open as show } from './dialog';\nmenu(show);\n",
        );
        fs.add_file("/p/menu.js", "export default function () { return 1; }\n");
        fs.add_file("/p/dialog.js", "export function open() {}\n");
        let b = build(&fs, "/p/main.js", BuildMode::Production);

        assert!(b.code.contains("exports.default = function () { return 1; }"));
        assert!(b.code.contains("const menu = __default(__require(\"menu.js\"));"));
        assert!(b.code.contains("const { open: show } = __require(\"dialog.js\");"));
        assert!(b.code.contains("__export(exports, {\"open\": () => open});\nfunction open() {}"));
    }

    #[test]
    fn multi_line_imports_are_bundled() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/main.js", "import {\n  slider,\n} from './slider';\nslider();\n");
        fs.add_file("/p/slider.js", "export const slider = () => {};\n");
        let b = build(&fs, "/p/main.js", BuildMode::Development);

        assert!(b.code.contains("/* slider.js */"));
        assert!(b.code.contains("const { slider } = __require(\"slider.js\");\n\n\nslider();\n"));
    }

    #[test]
    fn package_reexport_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/main.js", "export { map } from 'lodash';\n");
        let err = bundle(&fs, Path::new("/p"), Path::new("/p/main.js"), BuildMode::Development, "main.js")
            .unwrap_err();
        assert!(format!("{err:#}").contains("re-exporting package 'lodash'"));
    }

    #[test]
    fn missing_import_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/main.js", "ok();\nimport './nope';\n");
        let err = bundle(&fs, Path::new("/p"), Path::new("/p/main.js"), BuildMode::Development, "main.js")
            .unwrap_err();
        assert!(format!("{err:#}").contains("main.js:2: cannot resolve import './nope'"));
    }

    #[test]
    fn import_cycles_terminate() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/a.js", "import './b';\nconst a = 1;\n");
        fs.add_file("/p/b.js", "import './a';\nconst b = 2;\n");
        let b = build(&fs, "/p/a.js", BuildMode::Production);

        let b_pos = b.code.find("__modules[\"b.js\"]").unwrap();
        let a_pos = b.code.find("__modules[\"a.js\"]").unwrap();
        assert!(b_pos < a_pos);
        assert_eq!(b.code.matches("= function (module").count(), 2);
        assert!(b.code.contains("__require(\"a.js\");\nconst b = 2;\n"));
    }

    #[test]
    fn vlq_matches_known_values() {
        let mut s = String::new();
        for v in [0, 1, -1, 16, 123] {
            vlq_encode(v, &mut s);
            s.push(',');
        }
        assert_eq!(s, "A,C,D,gB,2H,");
    }
}
