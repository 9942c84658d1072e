//! Heuristic source classification
//!
//! Inspects a raw source string and decides its content type (Python, HTML
//! document/fragment, CSS-only, JS variants) plus notable feature signals.
//! This is pattern matching, not parsing: ambiguous input (a string literal
//! containing `<html>`, a CSS id selector at the start of a line reading as
//! a Python comment) can misclassify. The priority ordering below is the
//! contract; unclassifiable text always falls back to plain JavaScript.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Supported Python libraries, as (display name, import module) pairs
pub const SUPPORTED_LIBRARIES: &[(&str, &str)] = &[
    ("numpy", "numpy"),
    ("pandas", "pandas"),
    ("matplotlib", "matplotlib"),
    ("requests", "requests"),
    ("scipy", "scipy"),
    ("scikit-learn", "sklearn"),
];

/// Classified content type of a source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    Python,
    HtmlDocument,
    HtmlFragment,
    CssOnly,
    ReactJsx,
    EsModule,
    AsyncJs,
    DomJs,
    Javascript,
}

impl CodeType {
    /// Whether this type is an HTML flavor
    pub fn is_html(&self) -> bool {
        matches!(self, CodeType::HtmlDocument | CodeType::HtmlFragment)
    }

    /// Types that define the whole visible document and must always be
    /// rendered into a fresh worker
    pub fn always_fresh(&self) -> bool {
        matches!(
            self,
            CodeType::HtmlDocument | CodeType::HtmlFragment | CodeType::CssOnly
        )
    }

    /// Normalized language tag for post creation
    pub fn language_tag(&self) -> &'static str {
        match self {
            CodeType::Python => "python",
            CodeType::HtmlDocument | CodeType::HtmlFragment => "html",
            CodeType::CssOnly => "css",
            CodeType::ReactJsx => "react",
            _ => "javascript",
        }
    }
}

impl std::fmt::Display for CodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CodeType::Python => "python",
            CodeType::HtmlDocument => "html_document",
            CodeType::HtmlFragment => "html_fragment",
            CodeType::CssOnly => "css_only",
            CodeType::ReactJsx => "react_jsx",
            CodeType::EsModule => "es_module",
            CodeType::AsyncJs => "async_js",
            CodeType::DomJs => "dom_js",
            CodeType::Javascript => "javascript",
        };
        write!(f, "{}", s)
    }
}

/// Mechanism used to invoke the user code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Direct function construction and invocation
    Sync,
    /// Body wrapped in an async function and awaited
    Async,
    /// Dynamic module import
    Module,
    /// Python interpreter run
    Python,
}

/// Named feature signals detected in the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub has_html_document: bool,
    pub has_html_tags: bool,
    pub has_css_rules: bool,
    pub has_js_keywords: bool,
    pub has_es_modules: bool,
    pub has_top_level_await: bool,
    pub has_async_functions: bool,
    pub uses_dom_api: bool,
    pub has_react_hints: bool,
    /// Matched subset of the supported-library allowlist (Python only)
    pub libraries: Vec<String>,
    pub has_libraries: bool,
}

/// Output of [`classify`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub code_type: CodeType,
    pub strategy: ExecutionStrategy,
    pub features: Features,
}

static PYTHON_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#").expect("valid regex"));
static PYTHON_PRINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bprint\s*\(").expect("valid regex"));
static PYTHON_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*def\s+\w+\s*\([^)]*\)\s*:").expect("valid regex"));
static PYTHON_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*class\s+\w+.*:").expect("valid regex"));
// Python-shaped imports only: `import x [as y][, z]` to end of line, or
// `from x import ...`. A JS `import X from 'mod'` must not match.
static PYTHON_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(import\s+[\w.]+(\s+as\s+\w+)?(\s*,\s*[\w.]+(\s+as\s+\w+)?)*\s*$|from\s+[\w.]+\s+import\s)",
    )
    .expect("valid regex")
});

static HTML_DOCUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<!DOCTYPE\s+html|<html[\s>]").expect("valid regex"));
// Lowercase only: uppercase tags are JSX components, not HTML.
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-z][a-z0-9]*(\s[^<>]*)?>").expect("valid regex"));
static CSS_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)[.#]?[A-Za-z_-][\w-]*\s*\{[^{}]*:[^{}]*\}"#).expect("valid regex")
});
static JS_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(function|return|const|let|var|new|typeof)\b|=>|console\.")
        .expect("valid regex")
});
static ES_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(import\s+[\w{*][^;\n]*\s+from\s+['"]|import\s*['"]|export\s+(default\b|const\b|let\b|var\b|function\b|class\b|\{))"#)
        .expect("valid regex")
});
static TOP_LEVEL_AWAIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*((const|let|var)\s+[\w\[\]{}, ]+=\s*)?await\b").expect("valid regex")
});
static ASYNC_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\basync\s+function\b|\basync\s*\(|\basync\s+\w+\s*=>").expect("valid regex")
});
static DOM_API: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bdocument\s*\.|\bgetElementById\b|\bquerySelector(All)?\b|\baddEventListener\b|\bwindow\s*\.|\binnerHTML\b",
    )
    .expect("valid regex")
});
static REACT_HINTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\bimport\s+React\b|from\s+['"]react['"]|\buseState\s*\(|\buseEffect\s*\(|\bReactDOM\b|<[A-Z]\w*(\s[^<>]*)?/?>"#,
    )
    .expect("valid regex")
});

/// Whether the source carries any Python signature
fn looks_like_python(text: &str) -> bool {
    PYTHON_COMMENT.is_match(text)
        || PYTHON_PRINT.is_match(text)
        || PYTHON_DEF.is_match(text)
        || PYTHON_CLASS.is_match(text)
        || PYTHON_IMPORT.is_match(text)
}

/// Scan the supported-library allowlist for `import lib` / `from lib`
fn detect_libraries(text: &str) -> Vec<String> {
    SUPPORTED_LIBRARIES
        .iter()
        .filter(|(_, module)| {
            let pattern = format!(r"(?m)^\s*(import\s+{m}\b|from\s+{m}\b)", m = module);
            Regex::new(&pattern).expect("valid library regex").is_match(text)
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Classify a source string. Pure and deterministic; never fails.
///
/// Priority order: Python signatures win outright; otherwise a full HTML
/// document, then any HTML tag, then CSS-only, then React/JSX, ES modules
/// or top-level await, async functions, DOM API usage, and finally plain
/// JavaScript.
pub fn classify(text: &str) -> Classification {
    if looks_like_python(text) {
        let libraries = detect_libraries(text);
        let has_libraries = !libraries.is_empty();
        return Classification {
            code_type: CodeType::Python,
            strategy: ExecutionStrategy::Python,
            features: Features {
                libraries,
                has_libraries,
                ..Features::default()
            },
        };
    }

    // Independent signal tests; the resolution below picks the winner.
    let features = Features {
        has_html_document: HTML_DOCUMENT.is_match(text),
        has_html_tags: HTML_TAG.is_match(text),
        has_css_rules: CSS_RULE.is_match(text),
        has_js_keywords: JS_KEYWORDS.is_match(text),
        has_es_modules: ES_MODULE.is_match(text),
        has_top_level_await: TOP_LEVEL_AWAIT.is_match(text),
        has_async_functions: ASYNC_FUNCTION.is_match(text),
        uses_dom_api: DOM_API.is_match(text),
        has_react_hints: REACT_HINTS.is_match(text),
        libraries: Vec::new(),
        has_libraries: false,
    };

    let code_type = if features.has_html_document {
        CodeType::HtmlDocument
    } else if features.has_html_tags {
        CodeType::HtmlFragment
    } else if features.has_css_rules
        && !features.has_html_tags
        && !features.has_html_document
        && !features.has_js_keywords
    {
        CodeType::CssOnly
    } else if features.has_react_hints {
        CodeType::ReactJsx
    } else if features.has_es_modules || features.has_top_level_await {
        CodeType::EsModule
    } else if features.has_async_functions {
        CodeType::AsyncJs
    } else if features.uses_dom_api {
        CodeType::DomJs
    } else {
        CodeType::Javascript
    };

    let strategy = if features.has_es_modules || features.has_top_level_await {
        ExecutionStrategy::Module
    } else if features.has_async_functions {
        ExecutionStrategy::Async
    } else {
        ExecutionStrategy::Sync
    };

    Classification {
        code_type,
        strategy,
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_signatures() {
        assert_eq!(classify("def f():\n  pass").code_type, CodeType::Python);
        assert_eq!(classify("print('hi')").code_type, CodeType::Python);
        assert_eq!(classify("# a comment\nx = 1").code_type, CodeType::Python);
        assert_eq!(classify("import os").code_type, CodeType::Python);
        assert_eq!(classify("import numpy as np").code_type, CodeType::Python);
        assert_eq!(
            classify("class Foo(Bar):\n    pass").code_type,
            CodeType::Python
        );
        assert_eq!(classify("def f():").strategy, ExecutionStrategy::Python);
    }

    #[test]
    fn test_python_wins_over_html() {
        // Python signatures are checked first, even with an HTML document present.
        let mixed = "# render helper\ndef page():\n    return \"<!DOCTYPE html><html></html>\"";
        assert_eq!(classify(mixed).code_type, CodeType::Python);
    }

    #[test]
    fn test_library_allowlist() {
        let c = classify("import numpy\nfrom pandas import DataFrame\nprint(1)");
        assert_eq!(c.features.libraries, vec!["numpy", "pandas"]);
        assert!(c.features.has_libraries);

        // sklearn maps back to its display name
        let c = classify("from sklearn import svm\nprint(svm)");
        assert_eq!(c.features.libraries, vec!["scikit-learn"]);

        let c = classify("print('no libs')");
        assert!(!c.features.has_libraries);
    }

    #[test]
    fn test_html_document_and_fragment() {
        assert_eq!(
            classify("<!DOCTYPE html><html></html>").code_type,
            CodeType::HtmlDocument
        );
        assert_eq!(
            classify("<div><span>hi</span></div>").code_type,
            CodeType::HtmlFragment
        );
    }

    #[test]
    fn test_css_only() {
        let c = classify(".card { color: red; }");
        assert_eq!(c.code_type, CodeType::CssOnly);
        assert!(c.features.has_css_rules);

        // CSS-looking braces inside JS stay JS because of the keyword test.
        let c = classify("function f() { return { color: 'red' }; }");
        assert_ne!(c.code_type, CodeType::CssOnly);
    }

    #[test]
    fn test_js_imports_are_not_python() {
        assert_eq!(
            classify("import React from 'react'").code_type,
            CodeType::ReactJsx
        );
        assert_eq!(
            classify("import './side-effect.js'").code_type,
            CodeType::EsModule
        );
    }

    #[test]
    fn test_js_variants() {
        assert_eq!(
            classify("import { x } from './mod.js';\nx();").code_type,
            CodeType::EsModule
        );
        assert_eq!(
            classify("const data = await fetch(url);").code_type,
            CodeType::EsModule
        );
        assert_eq!(
            classify("async function go() { return 1; }\ngo();").code_type,
            CodeType::AsyncJs
        );
        assert_eq!(
            classify("document.getElementById('x').innerHTML = 'y';").code_type,
            CodeType::DomJs
        );
        assert_eq!(classify("const x = 1;").code_type, CodeType::Javascript);
    }

    #[test]
    fn test_react_hints() {
        let c = classify("import React from 'react';\nconst App = () => <Widget />;");
        assert_eq!(c.code_type, CodeType::ReactJsx);
    }

    #[test]
    fn test_strategy_resolution() {
        assert_eq!(
            classify("import { x } from './m.js';").strategy,
            ExecutionStrategy::Module
        );
        assert_eq!(
            classify("await fetch('u');").strategy,
            ExecutionStrategy::Module
        );
        assert_eq!(
            classify("async function f() {}\nf();").strategy,
            ExecutionStrategy::Async
        );
        assert_eq!(classify("console.log(1)").strategy, ExecutionStrategy::Sync);
    }

    #[test]
    fn test_determinism_and_default() {
        let text = "some entirely unremarkable text";
        let first = classify(text);
        assert_eq!(first.code_type, CodeType::Javascript);
        assert_eq!(first.strategy, ExecutionStrategy::Sync);
        for _ in 0..3 {
            assert_eq!(classify(text), first);
        }
    }

    #[test]
    fn test_always_fresh_types() {
        assert!(CodeType::HtmlDocument.always_fresh());
        assert!(CodeType::HtmlFragment.always_fresh());
        assert!(CodeType::CssOnly.always_fresh());
        assert!(!CodeType::Javascript.always_fresh());
        assert!(!CodeType::Python.always_fresh());
    }

    #[test]
    fn test_language_tags() {
        assert_eq!(CodeType::Python.language_tag(), "python");
        assert_eq!(CodeType::HtmlFragment.language_tag(), "html");
        assert_eq!(CodeType::CssOnly.language_tag(), "css");
        assert_eq!(CodeType::AsyncJs.language_tag(), "javascript");
    }
}
