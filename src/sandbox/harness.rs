//! Harness generation for isolated execution
//!
//! The worker never runs user code bare: JS and Python runs get a generated
//! prelude that intercepts console-like output, captures uncaught errors and
//! rejections, and reports structured JSONL records on stdout; HTML flavors
//! get a synthesized document with a browser-side capture script injected
//! into `<head>`. User code is embedded as a JSON string literal, so the
//! harness never re-parses or escapes it by hand.

use handlebars::Handlebars;
use serde_json::json;
use std::time::Duration;

use crate::classify::{CodeType, ExecutionStrategy, SUPPORTED_LIBRARIES};
use crate::error::Result;

/// Node prelude: JSONL record emitter, console interception, global error
/// and rejection capture, then one of three invocation strategies behind a
/// single catch boundary.
const JS_HARNESS: &str = r#""use strict";
(async () => {
  const __emit = (record) => process.stdout.write(JSON.stringify(record) + "\n");
  const __pretty = (value) => {
    if (typeof value === "string") return value;
    if (value === null) return "null";
    if (value === undefined) return "undefined";
    if (typeof value === "function") return "[function " + (value.name || "anonymous") + "]";
    try { return JSON.stringify(value); } catch (_) { return String(value); }
  };
  for (const [method, kind] of [["log", "log"], ["warn", "warning"], ["error", "error"], ["info", "info"]]) {
    console[method] = (...args) => {
      __emit({ type: kind, message: args.map(__pretty).join(" ") });
    };
  }
  process.on("uncaughtException", (err) => {
    __emit({ type: "error", message: (err && err.name ? err.name + ": " : "") + String((err && err.message) || err), stack: (err && err.stack) || undefined });
    process.exit(1);
  });
  process.on("unhandledRejection", (reason) => {
    const err = reason instanceof Error ? reason : new Error(String(reason));
    __emit({ type: "error", message: "Unhandled rejection: " + err.message, stack: err.stack });
    process.exit(1);
  });
  const __code = {{{code_json}}};
  try {
{{#if sync}}    new Function(__code)();
{{/if}}{{#if async_wrap}}    const AsyncFunction = Object.getPrototypeOf(async function () {}).constructor;
    await new AsyncFunction(__code)();
{{/if}}{{#if module}}    await import("data:text/javascript;base64," + Buffer.from(__code, "utf8").toString("base64"));
{{/if}}  } catch (err) {
    __emit({ type: "error", message: (err && err.name ? err.name + ": " : "") + String((err && err.message) || err), stack: (err && err.stack) || undefined });
    process.exitCode = 1;
  }
})();
"#;

/// CPython prelude: line-buffered stdout/stderr sinks, the `input()` shim
/// that delegates to the host over the channel, allowlisted library loads,
/// then an exec of the user code under one except boundary.
const PYTHON_HARNESS: &str = r#"import builtins, json, sys, traceback

__real_stdout = sys.stdout
__real_stdin = sys.stdin


def __emit(kind, message, stack=None):
    record = {"type": kind, "message": message}
    if stack:
        record["stack"] = stack
    __real_stdout.write(json.dumps(record) + "\n")
    __real_stdout.flush()


class __LineSink:
    def __init__(self, kind):
        self.kind = kind
        self.pending = ""

    def write(self, text):
        self.pending += text
        while "\n" in self.pending:
            line, self.pending = self.pending.split("\n", 1)
            if line.strip():
                __emit(self.kind, line)
        return len(text)

    def flush(self):
        if self.pending.strip():
            __emit(self.kind, self.pending)
        self.pending = ""


def __input(prompt=""):
    __emit("input_request", str(prompt))
    line = __real_stdin.readline()
    return line.rstrip("\n") if line else ""


sys.stdout = __LineSink("log")
sys.stderr = __LineSink("error")
builtins.input = __input

{{#each modules}}
try:
    import {{this}}
    __emit("info", "Loaded {{this}}")
except Exception as exc:
    __emit("error", "Failed to load {{this}}: %s" % exc)
    sys.exit(1)
{{/each}}
__code = {{{code_json}}}
try:
    exec(compile(__code, "<sandbox>", "exec"), {"__name__": "__main__"})
    sys.stdout.flush()
    sys.stderr.flush()
except SystemExit:
    raise
except BaseException as exc:
    sys.stdout.flush()
    sys.stderr.flush()
    __emit("error", "%s: %s" % (type(exc).__name__, exc), traceback.format_exc())
    sys.exit(1)
"#;

/// Browser-side capture script for synthesized documents. Unlike the child
/// process preludes this one still forwards to the real console, since a
/// browser has devtools worth keeping useful. Records are buffered and
/// flushed to the embedding page at a fixed interval, with a final flush
/// and a single completion signal on load.
const CAPTURE_SCRIPT: &str = r#"(function () {
  var buffer = [];
  var flush = function () {
    if (!buffer.length) { return; }
    parent.postMessage(JSON.stringify(buffer.splice(0, buffer.length)), "*");
  };
  var emit = function (kind, message, stack) {
    buffer.push({ type: kind, message: message, stack: stack });
  };
  var pretty = function (value) {
    if (typeof value === "string") { return value; }
    if (value === null) { return "null"; }
    if (value === undefined) { return "undefined"; }
    if (typeof value === "function") { return "[function " + (value.name || "anonymous") + "]"; }
    try { return JSON.stringify(value); } catch (_) { return String(value); }
  };
  [["log", "log"], ["warn", "warning"], ["error", "error"], ["info", "info"]].forEach(function (pair) {
    var original = console[pair[0]].bind(console);
    console[pair[0]] = function () {
      var args = Array.prototype.slice.call(arguments);
      emit(pair[1], args.map(pretty).join(" "));
      original.apply(console, args);
    };
  });
  window.addEventListener("error", function (event) {
    emit("error", event.message, event.error && event.error.stack);
  });
  window.addEventListener("unhandledrejection", function (event) {
    var reason = event.reason || "unhandled rejection";
    emit("error", "Unhandled rejection: " + (reason.message || String(reason)), reason.stack);
  });
  setInterval(flush, {{flush_ms}});
  window.addEventListener("load", function () {
    flush();
    parent.postMessage(JSON.stringify({ type: "execution_complete", success: true }), "*");
  });
})();
"#;

const FRAGMENT_DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<script>{{{capture}}}</script>
</head>
<body>
{{{body}}}
</body>
</html>
"#;

const CSS_DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<script>{{{capture}}}</script>
<style>
{{{styles}}}
</style>
</head>
<body>
<div id="preview">
  <h1>Style preview</h1>
  <p>The pasted stylesheet is applied to this document.</p>
</div>
</body>
</html>
"#;

/// Builds harness programs and synthesized documents
pub struct HarnessBuilder {
    registry: Handlebars<'static>,
    flush_ms: u64,
}

impl HarnessBuilder {
    /// Create a builder; `flush_interval` controls the in-document capture
    /// script's batching cadence.
    pub fn new(flush_interval: Duration) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_template_string("js", JS_HARNESS)?;
        registry.register_template_string("python", PYTHON_HARNESS)?;
        registry.register_template_string("capture", CAPTURE_SCRIPT)?;
        registry.register_template_string("fragment", FRAGMENT_DOCUMENT)?;
        registry.register_template_string("css", CSS_DOCUMENT)?;

        Ok(HarnessBuilder {
            registry,
            flush_ms: flush_interval.as_millis().max(1) as u64,
        })
    }

    /// Wrap JS code for the requested invocation strategy
    pub fn js(&self, code: &str, strategy: ExecutionStrategy) -> Result<String> {
        let rendered = self.registry.render(
            "js",
            &json!({
                "code_json": serde_json::to_string(code)?,
                "sync": matches!(strategy, ExecutionStrategy::Sync | ExecutionStrategy::Python),
                "async_wrap": strategy == ExecutionStrategy::Async,
                "module": strategy == ExecutionStrategy::Module,
            }),
        )?;
        Ok(rendered)
    }

    /// Wrap Python code, loading the requested allowlisted libraries first
    pub fn python(&self, code: &str, libraries: &[String]) -> Result<String> {
        let modules: Vec<&str> = libraries
            .iter()
            .map(|name| {
                SUPPORTED_LIBRARIES
                    .iter()
                    .find(|(display, _)| display == name)
                    .map(|(_, module)| *module)
                    .unwrap_or(name.as_str())
            })
            .collect();

        let rendered = self.registry.render(
            "python",
            &json!({
                "code_json": serde_json::to_string(code)?,
                "modules": modules,
            }),
        )?;
        Ok(rendered)
    }

    /// Synthesize the isolated document for an HTML flavor. Documents get
    /// the capture script injected into `<head>`; fragments and stylesheets
    /// get a generated scaffold around them.
    pub fn document(&self, code: &str, code_type: CodeType) -> Result<String> {
        let capture = self
            .registry
            .render("capture", &json!({ "flush_ms": self.flush_ms }))?;

        match code_type {
            CodeType::HtmlDocument => Ok(inject_into_head(code, &capture)),
            CodeType::CssOnly => {
                let rendered = self.registry.render(
                    "css",
                    &json!({ "capture": capture, "styles": code }),
                )?;
                Ok(rendered)
            }
            _ => {
                let rendered = self.registry.render(
                    "fragment",
                    &json!({ "capture": capture, "body": code }),
                )?;
                Ok(rendered)
            }
        }
    }
}

/// Insert the capture script right after the document's `<head>` opening
/// tag, creating one when the document has none.
fn inject_into_head(document: &str, capture: &str) -> String {
    let script = format!("<script>{}</script>", capture);
    let lower = document.to_lowercase();

    if let Some(head_start) = lower.find("<head") {
        if let Some(close_offset) = lower[head_start..].find('>') {
            let insert_at = head_start + close_offset + 1;
            let mut out = String::with_capacity(document.len() + script.len());
            out.push_str(&document[..insert_at]);
            out.push_str(&script);
            out.push_str(&document[insert_at..]);
            return out;
        }
    }

    if let Some(html_start) = lower.find("<html") {
        if let Some(close_offset) = lower[html_start..].find('>') {
            let insert_at = html_start + close_offset + 1;
            let mut out = String::with_capacity(document.len() + script.len() + 13);
            out.push_str(&document[..insert_at]);
            out.push_str("<head>");
            out.push_str(&script);
            out.push_str("</head>");
            out.push_str(&document[insert_at..]);
            return out;
        }
    }

    format!("{}{}", script, document)
}
