//! Library-level runs: compiler plus bundle, with stub and embedded libraries.

#![cfg(feature = "javascript")]

use std::path::Path;

use jst::bundle::{template_name, Bundle};
use jst::compiler::LANGUAGE;
use jst::{HostError, InterpreterSession, TemplateCompiler, TemplateSettings, Value};

const UPPER_LIBRARY: &str = "var compile = function(t) { return t.toUpperCase(); };\n\
                             var setTemplateSettings = function(settings) {};\n";

#[test]
fn stub_library_bundle_matches_expected_text() {
    let compiler = TemplateCompiler::with_library(LANGUAGE, &[UPPER_LIBRARY]).unwrap();
    compiler.configure(&TemplateSettings::default()).unwrap();

    let mut bundle = Bundle::new("JST").unwrap();
    for file in ["a.tpl", "b.tpl"] {
        let name = template_name(Path::new(file)).unwrap();
        bundle.push(&name, &compiler.compile("\"Hello\"").unwrap());
    }
    let out = bundle.finish();

    assert_eq!(
        out,
        "(function(global) {\n\
         global.JST = global.JST || {};\n\
         global.JST[\"a\"] = \"HELLO\";\n\
         global.JST[\"b\"] = \"HELLO\";\n\
         \n})(this);"
    );
    assert_eq!(out.matches("(function(global) {").count(), 1);
    assert_eq!(out.matches("})(this);").count(), 1);
}

#[test]
fn generated_bundle_renders_in_engine() {
    let compiler = TemplateCompiler::new().unwrap();
    let mut bundle = Bundle::new("App.JST").unwrap();
    bundle.push("greet", &compiler.compile("Hello <%= name %> & <%- tag %>").unwrap());
    let out = bundle.finish();

    // Load the embedded library (for `_.escape`) and the bundle into a fresh
    // engine, then render the template.
    let mut session = InterpreterSession::start("jscript").unwrap();
    let handle = session
        .parse_module(&format!(
            "{}\n{out}\nfunction render(data) {{ return App.JST['greet'](data); }}",
            jst::embedded::library_source()
        ))
        .unwrap();
    let data = Value::object([("name", Value::from("World")), ("tag", Value::from("<b>"))]);
    let html = handle.invoke("render", &[data]).unwrap();
    assert_eq!(html, Value::from("Hello World & &lt;b&gt;"));
}

#[test]
fn custom_delimiters_render() {
    let compiler = TemplateCompiler::new().unwrap();
    compiler
        .configure(&TemplateSettings {
            interpolate: Some(r"\{\{(.+?)\}\}".into()),
            evaluate: Some(r"\{%(.+?)%\}".into()),
            escape: None,
        })
        .unwrap();
    let src = compiler.compile("{% for (var i = 0; i < n; i++) { %}{{ i }}{% } %}").unwrap();

    let mut session = InterpreterSession::start("jscript").unwrap();
    let handle = session
        .parse_module(&format!("var tpl = {src};\nfunction run(d) {{ return tpl(d); }}"))
        .unwrap();
    let out = handle.invoke("run", &[Value::object([("n", Value::from(3))])]).unwrap();
    assert_eq!(out, Value::from("012"));
}

#[test]
fn script_fault_carries_position_and_text() {
    let mut session = InterpreterSession::start("jscript").unwrap();
    let err = session
        .parse_module("function ok() { return 1; }\nfunction broken() { return 1 +; }")
        .unwrap_err();
    let fault = match err {
        HostError::ScriptFault(f) => f,
        other => panic!("unexpected: {other:?}"),
    };
    assert_eq!(fault.line, 2);
    assert!(fault.column >= 1);
    assert!(fault.message.starts_with("Script exception: "));
    assert!(fault.message.contains("at line 2, column"));
}

#[test]
fn compiler_closed_twice_then_disposed() {
    let mut compiler = TemplateCompiler::new().unwrap();
    compiler.close();
    compiler.close();
    assert!(matches!(compiler.compile("x"), Err(HostError::Disposed(_))));
    assert!(matches!(
        compiler.configure(&TemplateSettings::default()),
        Err(HostError::Disposed(_))
    ));
}
