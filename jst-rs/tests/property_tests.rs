use std::path::Path;

use proptest::prelude::*;
use jst::bundle::{template_name, Bundle};
use jst::config::Config;

proptest! {
    /// The config parser never panics; every reported line exists.
    #[test]
    fn config_parser_does_not_panic(s in "\\PC*") {
        let (_, errors) = Config::load_str(&s);
        let lines = s.lines().count();
        for e in errors {
            prop_assert!(e.line >= 1 && e.line <= lines);
        }
    }
}

proptest! {
    /// One guard per namespace segment, one entry per pushed template.
    #[test]
    fn bundle_shape(
        segments in prop::collection::vec("[A-Za-z_$][A-Za-z0-9_$]{0,8}", 1..5),
        names in prop::collection::vec("[a-z][a-z0-9_-]{0,10}", 0..8),
    ) {
        let ns = segments.join(".");
        let mut bundle = Bundle::new(&ns).unwrap();
        for n in &names {
            bundle.push(n, "null");
        }
        let out = bundle.finish();
        prop_assert_eq!(out.lines().filter(|l| l.contains(" || {};")).count(), segments.len());
        let entry = format!("global.{ns}[\"");
        prop_assert_eq!(out.matches(entry.as_str()).count(), names.len());
        let opens = out.starts_with("(function(global) {\n");
        let closes = out.ends_with("\n})(this);");
        prop_assert!(opens, "bad header: {:?}", out);
        prop_assert!(closes, "bad footer: {:?}", out);
    }
}

proptest! {
    /// Template name is the file name minus its last extension.
    #[test]
    fn template_name_strips_extension(dir in "[a-z]{1,6}", stem in "[a-z][a-z0-9]{0,8}", ext in "[a-z]{1,4}") {
        let path = format!("{dir}/{stem}.{ext}");
        prop_assert_eq!(template_name(Path::new(&path)).unwrap(), stem);
    }
}

#[cfg(feature = "javascript")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Integer arithmetic survives the trip through the engine.
    #[test]
    fn engine_adds_integers(a in -1_000_000i32..1_000_000, b in -1_000_000i32..1_000_000) {
        let v = jst::eval_once("jscript", "a + b", [("a", jst::Value::from(a)), ("b", jst::Value::from(b))]).unwrap();
        prop_assert_eq!(v, jst::Value::Number(f64::from(a) + f64::from(b)));
    }

    /// Plain strings come back unchanged.
    #[test]
    fn engine_returns_strings(s in "[A-Za-z0-9 ]{0,40}") {
        let v = jst::eval_once("jscript", "s", [("s", jst::Value::from(s.as_str()))]).unwrap();
        prop_assert_eq!(v, jst::Value::from(s));
    }
}
