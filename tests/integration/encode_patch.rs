use fjson_gen::format::Formatter;
use fjson_gen::patch::{apply_patch, rewrite_source, CallPattern, RewriteRule};
use fjson_gen::validate::validate;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

const REWRITTEN: &str = r#"e.WriteString(fmt.Sprintf("\"%s\"", (err).Error()))"#;

fn encode_go(body: &str) -> String {
    format!(
        r#"package json

import (
	"bytes"
	"reflect"
)

type encodeState struct {{
	bytes.Buffer
}}

func (e *encodeState) error(err error) {{ panic(err) }}

{body}
"#
    )
}

fn write_fixture(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("encode.go");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn error_call_becomes_quoted_write() {
    let source = encode_go(
        "func (e *encodeState) marshal(v interface{}) (err error) {\n\te.error(err)\n\treturn nil\n}",
    );
    let (_dir, path) = write_fixture(&source);

    let report = apply_patch(
        &path,
        &CallPattern::default(),
        &RewriteRule::default(),
        &Formatter::disabled(),
    )
    .unwrap();

    assert_eq!(report.rewritten, 1);
    let out = fs::read_to_string(&path).unwrap();
    assert!(out.contains(REWRITTEN), "{out}");
    assert!(out.contains("\"fmt\""));
    assert!(out.contains("func (e *encodeState) error(err error) { panic(err) }"));
    validate(&out).unwrap();
}

#[test]
fn every_resolved_call_is_rewritten() {
    let source = encode_go(
        r#"func (e *encodeState) marshal(v interface{}) (err error) {
	if v == nil {
		e.error(&UnsupportedValueError{})
	}
	for i := 0; i < 2; i++ {
		e.error(err)
	}
	return nil
}

func stringEncoder(e *encodeState, v reflect.Value) {
	f := func() {
		e.error(&UnsupportedTypeError{v.Type()})
	}
	f()
}

func (me *encodeState) other(err error) {
	switch {
	case err != nil:
		me.error(err)
	}
}"#,
    );

    let out = rewrite_source(&source, &CallPattern::default(), &RewriteRule::default()).unwrap();

    assert_eq!(out.plan.matches.sites.len(), 4);
    assert_eq!(out.text.matches(".WriteString(fmt.Sprintf(").count(), 4);
    assert!(!out.text.contains("e.error("));
    assert!(out.text.contains("(&UnsupportedTypeError{v.Type()}).Error()"));
    validate(&out.text).unwrap();
}

#[test]
fn receivers_of_other_types_are_not_rewritten() {
    let source = encode_go(
        r#"type decodeState struct{}

func (d *decodeState) error(err error) { panic(err) }

func (d *decodeState) value() {
	d.error(nil)
}

func (e encodeState) byValue(err error) {
	e.error(err)
}

func (e *encodeState) shadowed(err error) {
	e := &decodeState{}
	e.error(err)
}

func unresolved(err error) {
	x.error(err)
}"#,
    );

    let out = rewrite_source(&source, &CallPattern::default(), &RewriteRule::default()).unwrap();

    assert!(out.plan.matches.sites.is_empty());
    assert_eq!(out.plan.matches.skipped.len(), 4);
    assert_eq!(out.text, source);
}

#[test]
fn patching_twice_changes_nothing_the_second_time() {
    let source = encode_go("func (e *encodeState) f(err error) {\n\te.error(err)\n}");
    let (_dir, path) = write_fixture(&source);
    let pattern = CallPattern::default();
    let rule = RewriteRule::default();

    let first = apply_patch(&path, &pattern, &rule, &Formatter::disabled()).unwrap();
    let after_first = fs::read_to_string(&path).unwrap();
    let second = apply_patch(&path, &pattern, &rule, &Formatter::disabled()).unwrap();

    assert!(first.changed);
    assert_eq!(second.rewritten, 0);
    assert!(!second.changed);
    assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
}

#[test]
fn broken_file_is_left_untouched() {
    let source = "package json\n\nfunc (e *encodeState) f(err error) {\n\te.error(err\n}\n";
    let (_dir, path) = write_fixture(source);

    let err = apply_patch(
        &path,
        &CallPattern::default(),
        &RewriteRule::default(),
        &Formatter::disabled(),
    )
    .unwrap_err();

    assert!(err.is_parse_error());
    assert_eq!(fs::read_to_string(&path).unwrap(), source);
}

#[test]
fn gofmt_is_optional() {
    let source = encode_go("func (e *encodeState) f(err error) {\n\te.error(err)\n}");
    let (_dir, path) = write_fixture(&source);

    // Formats when gofmt is installed and keeps the edited text when it is not.
    let report = apply_patch(
        &path,
        &CallPattern::default(),
        &RewriteRule::default(),
        &Formatter::gofmt(),
    )
    .unwrap();

    assert_eq!(report.rewritten, 1);
    let out = fs::read_to_string(&path).unwrap();
    assert!(out.contains(REWRITTEN));
    validate(&out).unwrap();
}

const GO_KEYWORDS: [&str; 25] = [
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

proptest! {
    #[test]
    fn other_method_names_plan_no_edits(name in "[a-z][a-zA-Z0-9]{0,8}") {
        prop_assume!(name != "error" && !GO_KEYWORDS.contains(&name.as_str()));

        let source = format!(
            "package json\n\nfunc (e *encodeState) f(err error) {{\n\te.{name}(err)\n}}\n"
        );
        let out = rewrite_source(&source, &CallPattern::default(), &RewriteRule::default()).unwrap();

        prop_assert!(out.plan.edits.is_empty());
        prop_assert_eq!(out.text, source);
    }
}
