// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Conformance tests for the JSON bridge: rendering against `serde_json`
//! data through the default builtin registry.

use gotmpl_core::{default_functions, render_json, to_engine_value, Template};
use serde_json::json;

struct Case {
    name: &'static str,
    template: &'static str,
    data: fn() -> serde_json::Value,
    expected: &'static str,
}

const CASES: &[Case] = &[
    Case {
        name: "field access",
        template: "{{.name}} is {{.age}}",
        data: || json!({"name": "Gopher", "age": 5}),
        expected: "Gopher is 5",
    },
    Case {
        name: "range over json array",
        template: "{{range .items}}{{.}},{{end}}",
        data: || json!({"items": ["a", "b", "c"]}),
        expected: "a,b,c,",
    },
    Case {
        name: "eq builtin over json numbers",
        template: "{{if eq .n 3}}three{{else}}other{{end}}",
        data: || json!({"n": 3}),
        expected: "three",
    },
    Case {
        name: "len builtin over json array",
        template: "{{len .items}}",
        data: || json!({"items": [1, 2, 3]}),
        expected: "3",
    },
    Case {
        name: "with over nested json object",
        template: "{{with .user}}{{.name}}{{end}}",
        data: || json!({"user": {"name": "Ada"}}),
        expected: "Ada",
    },
];

#[test]
fn test_cases_render_against_json_data() {
    for case in CASES {
        let rendered = render_json(case.name, case.template, &(case.data)())
            .unwrap_or_else(|err| panic!("{}: {}", case.name, err));
        assert_eq!(rendered, case.expected, "case: {}", case.name);
    }
}

#[test]
fn render_json_reports_undefined_function_errors() {
    let err = render_json("bad", "{{missing .}}", &json!(null)).unwrap_err();
    assert!(err.to_string().contains("non-function expression"));
}

#[test]
fn default_functions_registry_can_be_used_directly_with_template() {
    let registry = default_functions();
    let template = Template::parse_with_functions("direct", "{{not .flag}}", registry).unwrap();
    let rendered = template.render(to_engine_value(&json!({"flag": false}))).unwrap();
    assert_eq!(rendered, "true");
}
