#![no_main]

use libfuzzer_sys::fuzz_target;
use gotmpl_core::default_functions;
use gotmpl_engine::{Template, Value};

fuzz_target!(|data: &[u8]| {
    let source = match std::str::from_utf8(data) {
        Ok(src) => src,
        Err(_) => return,
    };

    if let Ok(template) =
        Template::parse_with_functions("fuzz-template-render", source, default_functions())
    {
        let _ = template.render(Value::Absent);
    }
});
