#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use authwatch_core::pipeline::LoginParser;
use authwatch_log_pipeline::parser::AuthLogParser;

fuzz_target!(|data: &[u8]| {
    let parser = AuthLogParser::new();
    let _ = parser.parse(data, Utc::now());
});
