#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use authwatch_core::pipeline::LoginParser;
use authwatch_log_pipeline::parser::AccessLogParser;

fuzz_target!(|data: &[u8]| {
    let parser = AccessLogParser::new();
    let _ = parser.parse(data, Utc::now());
});
