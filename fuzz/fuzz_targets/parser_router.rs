#![no_main]

use chrono::Utc;
use authwatch_log_pipeline::parser::ParserRouter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let router = ParserRouter::with_defaults();
    let _ = router.parse(data, Utc::now());
});
