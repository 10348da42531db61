#![no_main]
use libfuzzer_sys::fuzz_target;
use psegli::logging::get_logger;
use psegli::utility::decode_chart_payload;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let _ = decode_chart_payload(&body, &get_logger("fuzz"));
});
