#![no_main]
use libfuzzer_sys::fuzz_target;
use psegli::cookies::CookieBundle;
use psegli::ingest::value::{ReadingValue, Stamp};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Re-parsing the rendered header must be stable
    let bundle = CookieBundle::parse(text);
    let header = bundle.to_header_string();
    assert_eq!(CookieBundle::parse(&header).to_header_string(), header);

    let _ = ReadingValue::from_text(text);
    let _ = Stamp::from_text(text).to_utc(chrono_tz::America::New_York);
});
