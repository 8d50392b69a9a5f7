#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Exercise the raw-byte deserialization path for the pub/sub payload
    // (includes serde_json's own UTF-8 validation and error handling).
    let _ = serde_json::from_slice::<lobby_core::ChatMessage>(data);

    // Also exercise the str-based path the chat pump uses for valid UTF-8.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<lobby_core::ChatMessage>(s);
        let _ = serde_json::from_str::<lobby_core::JoinResponse>(s);
    }
});
