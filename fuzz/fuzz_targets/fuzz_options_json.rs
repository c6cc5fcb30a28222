#![no_main]

use libfuzzer_sys::fuzz_target;
use tmpl_controller::ControllerOptions;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(options) = ControllerOptions::from_json_str(text) {
        let _ = options.change_detection.equality();
    }
});
