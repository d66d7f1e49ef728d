#![no_main]

use libfuzzer_sys::fuzz_target;
use saft::SaftConfig;
use saft::decode::Decoder;

fuzz_target!(|data: &[u8]| {
    let config = SaftConfig::default();
    // Must stop at the first error and never panic.
    for event in Decoder::new(data, &config) {
        if event.is_err() {
            break;
        }
    }
});
