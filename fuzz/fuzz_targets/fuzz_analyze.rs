#![no_main]

use libfuzzer_sys::fuzz_target;
use saft::SaftConfig;
use saft::pipeline;

fuzz_target!(|data: &[u8]| {
    let config = SaftConfig::default();
    if let Ok(analysis) = pipeline::analyze(data, &config) {
        // Re-deriving from the frozen model must reproduce the findings.
        assert_eq!(pipeline::derive_findings(&analysis.file, &config), analysis.findings);
    }
});
