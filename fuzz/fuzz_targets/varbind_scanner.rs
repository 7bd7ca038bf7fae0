#![no_main]

use libfuzzer_sys::fuzz_target;
use trapflow_core::config::ForwardConfig;
use trapflow_pipeline::TrapForwarder;

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = std::str::from_utf8(data) {
        let Ok(forwarder) = TrapForwarder::new(ForwardConfig::default()) else {
            return;
        };
        // varbind 스캔은 외부 데몬이 쓴 페이로드를 그대로 받는다
        let _ = forwarder.parse_varbinds(payload);
    }
});
