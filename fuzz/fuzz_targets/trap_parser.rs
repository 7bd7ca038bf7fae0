#![no_main]

use libfuzzer_sys::fuzz_target;
use trapflow_pipeline::TrapParser;

fuzz_target!(|data: &[u8]| {
    // 논리 라인은 UTF-8 텍스트로만 도착한다
    if let Ok(line) = std::str::from_utf8(data) {
        // 어떤 입력이든 패닉 없이 Ok 또는 Err만 돌아와야 한다
        let _ = TrapParser::new(false).parse(line);
        let _ = TrapParser::new(true).parse(line);
    }
});
