#![no_main]

use deferral_callbacks::RegistryFlags;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(spec) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(flags) = spec.parse::<RegistryFlags>() {
        let rendered = flags.to_string();
        assert_eq!(rendered.parse::<RegistryFlags>().ok(), Some(flags));
    }
});
