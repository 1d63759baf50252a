#![no_main]

use libfuzzer_sys::fuzz_target;
use wire_dial::ConnectionInfo;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(info) = ConnectionInfo::parse(s) {
        // A parsed string always names at least one host
        assert!(!info.settings.hosts.is_empty());
        // Never touches the filesystem unless a CA file was named
        if info.settings.tls_ca.is_none() {
            let _ = info.to_options();
        }
    }
});
