#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match brew_core::decode(data) {
        Ok(r) => {
            // Anything accepted must be a full packet with the right header
            // and values inside what the wire format can carry.
            assert!(data.len() >= 20);
            assert_eq!(&data[..2], &[0x03, 0x0B]);
            assert!(r.weight_g.abs() <= 167_772.16);
            assert!(r.flow_gps.abs() <= 655.36);
        }
        Err(e) => assert!(e.is_malformed()),
    }
});
