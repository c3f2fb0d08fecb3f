#![no_main]
use bashfs::{decode, encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Encoded text must never contain a path separator and must decode back
    let encoded = encode(data);
    assert!(!encoded.contains(&b'/'));
    assert_eq!(decode(&encoded).ok().as_deref(), Some(data));

    // Arbitrary raw segments either decode or report a trailing marker
    let _ = decode(data);
});
