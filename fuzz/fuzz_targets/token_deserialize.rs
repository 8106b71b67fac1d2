//! Fuzz target for antiforgery token decoding.
//!
//! Feeds arbitrary strings to the token deserializer, both raw and wrapped in
//! a valid integrity tag, so the binary framing is exercised past the HMAC.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rampart_antiforgery::{HmacProtector, Protector, TokenSerializer};
use std::sync::Arc;

const KEY: [u8; 32] = [7u8; 32];

#[derive(Debug, Arbitrary)]
struct FuzzToken {
    /// Raw serialized token text
    text: String,
    /// Payload to sign before decoding
    payload: Vec<u8>,
}

fuzz_target!(|data: FuzzToken| {
    let Ok(protector) = HmacProtector::new(KEY.to_vec()) else {
        return;
    };
    let protector = Arc::new(protector);
    let serializer = TokenSerializer::new(protector.clone());

    // Arbitrary text must never panic
    let _ = serializer.deserialize(&data.text);

    // Signed payloads reach the framing decoder
    if let Ok(protected) = protector.protect(&data.payload) {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(protected);
        if let Ok(token) = serializer.deserialize(&encoded) {
            let reencoded = serializer.serialize(&token).ok();
            assert!(reencoded.is_some());
        }
    }
});
