//! Arbitrary bytes must never panic the frame decoder, and anything it
//! accepts must encode back to the same header bytes.

#![no_main]

use lamport_proto::{Frame, FrameHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        assert_eq!(&frame.to_bytes()[..], &data[..FrameHeader::SIZE]);
        let _ = frame.into_message();
    }
});
