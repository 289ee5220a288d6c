//! Feed a stream of decoded frames into one engine, interleaved with its
//! own cycle operations, and check that the clock never moves backwards
//! and the engine never enters out of turn.

#![no_main]

use lamport_core::engine::{Engine, NodeState};
use lamport_proto::{Frame, FrameHeader, NodeId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut engine) = Engine::new(NodeId::new(1), [2, 3, 4].map(NodeId::new)) else {
        return;
    };

    for chunk in data.chunks(FrameHeader::SIZE + 1) {
        let Some((op, bytes)) = chunk.split_first() else {
            continue;
        };
        let before = engine.clock();

        match op % 4 {
            0 => {
                let _ = engine.request();
            },
            1 => {
                let _ = engine.release();
            },
            2 => {
                if let Ok(true) = engine.try_enter() {
                    assert!(engine.replies().is_complete());
                    assert_eq!(engine.ledger().peek_min().copied(), engine.own_request());
                }
            },
            _ => {
                if let Ok(message) = Frame::decode(bytes).and_then(Frame::into_message) {
                    let _ = engine.handle_message(&message);
                }
            },
        }

        assert!(engine.clock() >= before);
        if engine.state() != NodeState::Idle {
            assert!(engine.own_request().is_some());
        }
    }
});
