//! Full pipeline: scripted bytes through engine, framer, state machine,
//! decoder and store, observed through the engine handle.
mod common;

use std::time::Duration;

use common::{frame_bytes, status_frame_with_voltage, MockTransport};
use microlink::protocol::decode::ParamValue;
use microlink::protocol::engine::ProtocolEngine;
use microlink::protocol::link::{LinkState, LinkTimeouts};

fn test_timeouts() -> LinkTimeouts {
    LinkTimeouts {
        probe_interval: Duration::from_millis(20),
        init_threshold: Duration::from_secs(60),
        reset_cooldown: Duration::from_millis(50),
        sweep_stall: Duration::from_secs(60),
        // Generous so the link cannot regress while the test polls.
        liveness: Duration::from_secs(60),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sweep_then_status_stream_reaches_mode1_with_decoded_voltage() {
    // One identifier sweep of three known ids (ending at the terminal id),
    // then five repeated status frames carrying 120.0 V output.
    let mut stream = Vec::new();
    stream.extend(frame_bytes(0x00, &[0; 16]));
    stream.extend(frame_bytes(0x40, &[0; 16]));
    stream.extend(frame_bytes(0x7F, &[0; 16]));
    for _ in 0..5 {
        stream.extend(status_frame_with_voltage(120.0));
    }

    // Deliver with awkward chunk boundaries to exercise the framer.
    let chunks: Vec<Vec<u8>> = stream.chunks(13).map(|c| c.to_vec()).collect();
    let transport = MockTransport::new(chunks);
    let written = transport.written_handle();

    let (engine, handle) =
        ProtocolEngine::new(transport, test_timeouts(), Duration::from_millis(5));
    let engine_task = tokio::spawn(engine.run());

    let mut streaming = false;
    for _ in 0..400 {
        if handle.link_state() == LinkState::Mode1 && handle.parameter("voltage_out").is_some() {
            streaming = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(streaming, "engine never reached MODE1 with decoded voltage");

    let entry = handle.parameter("voltage_out").expect("voltage decoded");
    assert_eq!(
        entry.value,
        ParamValue::Number {
            value: 120.0,
            unit: "V"
        }
    );

    // The sweep header frame also decoded.
    assert!(handle.parameter("protocol_version").is_some());
    // Never-seen parameters stay explicitly unknown.
    assert!(handle.parameter("battery_voltage").is_none());

    // The engine acknowledged frames on the wire.
    {
        let tx = written.lock().unwrap();
        assert!(tx.contains(&0xFE), "no acknowledgements were sent");
    }

    handle.shutdown();
    let result = engine_task.await.expect("engine task panicked");
    assert!(result.is_ok(), "engine exited with error: {:?}", result);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_device_gets_probed() {
    let transport = MockTransport::new(Vec::new());
    let written = transport.written_handle();
    let (engine, handle) =
        ProtocolEngine::new(transport, test_timeouts(), Duration::from_millis(5));
    let engine_task = tokio::spawn(engine.run());

    let mut probed = false;
    for _ in 0..200 {
        {
            let tx = written.lock().unwrap();
            if tx.windows(2).any(|w| w == [0xF7, 0xFD]) {
                probed = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(probed, "no handshake probe was sent");
    assert_eq!(handle.link_state(), LinkState::Init);

    handle.shutdown();
    engine_task.await.expect("join").expect("engine result");
}
