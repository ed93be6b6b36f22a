//! Framer behavior: chunking invariance and resynchronization.
mod common;

use common::frame_bytes;
use microlink::protocol::framer::Framer;
use microlink::protocol::Frame;

fn drain(framer: &mut Framer) -> Vec<Frame> {
    let mut out = Vec::new();
    while let Some(f) = framer.next_frame() {
        out.push(f);
    }
    out
}

fn feed_chunked(bytes: &[u8], chunk_size: usize) -> Vec<Frame> {
    let mut framer = Framer::new();
    let mut frames = Vec::new();
    for chunk in bytes.chunks(chunk_size) {
        framer.push(chunk);
        frames.extend(drain(&mut framer));
    }
    frames
}

#[test]
fn emits_frames_regardless_of_chunk_boundaries() {
    let mut stream = Vec::new();
    stream.extend(frame_bytes(0x6F, &[1; 16]));
    stream.extend(frame_bytes(0x70, &[2; 16]));
    stream.extend(frame_bytes(0x76, &[3; 16]));

    let whole = feed_chunked(&stream, stream.len());
    assert_eq!(whole.len(), 3);
    assert_eq!(whole[0].id, 0x6F);
    assert_eq!(whole[0].payload, vec![1u8; 16]);

    for chunk_size in [1, 2, 3, 5, 7, 18, 19, 20] {
        assert_eq!(
            feed_chunked(&stream, chunk_size),
            whole,
            "chunk size {} changed framing",
            chunk_size
        );
    }
}

#[test]
fn resynchronizes_after_leading_garbage() {
    let mut stream = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00];
    stream.extend(frame_bytes(0x6D, &[9; 16]));

    let mut framer = Framer::new();
    framer.push(&stream);
    let frames = drain(&mut framer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id, 0x6D);
    assert_eq!(framer.take_dropped(), 5);
}

#[test]
fn discards_corrupted_frame_and_recovers() {
    let mut bad = frame_bytes(0x6F, &[1; 16]);
    bad[10] ^= 0xFF; // corrupt mid-payload, trailer no longer matches
    let good = frame_bytes(0x70, &[2; 16]);
    let mut stream = bad;
    stream.extend(&good);

    let mut framer = Framer::new();
    framer.push(&stream);
    let frames = drain(&mut framer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id, 0x70);
    assert!(framer.take_dropped() >= 19);
}

#[test]
fn partial_frame_is_held_until_completed() {
    let msg = frame_bytes(0x72, &[4; 16]);
    let mut framer = Framer::new();
    framer.push(&msg[..18]);
    assert!(framer.next_frame().is_none());
    assert_eq!(framer.pending(), 18);
    framer.push(&msg[18..]);
    let frame = framer.next_frame().expect("completed frame");
    assert_eq!(frame.id, 0x72);
    assert_eq!(framer.pending(), 0);
}
