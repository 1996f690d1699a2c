//! Two-peer round trips over an ideal transport.
//!
//! Synthetic frames stand in for the codec: deterministic residue and post
//! vectors per frame index, loud enough to carry data. The sender embeds a
//! payload stream; the receiver gets the sender's modified vectors and must
//! reproduce the payload byte for byte.

use std::io::Cursor;

use subtone_core::{
    EmbedOutcome, ExtractOutcome, FloorLayout, HideMethod, ReceiverSession, SenderSession,
    SessionConfig, StegoError, SyncMethod,
};

const RES_LEN: usize = 512;
const WINDOW: usize = 2 * RES_LEN;
const POST_LIST: [i32; 6] = [0, 511, 96, 192, 320, 448];
const POST_INDEX: [i32; 6] = [0, 2, 3, 4, 5, 1];

fn layout() -> FloorLayout<'static> {
    FloorLayout {
        rate: 44_100,
        window: WINDOW,
        mult: 1,
        post_list: &POST_LIST,
        post_index: &POST_INDEX,
    }
}

/// Deterministic per-frame residue, magnitudes 300..899 so every line
/// carries several bits.
fn gen_residue(frame: usize) -> Vec<i32> {
    let mut x = (frame as u32).wrapping_mul(2_654_435_761).wrapping_add(97);
    (0..RES_LEN)
        .map(|_| {
            x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let magnitude = (300 + (x >> 16) % 600) as i32;
            if (x >> 8) & 1 == 0 { magnitude } else { -magnitude }
        })
        .collect()
}

/// Deterministic per-frame posts in the 60..=187 range.
fn gen_posts(frame: usize) -> Vec<i32> {
    let mut x = (frame as u32).wrapping_mul(40_503).wrapping_add(7);
    (0..POST_LIST.len())
        .map(|_| {
            x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (60 + (x >> 20) % 128) as i32
        })
        .collect()
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 13) as u8).collect()
}

fn config(sync_method: SyncMethod, hide_method: HideMethod) -> SessionConfig {
    SessionConfig {
        key: (0u8..16).collect(),
        emission: 7,
        packet: 1,
        sync_method,
        hide_method,
        ..SessionConfig::default()
    }
}

/// Drive both peers frame by frame until the receiver sees the terminal
/// packet. Returns the recovered payload and the number of frames used.
fn transfer(config: &SessionConfig, data: &[u8], floor: &[i32]) -> (Vec<u8>, usize) {
    let layout = layout();
    let mut sender = SenderSession::new(config, Cursor::new(data.to_vec())).expect("sender opens");
    let mut receiver = ReceiverSession::new(config, Vec::new()).expect("receiver opens");

    let mut frame = 0usize;
    let mut end_reports = 0usize;
    while !receiver.finished() {
        assert!(frame < 4000, "transfer did not converge after {frame} frames");

        let mut residue = gen_residue(frame);
        let mut posts = gen_posts(frame);

        match sender.embed_frame(&layout, &mut posts, floor, &mut residue) {
            Ok(_) => {},
            // A skipped frame reaches the receiver unmodified.
            Err(StegoError::FrameSkip) => {},
            Err(err) => unreachable!("sender failed: {err}"),
        }

        let outcome = receiver
            .extract_frame(&layout, &posts, floor, &residue)
            .expect("receiver processes frame");
        if outcome == ExtractOutcome::EndOfStream {
            end_reports += 1;
        }
        frame += 1;
    }

    assert_eq!(end_reports, 1, "end of stream must be reported exactly once");
    (receiver.into_sink(), frame)
}

#[test]
fn res_header_identity_round_trip() {
    let data = payload(3000);
    let floor = vec![0i32; RES_LEN];
    let (recovered, frames) = transfer(
        &config(SyncMethod::ResHeader, HideMethod::Identity),
        &data,
        &floor,
    );
    assert_eq!(recovered, data);
    assert!(frames > 10, "3000 bytes cannot fit a handful of frames");
}

#[test]
fn res_header_parity_round_trip() {
    let data = payload(801);
    // Parity draws mask bits from the floor vector; both peers see the
    // same one, here a fixed pseudo-random pattern.
    let floor: Vec<i32> = (0..RES_LEN as i32).map(|i| i.wrapping_mul(-2_048_144_777)).collect();
    let (recovered, _) = transfer(
        &config(SyncMethod::ResHeader, HideMethod::Parity),
        &data,
        &floor,
    );
    assert_eq!(recovered, data);
}

#[test]
fn iss_identity_round_trip() {
    let data = payload(1200);
    let floor = vec![0i32; RES_LEN];
    let (recovered, _) = transfer(&config(SyncMethod::Iss, HideMethod::Identity), &data, &floor);
    assert_eq!(recovered, data);
}

#[test]
fn iss_parity_round_trip() {
    let data = payload(400);
    let floor: Vec<i32> = (0..RES_LEN as i32).map(|i| (i * 31) ^ 0x5A5A).collect();
    let (recovered, _) = transfer(&config(SyncMethod::Iss, HideMethod::Parity), &data, &floor);
    assert_eq!(recovered, data);
}

#[test]
fn delayed_sender_skips_the_first_frames() {
    let layout = layout();
    let data = payload(64);
    let floor = vec![0i32; RES_LEN];
    let mut config = config(SyncMethod::ResHeader, HideMethod::Identity);
    config.delay_frames = 5;

    let mut sender = SenderSession::new(&config, Cursor::new(data)).expect("sender opens");
    for frame in 0..5 {
        let mut residue = gen_residue(frame);
        let mut posts = gen_posts(frame);
        let outcome = sender.embed_frame(&layout, &mut posts, &floor, &mut residue).unwrap();
        assert_eq!(outcome, EmbedOutcome::Delayed);
        assert_eq!(residue, gen_residue(frame), "delayed frames stay untouched");
    }

    let mut residue = gen_residue(5);
    let mut posts = gen_posts(5);
    let outcome = sender.embed_frame(&layout, &mut posts, &floor, &mut residue).unwrap();
    assert!(matches!(outcome, EmbedOutcome::Embedded { bits } if bits > 0));
}

#[test]
fn drained_sender_desynchronizes_followup_frames() {
    let layout = layout();
    let data = payload(40);
    let floor = vec![0i32; RES_LEN];
    let config = config(SyncMethod::ResHeader, HideMethod::Identity);

    let mut sender = SenderSession::new(&config, Cursor::new(data)).expect("sender opens");
    let mut receiver = ReceiverSession::new(&config, Vec::new()).expect("receiver opens");

    let mut frame = 0usize;
    while !sender.drained() {
        assert!(frame < 100);
        let mut residue = gen_residue(frame);
        let mut posts = gen_posts(frame);
        sender.embed_frame(&layout, &mut posts, &floor, &mut residue).unwrap();
        receiver.extract_frame(&layout, &posts, &floor, &residue).unwrap();
        frame += 1;
    }

    // The stream is over: further frames must read as empty.
    for extra in 0..8 {
        let mut residue = gen_residue(1000 + extra);
        let mut posts = gen_posts(1000 + extra);
        let outcome = sender.embed_frame(&layout, &mut posts, &floor, &mut residue).unwrap();
        assert_eq!(outcome, EmbedOutcome::Desynchronized);

        let read = receiver.extract_frame(&layout, &posts, &floor, &residue).unwrap();
        assert_eq!(read, ExtractOutcome::Empty);
    }
}

#[test]
fn large_payload_uses_capacity_proportionally() {
    let data = payload(6000);
    let floor = vec![0i32; RES_LEN];
    let (recovered, frames) = transfer(
        &config(SyncMethod::ResHeader, HideMethod::Identity),
        &data,
        &floor,
    );
    assert_eq!(recovered, data);

    // ~239 payload bits per frame at the default aggressiveness: the whole
    // stream (payload + packet framing) needs at least wire_bits / 255
    // frames and should not take wildly more.
    let wire_bytes = 6000 + (6000_usize.div_ceil(320)) * 59;
    assert!(frames >= wire_bytes * 8 / 255);
    assert!(frames <= wire_bytes);
}
