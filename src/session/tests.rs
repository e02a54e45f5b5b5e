//! Tests for the streaming session state machine.

use std::{io, num::NonZeroUsize, sync::Arc, time::Duration};

use futures::{StreamExt, stream};
use rstest::{fixture, rstest};
use tokio::sync::mpsc;

use super::*;
use crate::{
    protocol::StreamHeader,
    test_support::{RejectingDecoder, StallingDecoder, grey_pipeline, plausible_exr},
};

fn header(total_size: u64) -> io::Result<InboundFrame> {
    Ok(InboundFrame::Header(StreamHeader {
        filename: "atrium.exr".into(),
        total_size,
        chunk_size_hint: 250,
    }))
}

fn data(bytes: &[u8]) -> io::Result<InboundFrame> { Ok(InboundFrame::Data(bytes.to_vec())) }

#[fixture]
fn small_chunks() -> SessionOptions {
    SessionOptions {
        chunk_size: NonZeroUsize::new(64).expect("non-zero"),
        ..SessionOptions::default()
    }
}

async fn drive<S>(
    inbound: S,
    pipeline: &Pipeline,
    options: &SessionOptions,
) -> (SessionOutcome, Vec<OutboundFrame>)
where
    S: Stream<Item = io::Result<InboundFrame>> + Unpin,
{
    let (tx, mut rx) = mpsc::channel(1024);
    let outcome = run_session(SessionId::next(), inbound, &tx, pipeline, options).await;
    drop(tx);
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    (outcome, frames)
}

fn statuses(frames: &[OutboundFrame]) -> Vec<(StatusKind, String)> {
    frames
        .iter()
        .filter_map(|f| match f {
            OutboundFrame::Status(s) => Some((s.phase, s.message.clone())),
            _ => None,
        })
        .collect()
}

fn has_output(frames: &[OutboundFrame]) -> bool {
    frames
        .iter()
        .any(|f| matches!(f, OutboundFrame::Header(_) | OutboundFrame::Data(_)))
}

/// Assert the single terminal frame is `phase` and return its message.
fn terminal(frames: &[OutboundFrame], phase: StatusKind) -> String {
    let Some(OutboundFrame::Status(last)) = frames.last() else {
        panic!("last frame is not a status: {frames:?}");
    };
    assert_eq!(last.phase, phase);
    assert_eq!(frames.iter().filter(|f| f.is_terminal()).count(), 1);
    last.message.clone()
}

#[rstest]
#[tokio::test]
async fn complete_upload_yields_ordered_output(small_chunks: SessionOptions) {
    let payload = plausible_exr(1000);
    let mut inbound = vec![header(1000)];
    inbound.extend(payload.chunks(250).map(data));
    let pipeline = grey_pipeline(40, 30);

    let (outcome, frames) = drive(stream::iter(inbound), &pipeline, &small_chunks).await;

    let SessionOutcome::Completed {
        width,
        height,
        bytes,
    } = outcome
    else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!((width, height), (40, 30));

    let header_at = frames
        .iter()
        .position(|f| matches!(f, OutboundFrame::Header(_)))
        .expect("output header");
    assert!(frames[..header_at].iter().all(|f| matches!(f, OutboundFrame::Status(_))));
    let OutboundFrame::Header(out) = &frames[header_at] else {
        unreachable!();
    };
    assert_eq!(out.total_size, bytes as u64);

    let body = &frames[header_at + 1..frames.len() - 1];
    let mut png = Vec::new();
    for frame in body {
        let OutboundFrame::Data(chunk) = frame else {
            panic!("non-data frame between header and terminal status: {frame:?}");
        };
        assert!(chunk.len() <= 64);
        png.extend_from_slice(chunk);
    }
    assert_eq!(png.len(), bytes);
    assert_eq!(png[..4], [0x89, b'P', b'N', b'G']);

    assert!(terminal(&frames, StatusKind::Complete).starts_with("Completed: 40x30 PNG"));
    let OutboundFrame::Status(last) = &frames[frames.len() - 1] else {
        unreachable!();
    };
    assert!((last.progress - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn status_phases_never_go_backwards() {
    let payload = plausible_exr(500);
    let mut inbound = vec![header(500)];
    inbound.extend(payload.chunks(50).map(data));
    let pipeline = grey_pipeline(2, 2);

    let (_, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    let phases: Vec<StatusKind> = statuses(&frames).into_iter().map(|(p, _)| p).collect();
    assert_eq!(phases.first(), Some(&StatusKind::Receiving));
    let rank = |p: &StatusKind| *p as u8;
    assert!(phases.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])), "{phases:?}");
    for kind in [StatusKind::Processing, StatusKind::Sending, StatusKind::Complete] {
        assert_eq!(phases.iter().filter(|p| **p == kind).count(), 1);
    }

    let progress: Vec<f32> = frames
        .iter()
        .filter_map(|f| match f {
            OutboundFrame::Status(s) if s.phase == StatusKind::Receiving => Some(s.progress),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| *p < 1.0));
}

#[tokio::test]
async fn receiving_messages_name_the_file_and_byte_counts() {
    let payload = plausible_exr(200);
    let inbound = vec![header(200), data(&payload)];
    let pipeline = grey_pipeline(1, 1);

    let (_, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    let messages = statuses(&frames);
    assert_eq!(messages[0], (StatusKind::Receiving, "Receiving atrium.exr".into()));
    assert_eq!(messages[1], (StatusKind::Receiving, "Received 200/200 bytes".into()));
    assert_eq!(messages[2], (StatusKind::Processing, "Processing EXR to PNG".into()));
    assert_eq!(messages[3], (StatusKind::Sending, "Sending PNG data".into()));
}

#[rstest]
#[case::header_only(vec![header(1024)])]
#[case::nothing(vec![])]
#[case::empty_data(vec![header(0), data(&[])])]
#[tokio::test]
async fn no_data_is_a_single_error(#[case] inbound: Vec<io::Result<InboundFrame>>) {
    let pipeline = grey_pipeline(1, 1);
    let (outcome, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    assert_eq!(outcome, SessionOutcome::Failed("No data received".into()));
    assert_eq!(terminal(&frames, StatusKind::Error), "No data received");
    assert!(!has_output(&frames));
}

#[tokio::test]
async fn decoder_rejection_ends_in_error_without_output() {
    let pipeline = Pipeline::new(RejectingDecoder);
    let inbound = vec![header(100), data(&plausible_exr(100))];

    let (outcome, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    let message = terminal(&frames, StatusKind::Error);
    assert!(message.starts_with("Invalid EXR: "), "{message}");
    assert!(message.contains("no decodable channels"));
    assert!(matches!(outcome, SessionOutcome::Failed(_)));
    assert!(!has_output(&frames));
}

#[tokio::test]
async fn decoder_timeout_is_reported() {
    let pipeline = Pipeline::new(StallingDecoder(Duration::from_secs(10)));
    let inbound = vec![data(&plausible_exr(128))];

    let (_, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    assert!(terminal(&frames, StatusKind::Error).contains("decode timed out"));
}

#[tokio::test]
async fn garbage_is_rejected_by_the_validator() {
    let pipeline = grey_pipeline(1, 1);
    let inbound = vec![data(b"definitely not an exr file")];

    let (_, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    assert!(terminal(&frames, StatusKind::Error).contains("too small to be a valid container"));
}

#[tokio::test]
async fn overflowing_the_declared_size_is_an_error() {
    let pipeline = grey_pipeline(1, 1);
    let payload = plausible_exr(300);
    let inbound = vec![header(200), data(&payload[..150]), data(&payload[150..])];

    let (_, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    assert!(terminal(&frames, StatusKind::Error).contains("more than the declared 200"));
    assert!(!has_output(&frames));
}

#[tokio::test]
async fn short_upload_still_processes() {
    let pipeline = grey_pipeline(3, 3);
    let inbound = vec![header(4096), data(&plausible_exr(256))];

    let (outcome, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    assert!(matches!(outcome, SessionOutcome::Completed { .. }));
    terminal(&frames, StatusKind::Complete);
}

#[tokio::test]
async fn data_before_header_is_accepted_without_progress() {
    let pipeline = grey_pipeline(2, 1);
    let inbound = vec![data(&plausible_exr(400))];

    let (outcome, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    assert!(matches!(outcome, SessionOutcome::Completed { .. }));
    assert_eq!(statuses(&frames)[0].0, StatusKind::Processing);
}

#[rstest]
#[case::header_after_data(vec![data(&[1; 8]), header(8)], "after 8 data bytes")]
#[case::second_header(vec![header(8), header(8)], "duplicate stream header")]
#[case::header_after_empty_data(
    vec![data(&[]), header(200), data(&plausible_exr(200))],
    "after 0 data bytes"
)]
#[tokio::test]
async fn header_ordering_violations_are_errors(
    #[case] inbound: Vec<io::Result<InboundFrame>>,
    #[case] expected: &str,
) {
    let pipeline = grey_pipeline(1, 1);
    let (_, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;
    assert!(terminal(&frames, StatusKind::Error).contains(expected));
}

#[tokio::test]
async fn peer_disconnect_cancels_without_error_frame() {
    let pipeline = grey_pipeline(1, 1);
    let inbound = vec![
        header(1000),
        data(&plausible_exr(500)),
        Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
    ];

    let (outcome, frames) = drive(stream::iter(inbound), &pipeline, &SessionOptions::default()).await;

    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert!(!frames.iter().any(OutboundFrame::is_terminal));
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_time_out() {
    let pipeline = grey_pipeline(1, 1);
    let options = SessionOptions {
        idle_timeout: Duration::from_secs(5),
        ..SessionOptions::default()
    };
    let inbound = stream::iter(vec![header(100)]).chain(stream::pending());

    let (outcome, frames) = drive(inbound, &pipeline, &options).await;

    assert_eq!(outcome, SessionOutcome::Failed("idle timeout".into()));
    assert_eq!(terminal(&frames, StatusKind::Error), "idle timeout");
}

#[tokio::test]
async fn dropped_receiver_cancels_the_session() {
    let pipeline = grey_pipeline(1, 1);
    let (tx, rx) = mpsc::channel(4);
    drop(rx);
    let inbound = stream::iter(vec![header(100), data(&plausible_exr(100))]);

    let outcome = run_session(
        SessionId::next(),
        inbound,
        &tx,
        &pipeline,
        &SessionOptions::default(),
    )
    .await;

    assert_eq!(outcome, SessionOutcome::Cancelled);
}

#[tokio::test]
async fn sessions_share_one_pipeline() {
    let pipeline = grey_pipeline(4, 4);
    let runs = (0..4).map(|_| {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let inbound = stream::iter(vec![header(300), data(&plausible_exr(300))]);
            drive(inbound, &pipeline, &SessionOptions::default()).await.0
        })
    });
    for handle in runs.collect::<Vec<_>>() {
        let outcome = handle.await.expect("session task");
        assert!(matches!(outcome, SessionOutcome::Completed { width: 4, .. }));
    }
}

#[rstest]
#[case(Phase::AwaitingHeader, Phase::Receiving, true)]
#[case(Phase::Receiving, Phase::Processing, true)]
#[case(Phase::Processing, Phase::Sending, true)]
#[case(Phase::Sending, Phase::Complete, true)]
#[case(Phase::Sending, Phase::Error, true)]
#[case(Phase::Processing, Phase::Receiving, false)]
#[case(Phase::Complete, Phase::Error, false)]
#[case(Phase::Error, Phase::Receiving, false)]
#[case(Phase::Receiving, Phase::Complete, false)]
fn transitions(#[case] from: Phase, #[case] to: Phase, #[case] allowed: bool) {
    assert_eq!(from.can_advance_to(to), allowed);
}

#[test]
fn session_ids_are_unique() {
    let a = SessionId::next();
    let b = SessionId::next();
    assert_ne!(a, b);
    assert_eq!(SessionId::from(0x2a).to_string(), "0000002a");
}
