//! Stream bridge scenarios: caller-owned data read by the engine
//!
//! These tests verify:
//! - Bytes read never exceed the reported size, whatever the request size
//! - Sessions are released exactly when the engine closes them
//! - A consumed stream source cannot be replayed
//! - A slow backing store never makes a read block past its own latency

use anyhow::Result;
use std::sync::atomic::Ordering;
use std::time::Duration;
use vidpane::player::{MediaSource, PlaybackState};
use vidpane::PlayerError;
use vidpane_integration_tests::{Harness, TestFixture, TrackedStream};

const MEDIA_LEN: usize = 1_000_000;

#[test]
fn test_reads_never_exceed_reported_size() -> Result<()> {
    let mut harness = Harness::new(true)?;
    for chunk in [1usize, 4096, 1_000_000] {
        let (stream, _dropped) = TrackedStream::new(MEDIA_LEN);
        harness
            .element
            .set_source(MediaSource::stream(stream, format!("chunk-{}", chunk)))?;

        let (total, size) = harness
            .engine
            .drain_stream(chunk)
            .expect("engine opened the staged stream");
        assert_eq!(size, MEDIA_LEN as i64);
        assert!(total <= size as u64);
        assert_eq!(total, MEDIA_LEN as u64);
    }
    Ok(())
}

#[test]
fn test_session_released_on_close() -> Result<()> {
    let mut harness = Harness::new(true)?;
    let (stream, dropped) = TrackedStream::new(MEDIA_LEN);
    harness.element.set_source(MediaSource::stream(stream, "tracked.bin"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));
    assert_eq!(harness.element.live_stream_sessions(), 1);
    assert!(!dropped.load(Ordering::SeqCst));

    harness.element.stop()?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Stopped));
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(harness.element.live_stream_sessions(), 0);
    // The engine holds no cookie any more, so nothing can read the store
    assert!(!harness.engine.has_open_stream());
    assert!(harness.engine.drain_stream(4096).is_none());
    Ok(())
}

#[test]
fn test_consumed_stream_cannot_replay() -> Result<()> {
    let mut harness = Harness::new(true)?;
    let (stream, dropped) = TrackedStream::new(1024);
    harness.element.set_source(MediaSource::stream(stream, "once.bin"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));

    harness.engine.finish_playback();
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Closed));
    assert!(dropped.load(Ordering::SeqCst));

    let err = harness.element.play().unwrap_err();
    assert!(matches!(err, PlayerError::InvalidInput(_)));

    // Setting a fresh source works again
    let (stream, _) = TrackedStream::new(1024);
    harness.element.set_source(MediaSource::stream(stream, "again.bin"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));
    Ok(())
}

#[test]
fn test_file_source_streams_through_bridge() -> Result<()> {
    let fixture = TestFixture::new()?;
    let path = fixture.media_file("clip.bin", 65_536)?;

    let mut harness = Harness::new(true)?;
    harness.element.set_source(MediaSource::open_file(&path)?)?;

    let (total, size) = harness.engine.drain_stream(4096).expect("stream open");
    assert_eq!((total, size), (65_536, 65_536));
    let uri = &harness.engine.commands()[0][1];
    assert!(uri.starts_with("vidpane-stream://"), "{}", uri);
    Ok(())
}

#[test]
fn test_slow_store_reads_return_within_delay() -> Result<()> {
    const DELAY: Duration = Duration::from_millis(20);
    const MARGIN: Duration = Duration::from_millis(200);

    let mut harness = Harness::new(true)?;
    let (stream, _dropped) = TrackedStream::with_delay(10_000, DELAY);
    harness.element.set_source(MediaSource::stream(stream, "slow.bin"))?;

    let size = harness.engine.stream_size().expect("engine opened the staged stream");
    let reads = harness.engine.timed_reads(4096).expect("engine opened the staged stream");

    // Partial reads until the store is exhausted, then exactly one 0
    let counts: Vec<i64> = reads.iter().map(|(n, _)| *n).collect();
    assert_eq!(counts, vec![4096, 4096, 1808, 0]);
    assert_eq!(counts.iter().sum::<i64>(), size);

    for (n, took) in &reads {
        assert!(*took >= DELAY, "read of {} skipped the store: {:?}", n, took);
        assert!(*took < DELAY + MARGIN, "read of {} blocked for {:?}", n, took);
    }
    Ok(())
}
