//! Session teardown while the engine is still referenced
//!
//! These tests verify:
//! - Dropping the element detaches every callback the engine was given
//! - Open stream sessions are closed before their openers are freed

use anyhow::Result;
use std::sync::atomic::Ordering;
use vidpane::player::{MediaSource, PlaybackState};
use vidpane::surface::SurfaceRegion;
use vidpane_integration_tests::{Harness, TrackedStream};

#[test]
fn test_dropping_element_detaches_engine_callbacks() -> Result<()> {
    let mut harness = Harness::new(true)?;
    harness
        .element
        .on_surface_ready(&SurfaceRegion::headless(320.0, 240.0, 1.0))?;
    let (stream, dropped) = TrackedStream::new(4096);
    harness.element.set_source(MediaSource::stream(stream, "held.bin"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));

    assert!(harness.engine.has_frame_callback());
    assert_eq!(harness.engine.stream_openers(), 1);
    assert!(harness.engine.has_open_stream());

    let Harness { element, engine, gpu } = harness;
    drop(element);
    let presents = gpu.presents.load(Ordering::SeqCst);
    let draws = engine.draws();

    // The engine outlives the element but holds nothing that was freed
    assert!(!engine.has_frame_callback());
    assert_eq!(engine.stream_openers(), 0);
    assert!(!engine.has_open_stream());
    assert!(dropped.load(Ordering::SeqCst));
    assert!(engine.drain_stream(4096).is_none());

    // A late frame-ready signal has nowhere to go
    engine.frame_ready();
    assert_eq!(gpu.presents.load(Ordering::SeqCst), presents);
    assert_eq!(engine.draws(), draws);
    Ok(())
}

#[test]
fn test_dropping_idle_element_releases_openers() -> Result<()> {
    let harness = Harness::new(false)?;
    assert_eq!(harness.engine.stream_openers(), 1);

    let Harness { element, engine, .. } = harness;
    drop(element);
    assert_eq!(engine.stream_openers(), 0);
    assert!(!engine.has_frame_callback());
    Ok(())
}
