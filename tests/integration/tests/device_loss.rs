//! Render hand-off and device-loss recovery scenarios
//!
//! These tests verify:
//! - One engine frame notification produces exactly one present
//! - A failed present triggers one full recovery and rendering resumes
//! - A failed recovery leaves no surface and tells the UI layer
//! - A failed draw is logged and skipped, never surfaced as an error

use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use vidpane::player::{MediaSource, PlaybackState, PlayerEvent};
use vidpane::surface::{SurfaceHandle, SurfaceRegion};
use vidpane_integration_tests::Harness;

fn playing_harness() -> Result<(Harness, Rc<RefCell<Vec<PlayerEvent>>>)> {
    let mut harness = Harness::new(true)?;
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    harness.element.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    harness
        .element
        .on_surface_ready(&SurfaceRegion::headless(640.0, 360.0, 1.0))?;
    harness.element.set_source(MediaSource::uri("/media/clip.mkv"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));
    Ok((harness, events))
}

#[test]
fn test_one_present_per_frame_notification() -> Result<()> {
    let (mut harness, _events) = playing_harness()?;
    let gpu = harness.gpu.clone();

    harness.engine.frame_ready();
    assert!(harness.pump_until(|_| gpu.presents.load(Ordering::SeqCst) == 1));
    harness.settle(Duration::from_millis(50));
    assert_eq!(gpu.presents.load(Ordering::SeqCst), 1);
    assert_eq!(harness.engine.draws(), 1);
    assert_eq!(harness.engine.swaps(), 1);
    Ok(())
}

#[test]
fn test_present_failure_recovers_transparently() -> Result<()> {
    let (mut harness, events) = playing_harness()?;
    let gpu = harness.gpu.clone();
    let first = harness.element.surface_handle();
    assert!(first.is_valid());

    gpu.fail_next_present.store(true, Ordering::SeqCst);
    harness.engine.frame_ready();
    assert!(harness.pump_until(|e| e.recoveries() == 1));
    assert!(harness.element.is_rendering());

    assert_eq!(gpu.resets.load(Ordering::SeqCst), 1);
    assert_eq!(gpu.created.load(Ordering::SeqCst), 2);
    assert_eq!(gpu.destroyed.load(Ordering::SeqCst), 1);
    let second = harness.element.surface_handle();
    assert!(second.is_valid());
    assert_ne!(second, first);

    // No user-visible failure
    assert_eq!(harness.element.state(), PlaybackState::Playing);
    assert!(events.borrow().contains(&PlayerEvent::SurfaceRestored));
    assert!(!events
        .borrow()
        .iter()
        .any(|e| matches!(e, PlayerEvent::Error { .. } | PlayerEvent::SurfaceUnavailable { .. })));

    // Frames flow again on the new surface
    harness.engine.frame_ready();
    assert!(harness.pump_until(|_| gpu.presents.load(Ordering::SeqCst) == 1));
    harness.settle(Duration::from_millis(50));
    assert_eq!(gpu.resets.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_failed_recovery_leaves_placeholder() -> Result<()> {
    let (mut harness, events) = playing_harness()?;
    let gpu = harness.gpu.clone();

    gpu.fail_create.store(true, Ordering::SeqCst);
    gpu.fail_next_present.store(true, Ordering::SeqCst);
    harness.engine.frame_ready();
    assert!(harness.pump_until(|e| e.surface_handle() == SurfaceHandle::NONE));
    harness.settle(Duration::from_millis(20));

    assert!(!harness.element.is_rendering());
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, PlayerEvent::SurfaceUnavailable { .. })));
    assert_eq!(harness.element.state(), PlaybackState::Playing);

    // The region coming back binds a new surface
    gpu.fail_create.store(false, Ordering::SeqCst);
    harness
        .element
        .on_surface_ready(&SurfaceRegion::headless(640.0, 360.0, 1.0))?;
    assert!(harness.element.surface_handle().is_valid());
    Ok(())
}

#[test]
fn test_draw_failure_is_skipped() -> Result<()> {
    let (mut harness, events) = playing_harness()?;
    let gpu = harness.gpu.clone();

    harness.engine.set_fail_draw(true);
    harness.engine.frame_ready();
    harness.settle(Duration::from_millis(50));
    assert_eq!(gpu.presents.load(Ordering::SeqCst), 0);
    assert_eq!(harness.element.recoveries(), 0);
    assert_eq!(harness.element.state(), PlaybackState::Playing);
    assert!(!events.borrow().iter().any(|e| matches!(e, PlayerEvent::Error { .. })));

    harness.engine.set_fail_draw(false);
    harness.engine.frame_ready();
    assert!(harness.pump_until(|_| gpu.presents.load(Ordering::SeqCst) == 1));
    Ok(())
}

#[test]
fn test_hidden_region_keeps_surface() -> Result<()> {
    let (mut harness, _events) = playing_harness()?;
    let surface = harness.element.surface_handle();

    harness.element.on_visibility_changed(false)?;
    assert!(!harness.element.is_rendering());
    assert_eq!(harness.element.surface_handle(), surface);

    harness.element.on_visibility_changed(true)?;
    assert!(harness.element.is_rendering());

    harness.element.on_surface_teardown();
    assert_eq!(harness.element.surface_handle(), SurfaceHandle::NONE);
    assert!(!harness.element.is_rendering());
    Ok(())
}
