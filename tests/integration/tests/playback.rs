//! Playback session scenarios against the scripted engine
//!
//! These tests verify:
//! - State transitions follow engine notifications only
//! - Position, length and seekable updates
//! - Engine configuration and property subscriptions
//! - Failure reporting as the Error state

use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use vidpane::player::{MediaSource, PlaybackState, PlayerEvent};
use vidpane::PlayerError;
use vidpane_integration_tests::{Harness, MOCK_LENGTH_SECS};

type Transitions = Rc<RefCell<Vec<(PlaybackState, PlaybackState)>>>;

fn record_transitions(harness: &mut Harness) -> Transitions {
    let transitions: Transitions = Rc::new(RefCell::new(Vec::new()));
    let sink = transitions.clone();
    harness.element.subscribe(move |event| {
        if let PlayerEvent::StateChanged { old, new } = event {
            sink.borrow_mut().push((*old, *new));
        }
    });
    transitions
}

#[test]
fn test_engine_configured_before_start() -> Result<()> {
    let harness = Harness::new(false)?;
    let options = harness.engine.options();
    assert!(options.contains(&("vo".to_string(), "libmpv".to_string())));
    assert!(options.contains(&("idle".to_string(), "yes".to_string())));
    assert!(options.contains(&("msg-level".to_string(), "all=v".to_string())));

    let observed = harness.engine.observed();
    for name in ["pause", "time-pos", "duration", "seekable", "volume", "mute"] {
        assert!(observed.iter().any(|o| o == name), "{} not observed", name);
    }
    assert_eq!(harness.element.state(), PlaybackState::Closed);
    Ok(())
}

#[test]
fn test_play_pause_stop_scenario() -> Result<()> {
    let mut harness = Harness::new(false)?;
    let transitions = record_transitions(&mut harness);

    harness
        .element
        .set_source(MediaSource::uri("/media/ten-seconds.mkv"))?;
    // Without auto-play nothing is loaded yet
    assert!(harness.engine.commands().is_empty());
    assert_eq!(harness.element.state(), PlaybackState::Closed);

    harness.element.play()?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing && e.is_seekable()));
    assert_eq!(
        harness.element.length(),
        Some(Duration::from_secs_f64(MOCK_LENGTH_SECS))
    );

    harness.element.pause()?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Paused));

    harness.element.set_position(0.5)?;
    assert!(harness.pump_until(|e| e.position() == Duration::from_secs(5)));

    harness.element.stop()?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Stopped));
    assert_eq!(harness.element.position(), Duration::ZERO);
    assert!(!harness.element.is_seekable());

    assert_eq!(
        *transitions.borrow(),
        vec![
            (PlaybackState::Closed, PlaybackState::Opening),
            (PlaybackState::Opening, PlaybackState::Playing),
            (PlaybackState::Playing, PlaybackState::Paused),
            (PlaybackState::Paused, PlaybackState::Stopped),
        ]
    );
    Ok(())
}

#[test]
fn test_commands_do_not_move_state_optimistically() -> Result<()> {
    let mut harness = Harness::new(true)?;
    harness.element.set_source(MediaSource::uri("/media/clip.mkv"))?;
    // The load was issued but no notification has been handled yet
    assert_eq!(harness.element.state(), PlaybackState::Closed);
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));

    harness.element.pause()?;
    assert_eq!(harness.element.state(), PlaybackState::Playing);
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Paused));

    harness.element.toggle_play_pause()?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));
    Ok(())
}

#[test]
fn test_buffering_follows_cache_stalls() -> Result<()> {
    let mut harness = Harness::new(true)?;
    harness.element.set_source(MediaSource::uri("/media/remote.mkv"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));

    harness.engine.stall(true);
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Buffering));
    harness.engine.stall(false);
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));
    Ok(())
}

#[test]
fn test_end_of_media_closes() -> Result<()> {
    let mut harness = Harness::new(true)?;
    let ended = Rc::new(RefCell::new(false));
    let flag = ended.clone();
    harness.element.subscribe(move |event| {
        if *event == PlayerEvent::EndOfMedia {
            *flag.borrow_mut() = true;
        }
    });

    harness.element.set_source(MediaSource::uri("/media/clip.mkv"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));

    harness.engine.finish_playback();
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Closed));
    assert!(*ended.borrow());
    assert_eq!(harness.element.length(), None);

    // A direct source can be played again
    harness.element.play()?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));
    Ok(())
}

#[test]
fn test_volume_and_mute_round_trip_through_engine() -> Result<()> {
    let mut harness = Harness::new(false)?;
    assert_eq!(harness.element.volume(), 70.0);

    harness.element.set_volume(150)?;
    assert_eq!(harness.engine.property("volume").as_deref(), Some("100"));
    assert!(harness.pump_until(|e| e.volume() == 100.0));

    harness.element.set_muted(true)?;
    assert!(harness.pump_until(|e| e.is_muted()));
    Ok(())
}

#[test]
fn test_seek_ignored_until_seekable() -> Result<()> {
    let mut harness = Harness::new(false)?;
    harness.element.set_position(0.25)?;
    harness.element.seek_relative(5.0)?;
    assert!(harness.engine.commands().is_empty());

    let err = harness.element.set_position(1.5).unwrap_err();
    assert!(matches!(err, PlayerError::InvalidInput(_)));
    Ok(())
}

#[test]
fn test_relative_seek_moves_from_current_position() -> Result<()> {
    let mut harness = Harness::new(true)?;
    harness.element.set_source(MediaSource::uri("/media/clip.mkv"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing && e.is_seekable()));

    harness.element.seek_relative(3.0)?;
    assert!(harness.pump_until(|e| e.position() == Duration::from_secs(3)));

    harness.element.seek_relative(2.5)?;
    assert!(harness.pump_until(|e| e.position() == Duration::from_millis(5500)));

    // Seeking past either end lands on it
    harness.element.seek_relative(60.0)?;
    assert!(harness.pump_until(|e| e.position() == Duration::from_secs_f64(MOCK_LENGTH_SECS)));
    harness.element.seek_relative(-60.0)?;
    assert!(harness.pump_until(|e| e.position() == Duration::ZERO));

    let last = harness.engine.commands().last().cloned().unwrap_or_default();
    assert_eq!(last, vec!["seek", "-60.000", "relative"]);
    Ok(())
}

#[test]
fn test_media_length_polls_with_bounded_retry() -> Result<()> {
    let mut harness = Harness::new(false)?;
    // Nothing loaded: the engine never provides a duration
    let err = harness.element.media_length().unwrap_err();
    assert!(matches!(err, PlayerError::EngineCommand(_)));

    harness.element.set_source(MediaSource::uri("/media/clip.mkv"))?;
    harness.element.play()?;
    let length = harness.element.media_length()?;
    assert_eq!(length, Duration::from_secs_f64(MOCK_LENGTH_SECS));
    Ok(())
}

#[test]
fn test_rejected_command_enters_error_state() -> Result<()> {
    let mut harness = Harness::new(true)?;
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    harness.element.subscribe(move |event| {
        if let PlayerEvent::Error { message } = event {
            sink.borrow_mut().push(message.clone());
        }
    });

    harness.element.set_source(MediaSource::uri("/media/clip.mkv"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Playing));

    harness.engine.set_reject_commands(true);
    let err = harness.element.stop().unwrap_err();
    assert!(matches!(err, PlayerError::EngineCommand(_)));
    assert_eq!(harness.element.state(), PlaybackState::Error);
    assert_eq!(errors.borrow().len(), 1);
    assert!(harness.element.last_error().is_some());

    // Any later valid transition leaves Error
    harness.engine.set_reject_commands(false);
    harness.element.stop()?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Stopped));
    Ok(())
}

#[test]
fn test_unknown_stream_uri_fails_to_load() -> Result<()> {
    let mut harness = Harness::new(true)?;
    harness
        .element
        .set_source(MediaSource::uri("vidpane-stream://999"))?;
    assert!(harness.pump_until(|e| e.state() == PlaybackState::Error));
    let message = harness.element.last_error().unwrap_or_default().to_string();
    assert!(message.contains("loading failed"), "{}", message);
    Ok(())
}

#[test]
fn test_auto_repeat_sets_engine_looping() -> Result<()> {
    let mut config = vidpane::utils::Config::default();
    config.player.auto_repeat = true;
    let mut harness = Harness::with_config(&config)?;
    assert!(harness
        .engine
        .options()
        .contains(&("loop-file".to_string(), "inf".to_string())));

    harness.element.set_auto_repeat(false)?;
    assert_eq!(harness.engine.property("loop-file").as_deref(), Some("no"));
    assert!(!harness.element.settings().auto_repeat);
    Ok(())
}
