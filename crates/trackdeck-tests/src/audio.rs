//! Integration tests for the audio subsystem.

use std::sync::Arc;
use trackdeck_audio::{
    AudioEngine, Envelope, NullDevice, PlayerState, RenderStatus, ScheduledBuffer, TrackPlayer,
};
use trackdeck_core::{AudioFormat, PcmBuffer, SampleKind};
use uuid::Uuid;

fn scheduled(offset_frames: u64, frames: usize, value: f32) -> ScheduledBuffer {
    ScheduledBuffer {
        clip_id: Uuid::new_v4(),
        offset_frames,
        buffer: Arc::new(PcmBuffer::from_planar_f32(1000, vec![vec![value; frames]])),
    }
}

#[test]
fn manual_rendering_pulls_scheduled_players() {
    let format = AudioFormat::float(1000, 2);
    let mut engine = AudioEngine::headless(format);
    let player = TrackPlayer::shared();
    player.lock().schedule(scheduled(100, 200, 0.5));
    engine.attach(Arc::clone(&player));

    engine.enable_manual_rendering(format, 128).unwrap();
    player.lock().play();

    let mut block = PcmBuffer::new(format, 128);
    let mut rendered = Vec::new();
    for _ in 0..3 {
        assert_eq!(engine.render_offline(128, &mut block).unwrap(), RenderStatus::Success);
        assert_eq!(block.frame_length(), 128);
        rendered.extend(block.channel_f32(0).unwrap().iter().copied());
    }
    assert_eq!(engine.manual_rendering_sample_time(), 384);

    assert_eq!(rendered[99], 0.0);
    assert_eq!(rendered[100], 0.5);
    assert_eq!(rendered[299], 0.5);
    assert_eq!(rendered[300], 0.0);
    assert!(player.lock().is_drained(1000));
}

#[test]
fn busy_player_reports_cannot_render() {
    let format = AudioFormat::float(1000, 2);
    let mut engine = AudioEngine::headless(format);
    let player = TrackPlayer::shared();
    engine.attach(Arc::clone(&player));
    engine.enable_manual_rendering(format, 64).unwrap();

    let mut block = PcmBuffer::new(format, 64);
    {
        let _held = player.lock();
        assert_eq!(
            engine.render_offline(64, &mut block).unwrap(),
            RenderStatus::CannotDoInCurrentContext
        );
        assert!(block.is_empty());
    }
    assert_eq!(engine.render_offline(64, &mut block).unwrap(), RenderStatus::Success);
}

#[test]
fn manual_rendering_rejects_bad_requests() {
    let format = AudioFormat::float(1000, 2);
    let mut engine = AudioEngine::headless(format);

    let mut block = PcmBuffer::new(format, 64);
    assert!(engine.render_offline(64, &mut block).is_err());

    let int_format = AudioFormat {
        sample_kind: SampleKind::I16,
        ..format
    };
    assert!(engine.enable_manual_rendering(int_format, 64).is_err());
    assert!(engine.enable_manual_rendering(format, 0).is_err());

    engine.enable_manual_rendering(format, 64).unwrap();
    assert!(engine.render_offline(65, &mut block).is_err());
    assert!(engine.start().is_err());

    let mut mono = PcmBuffer::new(AudioFormat::float(1000, 1), 64);
    assert!(engine.render_offline(32, &mut mono).is_err());

    engine.disable_manual_rendering();
    assert!(!engine.is_manual_rendering());
    assert!(engine.start().is_ok());
}

#[test]
fn live_engine_renders_through_device() {
    let device = NullDevice::new(AudioFormat::float(1000, 2));
    let handle = device.handle();
    let mut engine = AudioEngine::new(Box::new(device));

    let player = TrackPlayer::shared();
    player.lock().schedule(scheduled(0, 50, 0.25));
    engine.attach(Arc::clone(&player));
    player.lock().play();

    engine.start().unwrap();
    let out = handle.pull(100).unwrap();
    assert_eq!(out[0], 0.25);
    assert_eq!(out[1], 0.25);
    assert_eq!(out[2 * 60], 0.0);

    player.lock().stop();
    assert_eq!(player.lock().state(), PlayerState::Stopped);
    engine.stop();
    assert!(handle.pull(1).is_none());
}

#[test]
fn envelope_tracks_clip_loudness() {
    let mut samples = vec![0.0f32; 2000];
    for s in &mut samples[1000..] {
        *s = 0.8;
    }
    let buffer = PcmBuffer::from_planar_f32(1000, vec![samples]);
    let envelope = Envelope::compute(&buffer, 100);

    assert_eq!(envelope.len(), 20);
    assert!(envelope.power_at(0.5) < envelope.power_at(1.5));
    assert_eq!(envelope.value_at(5.0), None);
}
