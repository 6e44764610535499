//! Integration tests for the timeline subsystem.
//!
//! Exercises cross-crate interactions between trackdeck-core,
//! trackdeck-audio, trackdeck-media and trackdeck-timeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use trackdeck_audio::{AudioEngine, NullDevice, NullDeviceHandle};
use trackdeck_core::{AudioFormat, EngineConfig, PcmBuffer};
use trackdeck_media::{AudioCodec, AudioDecoder, MemoryDecoder, MemorySink, WavDecoder};
use trackdeck_timeline::{Document, DocumentFile, Timeline, TimelineError, TimelineState};
use uuid::Uuid;

// ── Helpers ────────────────────────────────────────────────────

fn config(sample_rate: u32) -> EngineConfig {
    EngineConfig {
        output_sample_rate: sample_rate,
        envelope_compression: 10,
        ..Default::default()
    }
}

fn constant(sample_rate: u32, seconds: f64, value: f32) -> PcmBuffer {
    let frames = (seconds * sample_rate as f64) as usize;
    PcmBuffer::from_planar_f32(sample_rate, vec![vec![value; frames]])
}

fn decoder() -> MemoryDecoder {
    let decoder = MemoryDecoder::new();
    decoder.insert("five.wav", constant(1000, 5.0, 0.5));
    decoder.insert("one.wav", constant(1000, 1.0, 0.25));
    decoder.insert("two.wav", constant(1000, 2.0, 0.5));
    decoder.insert("slow.wav", constant(500, 1.0, 0.5));
    decoder
}

fn live_timeline() -> (Timeline, NullDeviceHandle) {
    let device = NullDevice::new(AudioFormat::float(1000, 2));
    let handle = device.handle();
    let timeline = Timeline::new(AudioEngine::new(Box::new(device)), config(1000));
    (timeline, handle)
}

fn mixdown(timeline: &mut Timeline) -> (u64, Vec<f32>) {
    let settings = timeline.export_settings("mix.wav", AudioCodec::Pcm);
    let mut sink = MemorySink::new(settings.channels);
    let output = sink.export();
    let frames = timeline
        .export_to_sink(&mut sink, &settings, |_| {})
        .expect("export failed");
    (frames, output.samples())
}

fn temp_path(extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("trackdeck-it-{}.{}", Uuid::new_v4(), extension))
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

// ── Scheduling ─────────────────────────────────────────────────

#[test]
fn playback_mid_clip_schedules_remaining_tail() {
    let mut timeline = Timeline::headless(config(1000));
    let decoder = decoder();
    let underway = timeline
        .import_file(Path::new("five.wav"), 10.0, None, &decoder)
        .unwrap();
    let track_id = timeline.clip(underway).unwrap().track_id;
    let later = timeline
        .import_file(Path::new("one.wav"), 20.0, Some(track_id), &decoder)
        .unwrap();

    timeline.seek(12.0);
    timeline.play();

    let track = timeline.track(track_id).unwrap();
    let player = track.player().lock();
    let queued = player.scheduled();
    assert_eq!(queued.len(), 2);

    assert_eq!(queued[0].clip_id, underway);
    assert_eq!(queued[0].offset_frames, 0);
    assert_eq!(queued[0].buffer.frame_length(), 3000);
    assert!((queued[0].buffer.duration() - 3.0).abs() < 1e-9);

    assert_eq!(queued[1].clip_id, later);
    assert_eq!(queued[1].offset_frames, 8000);
    assert_eq!(queued[1].buffer.frame_length(), 1000);
}

#[test]
fn scheduling_is_idempotent() {
    let mut timeline = Timeline::headless(config(1000));
    let decoder = decoder();
    timeline.import_file(Path::new("five.wav"), 1.0, None, &decoder);
    let track_id = timeline.tracks()[0].id;
    timeline.import_file(Path::new("two.wav"), 7.5, Some(track_id), &decoder);

    let track = timeline.track(track_id).unwrap();
    for t in [0.0, 1.0, 3.3, 6.0, 8.0, 9.5, 30.0] {
        assert_eq!(track.plan(t), track.plan(t));

        track.player().lock().stop();
        let first = track.schedule(t, false);
        let spans: Vec<(u64, usize)> = track
            .player()
            .lock()
            .scheduled()
            .iter()
            .map(|s| (s.offset_frames, s.buffer.frame_length()))
            .collect();

        track.player().lock().stop();
        assert_eq!(track.schedule(t, false), first);
        let again: Vec<(u64, usize)> = track
            .player()
            .lock()
            .scheduled()
            .iter()
            .map(|s| (s.offset_frames, s.buffer.frame_length()))
            .collect();
        assert_eq!(spans, again);
    }
}

#[test]
fn clip_ending_exactly_at_playhead_is_skipped() {
    let mut timeline = Timeline::headless(config(1000));
    timeline.import_file(Path::new("two.wav"), 1.0, None, &decoder());
    timeline.seek(3.0);
    timeline.play();
    let player = timeline.tracks()[0].player().lock();
    assert!(player.scheduled().is_empty());
}

// ── Mute / solo ────────────────────────────────────────────────

fn assert_solo_invariant(timeline: &Timeline) {
    let soloed: Vec<Uuid> = timeline
        .tracks()
        .iter()
        .filter(|t| t.solo)
        .map(|t| t.id)
        .collect();
    assert!(soloed.len() <= 1, "more than one track soloed");

    for track in timeline.tracks() {
        let audible = !timeline.is_track_muted(track.id).unwrap();
        match soloed.first() {
            Some(id) => assert_eq!(audible, track.id == *id),
            None => assert_eq!(audible, !track.muted),
        }
    }
}

#[test]
fn solo_leaves_exactly_one_audible_track() {
    let mut timeline = Timeline::headless(config(1000));
    let ids: Vec<Uuid> = (0..4).map(|_| timeline.add_new_track()).collect();

    let steps: [(bool, usize); 10] = [
        (true, 0),
        (true, 2),
        (false, 1),
        (true, 2),
        (false, 3),
        (true, 3),
        (true, 1),
        (false, 1),
        (true, 0),
        (true, 0),
    ];
    for (solo, index) in steps {
        if solo {
            timeline.solo(ids[index]);
        } else {
            timeline.mute(ids[index]);
        }
        assert_solo_invariant(&timeline);
    }
}

#[test]
fn muted_and_soloed_tracks_shape_the_mixdown() {
    let mut timeline = Timeline::headless(config(1000));
    let decoder = decoder();
    timeline.import_file(Path::new("one.wav"), 0.0, None, &decoder);
    timeline.import_file(Path::new("two.wav"), 0.0, None, &decoder);
    let quiet = timeline.tracks()[0].id;
    let loud = timeline.tracks()[1].id;

    let (_, both) = mixdown(&mut timeline);
    assert!(approx(both[200], 0.75));

    timeline.mute(loud);
    let (_, muted) = mixdown(&mut timeline);
    assert!(approx(muted[200], 0.25));

    timeline.solo(loud);
    let (_, soloed) = mixdown(&mut timeline);
    assert!(approx(soloed[200], 0.5));
    assert_eq!(timeline.is_track_muted(quiet), Some(true));
}

// ── Mixdown ────────────────────────────────────────────────────

#[test]
fn export_length_excludes_trailing_margin() {
    let decoder = MemoryDecoder::new();
    decoder.insert("tone.wav", constant(8000, 2.5, 0.1));
    let mut timeline = Timeline::headless(config(8000));
    timeline.import_file(Path::new("tone.wav"), 1.0, None, &decoder);

    let (frames, samples) = mixdown(&mut timeline);
    assert_eq!(frames, 28_000);
    assert_eq!(samples.len(), 56_000);
    assert_eq!(samples[0], 0.0);
    assert!(approx(samples[2 * 9000], 0.1));
}

#[test]
fn overlapping_clips_mix_additively() {
    let mut timeline = Timeline::headless(config(1000));
    let decoder = decoder();
    let first = timeline
        .import_file(Path::new("one.wav"), 0.0, None, &decoder)
        .unwrap();
    let track_id = timeline.clip(first).unwrap().track_id;
    let second = timeline
        .import_file(Path::new("one.wav"), 0.5, Some(track_id), &decoder)
        .unwrap();
    assert_eq!(timeline.overlapping_clips(second), vec![first]);

    let (frames, samples) = mixdown(&mut timeline);
    assert_eq!(frames, 1500);
    assert!(approx(samples[2 * 250], 0.25));
    assert!(approx(samples[2 * 750], 0.5));
    assert!(approx(samples[2 * 1250], 0.25));
}

#[test]
fn pan_hard_left_silences_right_channel() {
    let mut timeline = Timeline::headless(config(1000));
    timeline.import_file(Path::new("two.wav"), 0.0, None, &decoder());
    let track_id = timeline.tracks()[0].id;
    timeline.set_track_pan(track_id, -1.0);

    let (_, samples) = mixdown(&mut timeline);
    assert!(approx(samples[100], 0.5));
    assert_eq!(samples[101], 0.0);
}

#[test]
fn lower_rate_clip_is_resampled_into_mix() {
    let mut timeline = Timeline::headless(config(1000));
    timeline.import_file(Path::new("slow.wav"), 0.0, None, &decoder());
    let (frames, samples) = mixdown(&mut timeline);
    assert_eq!(frames, 1000);
    assert!(approx(samples[2 * 400], 0.5));
}

#[test]
fn export_to_wav_reads_back() {
    let mut timeline = Timeline::headless(config(1000));
    timeline.import_file(Path::new("two.wav"), 0.5, None, &decoder());
    let path = temp_path("wav");
    let settings = timeline.export_settings(&path, AudioCodec::Pcm);

    let mut reports = 0;
    assert_eq!(timeline.export(&settings, |_| reports += 1), Some(2500));
    assert!(reports > 0);

    let decoded = WavDecoder::new().decode(&path).unwrap();
    assert_eq!(decoded.frame_length(), 2500);
    assert_eq!(decoded.channel_count(), 2);
    assert!(approx(decoded.sample_f32(0, 1000), 0.5));
    let _ = std::fs::remove_file(&path);
}

// ── Live playback ──────────────────────────────────────────────

#[test]
fn live_playback_advances_transport() {
    let (mut timeline, device) = live_timeline();
    timeline.import_file(Path::new("two.wav"), 0.0, None, &decoder());

    assert!(device.pull(10).is_none());
    timeline.play();
    let block = device.pull(500).unwrap();
    assert!(approx(block[0], 0.5));
    assert!(approx(block[999], 0.5));
    assert_eq!(timeline.current_time(), 0.5);

    // Seeking while playing restarts from the new position.
    timeline.seek(1.5);
    assert!(timeline.is_playing());
    let block = device.pull(600).unwrap();
    assert!(approx(block[2 * 499], 0.5));
    assert_eq!(block[2 * 599], 0.0);
    assert!((timeline.current_time() - 2.1).abs() < 1e-9);

    timeline.stop();
    assert!(device.pull(10).is_none());
    assert!((timeline.current_time() - 2.1).abs() < 1e-9);
}

#[test]
fn edits_during_playback_resume_playback() {
    let (mut timeline, device) = live_timeline();
    let decoder = decoder();
    let clip = timeline
        .import_file(Path::new("one.wav"), 0.0, None, &decoder)
        .unwrap();
    timeline.play();
    device.pull(100);

    timeline.set_clip_start(clip, 5.0);
    assert!(timeline.is_playing());
    let block = device.pull(100).unwrap();
    assert!(block.iter().all(|s| *s == 0.0));
}

// ── Import & persistence ───────────────────────────────────────

#[test]
fn failed_import_leaves_timeline_ready() {
    let document = Document::new(Timeline::headless(config(1000)), Arc::new(decoder())).unwrap();
    let events = document.timeline().lock().subscribe();

    assert_eq!(document.import("missing.wav", 0.0, None).recv().unwrap(), None);

    let timeline = document.timeline().lock();
    assert!(timeline.tracks().is_empty());
    assert_eq!(timeline.state(), TimelineState::Ready);
    match timeline.last_error() {
        Some(TimelineError::Decode { locator, .. }) => assert_eq!(locator, "missing.wav"),
        other => panic!("unexpected error state: {:?}", other),
    }
    assert!(events
        .try_iter()
        .any(|e| e == trackdeck_timeline::TimelineEvent::StateChanged(TimelineState::Processing)));
}

#[test]
fn queued_export_runs_after_imports() {
    let document = Document::new(Timeline::headless(config(1000)), Arc::new(decoder())).unwrap();
    document.import("one.wav", 0.0, None);
    document.import("two.wav", 1.0, None);

    let path = temp_path("wav");
    let settings = document
        .timeline()
        .lock()
        .export_settings(&path, AudioCodec::Pcm);
    let frames = document.export(settings).done.recv().unwrap();
    assert_eq!(frames, Some(3000));
    assert_eq!(document.timeline().lock().state(), TimelineState::Ready);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn document_roundtrip_through_file() {
    let decoder = decoder();
    let mut timeline = Timeline::headless(config(1000));
    timeline.import_file(Path::new("five.wav"), 2.0, None, &decoder);
    timeline.import_file(Path::new("one.wav"), 0.5, None, &decoder);
    let second = timeline.tracks()[1].id;
    timeline.solo(second);
    timeline.set_track_volume(second, 0.7);

    let path = temp_path("json");
    timeline.to_document().save_to_file(&path).unwrap();
    let loaded = DocumentFile::load_from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let mut restored = Timeline::headless(config(1000));
    assert!(restored.load_document(&loaded, &decoder).is_empty());
    assert_eq!(restored.tracks().len(), 2);
    assert_eq!(restored.duration(), timeline.duration());
    assert!(restored.track(second).unwrap().solo);
    assert_eq!(restored.track(second).unwrap().volume, 0.7);

    let original: Vec<_> = timeline.clips().map(|c| (c.id, c.start_time)).collect();
    let reloaded: Vec<_> = restored.clips().map(|c| (c.id, c.start_time)).collect();
    assert_eq!(original, reloaded);

    for clip in timeline.clips() {
        let copy = restored.clip(clip.id).unwrap();
        assert_eq!(copy.duration(), clip.duration());
        assert_eq!(copy.envelope(), clip.envelope());
        assert_eq!(copy.power(2.5), clip.power(2.5));
    }
}

#[test]
fn undecodable_clips_are_reported_on_load() {
    let decoder = decoder();
    let mut timeline = Timeline::headless(config(1000));
    timeline.import_file(Path::new("one.wav"), 0.0, None, &decoder);
    timeline.import_file(Path::new("two.wav"), 0.0, None, &decoder);
    let document = timeline.to_document();

    decoder.remove(Path::new("two.wav"));
    let mut restored = Timeline::headless(config(1000));
    let errors = restored.load_document(&document, &decoder);
    assert_eq!(errors.len(), 1);
    assert_eq!(restored.tracks().len(), 2);
    assert_eq!(restored.clips().count(), 1);
    assert!(restored.last_error().is_some());
}

#[test]
fn undo_redo_across_import_and_edits() {
    let mut timeline = Timeline::headless(config(1000));
    let decoder = decoder();
    let clip = timeline
        .import_file(Path::new("one.wav"), 0.0, None, &decoder)
        .unwrap();
    let target = timeline.add_new_track();
    timeline.move_clip(clip, target);
    timeline.set_clip_start(clip, 4.0);
    assert_eq!(timeline.duration(), 65.0);

    while timeline.undo() {}
    assert!(timeline.tracks().is_empty());
    assert_eq!(timeline.duration(), 60.0);

    while timeline.redo() {}
    let restored = timeline.clip(clip).unwrap();
    assert_eq!(restored.track_id, target);
    assert_eq!(restored.start_time, 4.0);
}
