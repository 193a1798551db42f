//! Sync engine decision throughput
//!
//! Every frame the scheduling thread renders passes through one sync
//! decision, so a decision has to be far cheaper than a frame interval.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use playctl::audio::SyncEngine;
use playctl::decoder::MediaKind;
use playctl::player::{is_valid, Command, PlayerState};
use playctl::utils::SyncConfig;
use playctl::TrickPlayDirection;

fn bench_sync_decisions(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_decisions");

    group.bench_function("audio_mastered_video", |b| {
        let mut engine = SyncEngine::new(SyncConfig::default(), true);
        let mut pts = 0i64;
        b.iter(|| {
            engine.update_audio_position_at(pts, pts);
            let decision = engine.decide_at(MediaKind::Video, black_box(pts), pts);
            pts += 40;
            black_box(decision);
        });
    });

    group.bench_function("free_running_audio", |b| {
        let mut engine = SyncEngine::new(SyncConfig::default(), true);
        let mut pts = 0i64;
        b.iter(|| {
            let decision = engine.decide_at(MediaKind::Audio, black_box(pts), pts);
            pts += 20;
            black_box(decision);
        });
    });

    group.bench_function("trick_play_8x", |b| {
        let mut engine = SyncEngine::new(SyncConfig::default(), false);
        engine.set_speed(8.0, TrickPlayDirection::Forward);
        let mut pts = 0i64;
        b.iter(|| {
            let decision = engine.decide_at(MediaKind::Video, black_box(pts), pts / 8);
            pts += 500;
            black_box(decision);
        });
    });

    group.finish();
}

fn bench_command_validation(c: &mut Criterion) {
    c.bench_function("validity_table_sweep", |b| {
        b.iter(|| {
            let mut allowed = 0;
            for command in Command::ALL {
                for state in PlayerState::ALL {
                    allowed += usize::from(is_valid(black_box(command), black_box(state)));
                }
            }
            black_box(allowed);
        });
    });
}

criterion_group!(benches, bench_sync_decisions, bench_command_validation);
criterion_main!(benches);
