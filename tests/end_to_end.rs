//! Whole-stream scenarios driven through the public API

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use oxilink::store::{CsvStore, MemoryStore};
use oxilink::{FrameLayout, Monitor, MonitorConfig, Oxilink, RawPacket, UpdateRate};
use tokio::sync::mpsc;

fn layout() -> FrameLayout {
    FrameLayout::builder().channel("pleth", 5..15).vitals(16, 17).build().unwrap()
}

fn config() -> MonitorConfig {
    MonitorConfig { layout: layout(), flush_interval_ms: 100, ..MonitorConfig::default() }
}

fn frame(spo2: u8, pulse: u8) -> Vec<RawPacket> {
    vec![
        RawPacket::from([170, 1, 1, 1, 1]),
        RawPacket::from([9, 9, 9, 9, 9]),
        RawPacket::from([9, 9, 9, 9, 9]),
        RawPacket::from([0, spo2, pulse]),
    ]
}

async fn send(tx: &mpsc::Sender<RawPacket>, packets: Vec<RawPacket>) {
    for packet in packets {
        tx.send(packet).await.unwrap();
    }
}

async fn wait_for_records(monitor: &Monitor, records: u64) {
    while monitor.stats().pipeline.records < records {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn four_segments_decode_into_one_record() {
    let _ = tracing_subscriber::fmt::try_init();

    let (tx, rx) = mpsc::channel(16);
    let store = Arc::new(MemoryStore::new());
    let monitor = Oxilink::attach(rx, Arc::clone(&store), config()).await.unwrap();
    let mut session = monitor.join("bedside");
    assert!(session.replay.is_empty());

    send(&tx, frame(98, 72)).await;

    let record = session.feed.recv().await.unwrap();
    assert_eq!(record.frame_index, 0);
    let pleth = record.channel("pleth").unwrap();
    assert_eq!(pleth.values.len(), 10);
    assert_eq!(pleth.start_index, 0);
    let vitals = record.vitals.unwrap();
    assert_eq!((vitals.spo2, vitals.pulse, vitals.valid), (98, 72, true));

    let report = monitor.shutdown().await.unwrap();
    assert_eq!(report.pipeline.records, 1);
    assert_eq!(report.records_written(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn noise_and_abandoned_frames_are_counted_not_emitted() {
    let (tx, rx) = mpsc::channel(32);
    let monitor = Oxilink::attach(rx, MemoryStore::new(), config()).await.unwrap();
    let mut session = monitor.join("bedside");

    // noise before any marker
    send(&tx, vec![RawPacket::from([1, 2, 3])]).await;
    // a marker with one continuation, then a restart
    send(&tx, vec![RawPacket::from([170, 0, 0, 0, 0]), RawPacket::from([5, 5, 5, 5, 5])]).await;
    send(&tx, frame(0, 72)).await;

    let record = session.feed.recv().await.unwrap();
    assert_eq!(record.frame_index, 0);
    assert!(!record.vitals.unwrap().valid, "SpO2 of zero is a sentinel");

    let stats = monitor.stats().pipeline;
    assert_eq!(stats.ignored_packets, 1);
    assert_eq!(stats.frames_abandoned, 1);
    assert_eq!(stats.records, 1);
    assert_eq!(stats.invalid_vitals, 1);
}

#[tokio::test(start_paused = true)]
async fn late_joiner_gets_backlog_then_every_live_record_once() {
    let (tx, rx) = mpsc::channel(64);
    let config = MonitorConfig { replay_capacity: 3, ..config() };
    let monitor = Oxilink::attach(rx, MemoryStore::new(), config).await.unwrap();
    let early = monitor.join("early");

    for i in 0..5 {
        send(&tx, frame(90 + i, 60)).await;
    }
    wait_for_records(&monitor, 5).await;
    // the early session's feed shows when the distributor caught up
    while early.feed.queued() < 5 {
        tokio::task::yield_now().await;
    }

    let mut late = monitor.join("late");
    let backlog: Vec<_> = late.replay.iter().map(|r| r.frame_index).collect();
    assert_eq!(backlog, vec![2, 3, 4]);

    for i in 5..8 {
        send(&tx, frame(90 + i, 60)).await;
    }
    for expected in 5..8 {
        assert_eq!(late.feed.recv().await.unwrap().frame_index, expected);
    }
    assert!(late.feed.try_recv().is_none());

    // waveform indices keep counting across frames
    let last = late.replay.last().unwrap().channel("pleth").unwrap();
    assert_eq!(last.start_index, 40);
}

#[tokio::test(start_paused = true)]
async fn store_outage_loses_nothing_and_duplicates_nothing() {
    let (tx, rx) = mpsc::channel(64);
    let store = Arc::new(MemoryStore::new());
    store.fail_next(2);
    let monitor = Oxilink::attach(rx, Arc::clone(&store), config()).await.unwrap();

    for i in 0..6 {
        send(&tx, frame(95, 60 + i)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    let report = monitor.shutdown().await.unwrap();
    assert_eq!(store.frame_indices(), (0..6u64).collect::<Vec<_>>());
    assert_eq!(report.writer.stats.failed_flushes, 2);
    assert_eq!(report.unflushed(), 0);
}

#[tokio::test]
async fn immediate_shutdown_persists_every_sent_frame() {
    let (tx, rx) = mpsc::channel(64);
    let store = Arc::new(MemoryStore::new());
    let monitor = Oxilink::attach(rx, Arc::clone(&store), config()).await.unwrap();

    for i in 0..5 {
        send(&tx, frame(95, 60 + i)).await;
    }
    // a trailing half frame is reported, not silently lost
    send(&tx, frame(95, 70).into_iter().take(3).collect()).await;

    let report = monitor.shutdown().await.unwrap();
    assert_eq!(report.pipeline.records, 5);
    assert_eq!(report.pipeline.frames_abandoned, 1);
    assert_eq!(report.records_written(), 5);
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn capture_replay_lands_in_csv_files() {
    let mut capture = tempfile::NamedTempFile::new().unwrap();
    writeln!(capture, "# two frames").unwrap();
    for spo2 in [97, 96] {
        writeln!(capture, "170 1 1 1 1").unwrap();
        writeln!(capture, "9 9 9 9 9").unwrap();
        writeln!(capture, "9 9 9 9 9").unwrap();
        writeln!(capture, "0 {} 70", spo2).unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();
    let monitor = Oxilink::replay(capture.path(), store.clone(), config()).await.unwrap();

    // the vitals stream ends when the capture is exhausted
    let readings: Vec<_> = monitor.vitals(UpdateRate::EveryFrame).collect().await;
    assert!(readings.last().is_some_and(|v| v.spo2 == 96));

    let report = monitor.shutdown().await.unwrap();
    assert_eq!(report.records_written(), 2);

    let vitals = std::fs::read_to_string(store.vitals_path()).unwrap();
    assert_eq!(vitals.lines().count(), 3);
    let waveform = std::fs::read_to_string(store.waveform_path()).unwrap();
    assert_eq!(waveform.lines().count(), 1 + 20);
}

#[tokio::test]
async fn yaml_config_drives_the_monitor() {
    let yaml = r#"
start_marker: 170
segments_per_frame: 4
flush_interval_ms: 50
replay_capacity: 10
layout:
  channels:
    - name: pleth
      ranges: [{ start: 5, end: 15 }]
  vitals:
    spo2_offset: 16
    pulse_offset: 17
"#;
    let config = MonitorConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.layout, layout());

    let (tx, rx) = mpsc::channel(16);
    let monitor = Oxilink::attach(rx, MemoryStore::new(), config).await.unwrap();
    send(&tx, frame(98, 72)).await;
    wait_for_records(&monitor, 1).await;

    let report = monitor.shutdown().await.unwrap();
    assert_eq!(report.pipeline.records, 1);
    assert_eq!(report.records_written(), 1);
}
