use pomo::clock::{ClockTime, ManualClock};
use pomo::cue::Cue;
use pomo::host::{Host, HostHandle, HostOptions};
use pomo::machine::{Event, Machine};
use pomo::persistence::{
    load_schedule, load_settings, save_settings, KeyValueStore, MemoryStore, SCHEDULE_KEY,
};
use pomo::schedule::PlannedEntry;
use pomo::settings::Settings;
use pomo_ipc::{Mode, Phase, RunState, SettingsPatch};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq)]
enum CueCall {
    Play(Duration, f64),
    Stop,
}

#[derive(Clone, Default)]
struct RecordingCue {
    calls: Arc<Mutex<Vec<CueCall>>>,
}

impl RecordingCue {
    fn calls(&self) -> Vec<CueCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Cue for RecordingCue {
    fn play(&mut self, duration: Duration, volume: f64) {
        self.calls.lock().unwrap().push(CueCall::Play(duration, volume));
    }

    fn stop(&mut self) {
        self.calls.lock().unwrap().push(CueCall::Stop);
    }
}

struct Harness {
    handle: HostHandle,
    task: JoinHandle<()>,
    store: MemoryStore,
    cue: RecordingCue,
    clock: ManualClock,
}

fn spawn_host(store: MemoryStore, auto_start_planned: bool) -> Harness {
    let clock = ManualClock::at("12:00");
    let cue = RecordingCue::default();
    let (host, handle) = Host::new(
        Machine::with_clock(clock.clone()),
        Box::new(store.clone()),
        Box::new(cue.clone()),
        HostOptions {
            notifications: false,
            auto_start_planned,
        },
    );
    Harness {
        handle,
        task: host.spawn(),
        store,
        cue,
        clock,
    }
}

async fn one_minute_work(handle: &HostHandle) {
    handle
        .request(Event::UpdateSettings(SettingsPatch {
            work_duration: Some(1),
            ..Default::default()
        }))
        .await
        .unwrap();
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[tokio::test(start_paused = true)]
async fn ticker_counts_down_and_continues_into_break() {
    let h = spawn_host(MemoryStore::default(), false);
    one_minute_work(&h.handle).await;

    let snap = h.handle.request(Event::StartWork).await.unwrap();
    assert_eq!(snap.state, RunState::Running);
    assert_eq!(snap.timer.remaining_time, 60);

    sleep(secs(30.5)).await;
    assert_eq!(h.handle.snapshot().timer.remaining_time, 30);

    // 30 more ticks reach zero, the next one completes.
    sleep(secs(31.0)).await;
    let snap = h.handle.snapshot();
    assert_eq!(snap.state, RunState::Completed);
    assert_eq!(h.cue.calls(), vec![CueCall::Play(Duration::from_secs(5), 0.5)]);

    // Five seconds later auto-repeat starts the break.
    sleep(secs(5.0)).await;
    let snap = h.handle.snapshot();
    assert_eq!(snap.state, RunState::Running);
    assert_eq!(snap.timer.phase, Phase::Break);
    assert_eq!(snap.timer.remaining_time, 300);
}

#[tokio::test(start_paused = true)]
async fn pause_stops_the_ticker() {
    let h = spawn_host(MemoryStore::default(), false);
    h.handle.request(Event::StartWork).await.unwrap();

    sleep(secs(5.5)).await;
    let snap = h.handle.request(Event::Pause).await.unwrap();
    assert_eq!(snap.timer.remaining_time, 1495);

    sleep(secs(100.0)).await;
    assert_eq!(h.handle.snapshot().timer.remaining_time, 1495);

    h.handle.request(Event::Resume).await.unwrap();
    sleep(secs(2.5)).await;
    assert_eq!(h.handle.snapshot().timer.remaining_time, 1493);
}

#[tokio::test(start_paused = true)]
async fn stop_during_completed_cancels_the_continuation() {
    let h = spawn_host(MemoryStore::default(), false);
    one_minute_work(&h.handle).await;
    h.handle.request(Event::StartWork).await.unwrap();
    sleep(secs(61.5)).await;
    assert_eq!(h.handle.snapshot().state, RunState::Completed);

    let snap = h.handle.request(Event::Stop).await.unwrap();
    assert_eq!(snap.state, RunState::Idle);

    sleep(secs(10.0)).await;
    let snap = h.handle.snapshot();
    assert_eq!(snap.state, RunState::Idle);
    assert_eq!(snap.timer.phase, Phase::Idle);
    assert_eq!(snap.timer.remaining_time, 0);
    assert_eq!(h.cue.calls().last(), Some(&CueCall::Stop));
}

#[tokio::test(start_paused = true)]
async fn changes_are_written_to_the_store() {
    let h = spawn_host(MemoryStore::default(), false);
    h.handle
        .request(Event::UpdateSettings(SettingsPatch {
            work_duration: Some(40),
            auto_repeat: Some(false),
            ..Default::default()
        }))
        .await
        .unwrap();
    let saved = load_settings(&h.store);
    assert_eq!(saved.work_duration, 40);
    assert!(!saved.auto_repeat);

    let entry = PlannedEntry {
        id: "1".to_string(),
        name: "Inbox zero".to_string(),
        start_time: ClockTime::parse("13:00"),
        work_end_time: ClockTime::parse("13:25"),
        break_end_time: ClockTime::parse("13:30"),
    };
    h.handle
        .request(Event::AddPlannedEntry(entry.clone()))
        .await
        .unwrap();
    assert_eq!(load_schedule(&h.store), vec![entry]);
}

#[tokio::test(start_paused = true)]
async fn saved_state_is_restored_on_startup() {
    let mut store = MemoryStore::default();
    let settings = Settings {
        work_duration: 50,
        break_duration: 10,
        auto_repeat: false,
        volume: 0.2,
    };
    save_settings(&mut store, &settings).unwrap();
    store
        .set(
            SCHEDULE_KEY,
            r#"[{"id":"a","name":"","startTime":"08:00","workEndTime":"08:50","breakEndTime":"09:00"}]"#,
        )
        .unwrap();

    let h = spawn_host(store, false);
    let snap = h.handle.snapshot();
    assert_eq!(snap.timer.settings, settings);
    assert_eq!(snap.timer.schedule.len(), 1);
    assert_eq!(snap.state, RunState::Idle);
}

#[tokio::test(start_paused = true)]
async fn planned_schedule_starts_itself_on_time() {
    let h = spawn_host(MemoryStore::default(), true);
    h.clock.set("11:59");
    h.handle
        .request(Event::SwitchMode(Mode::Planned))
        .await
        .unwrap();
    h.handle
        .request(Event::AddPlannedEntry(PlannedEntry {
            id: "1".to_string(),
            name: String::new(),
            start_time: ClockTime::parse("12:00"),
            work_end_time: ClockTime::parse("12:25"),
            break_end_time: ClockTime::parse("12:30"),
        }))
        .await
        .unwrap();

    sleep(secs(10.5)).await;
    assert_eq!(h.handle.snapshot().state, RunState::Idle);

    h.clock.set("12:00");
    sleep(secs(10.0)).await;
    let snap = h.handle.snapshot();
    assert_eq!(snap.state, RunState::Running);
    assert_eq!(snap.timer.current_planned_index(), Some(0));
    assert_eq!(snap.timer.remaining_time, 25 * 60);
}

#[tokio::test(start_paused = true)]
async fn host_stops_when_handles_are_dropped() {
    let h = spawn_host(MemoryStore::default(), true);
    h.handle.request(Event::StartWork).await.unwrap();
    drop(h.handle);
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_cue() {
    let h = spawn_host(MemoryStore::default(), false);
    h.handle.test_cue().await.unwrap();
    h.handle.shutdown().await.unwrap();
    h.task.await.unwrap();
    assert_eq!(
        h.cue.calls(),
        vec![CueCall::Play(Duration::from_secs(1), 0.5), CueCall::Stop]
    );
}
