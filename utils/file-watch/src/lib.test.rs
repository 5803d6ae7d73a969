use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio::time::advance;

use super::*;

#[tokio::test(start_paused = true)]
async fn test_burst_collapses_into_one_trigger() {
    let mut pending: DebouncedKeys<String> = DebouncedKeys::new(Duration::from_millis(500));

    // Three rapid events against the same key.
    pending.touch("safety".to_string(), Instant::now());
    advance(Duration::from_millis(50)).await;
    pending.touch("safety".to_string(), Instant::now());
    advance(Duration::from_millis(50)).await;
    pending.touch("safety".to_string(), Instant::now());

    // Not ready until the quiet window elapses after the last touch.
    advance(Duration::from_millis(400)).await;
    assert_eq!(pending.take_ready(Instant::now()), Vec::<String>::new());

    advance(Duration::from_millis(101)).await;
    assert_eq!(pending.take_ready(Instant::now()), vec!["safety".to_string()]);
    assert!(pending.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_touch_resets_the_window() {
    let mut pending: DebouncedKeys<String> = DebouncedKeys::new(Duration::from_millis(500));

    pending.touch("m".to_string(), Instant::now());
    advance(Duration::from_millis(499)).await;
    pending.touch("m".to_string(), Instant::now());
    advance(Duration::from_millis(499)).await;

    // Still quiet-window-pending after ~1s of wall time.
    assert!(pending.take_ready(Instant::now()).is_empty());
    advance(Duration::from_millis(2)).await;
    assert_eq!(pending.take_ready(Instant::now()), vec!["m".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_keys_debounce_independently() {
    let mut pending: DebouncedKeys<String> = DebouncedKeys::new(Duration::from_millis(500));

    pending.touch("a".to_string(), Instant::now());
    advance(Duration::from_millis(300)).await;
    pending.touch("b".to_string(), Instant::now());
    advance(Duration::from_millis(201)).await;

    // Only "a" has been quiet long enough.
    assert_eq!(pending.take_ready(Instant::now()), vec!["a".to_string()]);
    advance(Duration::from_millis(300)).await;
    assert_eq!(pending.take_ready(Instant::now()), vec!["b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_next_deadline_is_earliest() {
    let mut pending: DebouncedKeys<&'static str> = DebouncedKeys::new(Duration::from_millis(500));
    assert!(pending.next_deadline().is_none());

    let start = Instant::now();
    pending.touch("a", start);
    advance(Duration::from_millis(100)).await;
    pending.touch("b", Instant::now());

    assert_eq!(
        pending.next_deadline(),
        Some(start + Duration::from_millis(500))
    );
}

#[test]
fn test_take_pending_drains_everything() {
    let mut pending: DebouncedKeys<&'static str> = DebouncedKeys::new(Duration::from_secs(1));
    let now = Instant::now();
    pending.touch("a", now);
    pending.touch("b", now);

    let mut drained = pending.take_pending();
    drained.sort_unstable();
    assert_eq!(drained, vec!["a", "b"]);
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_noop_watcher_is_inert() {
    let watcher: KeyedWatcher<String> = KeyedWatcherBuilder::new().build_noop();
    watcher.watch(PathBuf::from("/nonexistent"), RecursiveMode::Recursive);
    watcher.unwatch(Path::new("/nonexistent"));

    let mut rx = watcher.subscribe();
    let result = tokio::time::timeout(Duration::from_millis(10), rx.recv()).await;
    assert!(result.is_err(), "noop watcher should never fire");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_live_watcher_attributes_events_to_top_level_dir() {
    let root = tempfile::tempdir().expect("tempdir");
    let module_dir = root.path().join("safety");
    std::fs::create_dir(&module_dir).expect("create module dir");

    let root_path = root.path().to_path_buf();
    let watcher: KeyedWatcher<String> = KeyedWatcherBuilder::new()
        .debounce_window(Duration::from_millis(100))
        .build(move |event: &notify::Event| {
            event
                .paths
                .iter()
                .filter_map(|p| {
                    let rel = p.strip_prefix(&root_path).ok()?;
                    Some(
                        rel.components()
                            .next()?
                            .as_os_str()
                            .to_string_lossy()
                            .into_owned(),
                    )
                })
                .collect()
        })
        .expect("build watcher");

    let mut rx = watcher.subscribe();
    watcher.watch(root.path().to_path_buf(), RecursiveMode::Recursive);

    // Several writes inside the same module directory.
    std::fs::write(module_dir.join("module.json"), b"{}").expect("write");
    std::fs::write(module_dir.join("notes.txt"), b"x").expect("write");

    let key = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("watcher should fire")
        .expect("channel open");
    assert_eq!(key, "safety");
}
