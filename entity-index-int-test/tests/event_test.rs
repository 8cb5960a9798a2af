use entity_index::entity_index::EntityIndex;
use entity_index::store::file::FileStoreModule;
use entity_index::store::{StoreEventInfo, StoreEventListener, StoreEvents};
use entity_index_int_test::test_util::{random_path, remove_file, Player, PlayerSerializer};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn wait_for_event<F: Fn() -> bool>(timeout_ms: u64, check: F) {
    awaitility::at_most(Duration::from_millis(timeout_ms)).until(check);
}

fn recording_listener(events: Arc<Mutex<Vec<StoreEvents>>>) -> StoreEventListener {
    StoreEventListener::new(move |info: StoreEventInfo| {
        events.lock().unwrap().push(info.event());
        Ok(())
    })
}

#[test]
fn test_lifecycle_events_of_file_index() {
    let path = random_path();
    let events = Arc::new(Mutex::new(Vec::new()));
    let index = EntityIndex::builder(PlayerSerializer)
        .load_module(
            FileStoreModule::with_config()
                .file_path(&path)
                .add_event_listener(recording_listener(events.clone()))
                .build(),
        )
        .open_or_create()
        .unwrap();

    index.add(&Player::new("Karpov")).unwrap();
    wait_for_event(1000, || events.lock().unwrap().contains(&StoreEvents::Commit));

    index.close().unwrap();
    wait_for_event(1000, || events.lock().unwrap().contains(&StoreEvents::Closed));
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            StoreEvents::Open,
            StoreEvents::Commit,
            StoreEvents::Closing,
            StoreEvents::Closed
        ]
    );
    remove_file(&path);
}

#[test]
fn test_subscriber_sees_commits_until_unsubscribed() {
    let index = EntityIndex::builder(PlayerSerializer).open_or_create().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = index.subscribe(recording_listener(events.clone())).unwrap();

    let mut txn = index.begin_transaction().unwrap();
    txn.add(&Player::new("Korchnoi")).unwrap();
    txn.add(&Player::new("Polugaevsky")).unwrap();
    txn.commit().unwrap();
    wait_for_event(1000, || events.lock().unwrap().len() == 1);

    index.unsubscribe(subscriber).unwrap();
    index.add(&Player::new("Geller")).unwrap();
    assert_eq!(*events.lock().unwrap(), vec![StoreEvents::Commit]);
}

#[test]
fn test_listener_can_read_committed_state() {
    let index = EntityIndex::builder(PlayerSerializer).open_or_create().unwrap();
    let counts = Arc::new(Mutex::new(Vec::new()));

    let reader = index.clone();
    let seen = counts.clone();
    index
        .subscribe(StoreEventListener::new(move |info: StoreEventInfo| {
            if info.event() == StoreEvents::Commit {
                seen.lock().unwrap().push(reader.count()?);
            }
            Ok(())
        }))
        .unwrap();

    index.add(&Player::new("Bronstein")).unwrap();
    index.add(&Player::new("Keres")).unwrap();
    wait_for_event(1000, || counts.lock().unwrap().len() == 2);
    assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
}
