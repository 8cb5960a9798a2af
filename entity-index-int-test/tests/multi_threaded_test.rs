use entity_index::errors::ErrorKind;
use entity_index::transaction::EntityReader;
use entity_index_int_test::test_util::{
    add_players, cleanup, create_memory_context, create_test_context, run_test, Player,
};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_auto_commit_writes() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let num_threads = 4;
            let adds_per_thread = 25;
            let barrier = Arc::new(Barrier::new(num_threads));

            let handles: Vec<_> = (0..num_threads)
                .map(|thread_id| {
                    let index = index.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        for i in 0..adds_per_thread {
                            let name = format!("player_{}_{:02}", thread_id, i);
                            index.add(&Player::new(&name)).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let total = (num_threads * adds_per_thread) as i32;
            assert_eq!(index.count()?, total);
            assert_eq!(index.version(), total as u64);
            assert_eq!(index.validate_structure()?.live_entities, total);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_only_one_racing_transaction_commits() {
    run_test(
        create_memory_context,
        |ctx| {
            let index = ctx.index();
            add_players(&index, &["Smyslov"])?;

            let num_threads = 6;
            let barrier = Arc::new(Barrier::new(num_threads));
            let handles: Vec<_> = (0..num_threads)
                .map(|thread_id| {
                    let index = index.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        let mut txn = index.begin_transaction().unwrap();
                        txn.add(&Player::new(&format!("racer_{}", thread_id))).unwrap();
                        barrier.wait();
                        txn.commit().map_err(|e| e.kind().clone())
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let committed = results.iter().filter(|r| r.is_ok()).count();
            let stale = results
                .iter()
                .filter(|r| matches!(r, Err(ErrorKind::StaleTransaction)))
                .count();
            assert_eq!(committed, 1);
            assert_eq!(stale, num_threads - 1);
            assert_eq!(index.count()?, 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_snapshots_are_stable_while_unchanged() {
    run_test(
        create_memory_context,
        |ctx| {
            let index = ctx.index();
            add_players(&index, &["Reshevsky", "Fine", "Flohr"])?;
            let snapshot = index.snapshot()?;

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let snapshot = index.snapshot().unwrap();
                    thread::spawn(move || {
                        let names: Vec<String> = snapshot
                            .iter_ascending()
                            .unwrap()
                            .map(|p| p.unwrap().name)
                            .collect();
                        names
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), vec!["Fine", "Flohr", "Reshevsky"]);
            }

            index.add(&Player::new("Keres"))?;
            let err = snapshot.get(0).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::StaleTransaction);
            Ok(())
        },
        cleanup,
    )
}
