//! End-to-end runs of the staged output protocol on a local store.

use std::io::{Read, Write};
use std::sync::Arc;

use tessera_config::testing::TestEnvironment;
use tessera_config::{Config, MoverConfig};
use tessera_output::{
    AttemptContext, CommitMarkerStore, DataSourceRepository, StagedOutput, TransactionContext,
    TransactionRecoveryCoordinator,
};
use tessera_store::{ByteCounter, CancelToken, FileStore, LocalStore};

fn repository(config: &Config) -> Arc<DataSourceRepository> {
    let store: Arc<dyn FileStore> = Arc::new(LocalStore::new());
    Arc::new(DataSourceRepository::from_config(config, store).unwrap())
}

fn write_output(out: &StagedOutput, ctx: &AttemptContext, resource: &str, content: &[u8]) {
    let mut stream = out.open_output(ctx, "result", resource).unwrap();
    stream.write_all(content).unwrap();
    stream.flush().unwrap();
}

#[test]
fn test_full_transaction_with_staging() {
    let env = TestEnvironment::new().unwrap();
    let config = env.config(&["alpha"]);
    let repo = repository(&config);
    let out = repo.related_data_source("alpha/result").unwrap();

    let counter = Arc::new(ByteCounter::new());
    let tx = TransactionContext::new("ex1", "alpha").with_counter(counter.clone());
    out.setup_transaction(&tx).unwrap();

    let attempt = AttemptContext::new("ex1", "a0", "alpha").with_counter(counter.clone());
    out.setup_attempt(&attempt).unwrap();
    write_output(&out, &attempt, "part-0.csv", b"1,2,3\n");
    write_output(&out, &attempt, "nested/part-1.csv", b"4,5\n");
    assert_eq!(counter.get(), 10);

    let stats = out.commit_attempt(&attempt).unwrap();
    assert_eq!(stats.files, 2);
    // moves are reported through MoveStats, not the payload counter
    assert_eq!(counter.get(), 10);
    out.cleanup_attempt(&attempt).unwrap();

    // staged, not yet visible
    let production = env.production("alpha");
    assert_eq!(env.count_files(&production), 0);
    assert_eq!(env.count_files(&out.staging_dir(&tx).unwrap()), 2);

    let stats = out.commit_transaction(&tx).unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.bytes, 10);
    assert_eq!(counter.get(), 10);
    out.cleanup_transaction(&tx).unwrap();

    assert_eq!(
        std::fs::read(production.join("result/part-0.csv")).unwrap(),
        b"1,2,3\n"
    );
    assert!(production.join("result/nested/part-1.csv").exists());
    assert!(!out.transaction_dir("ex1", "alpha").unwrap().exists());
}

#[test]
fn test_attempt_goes_straight_to_production_without_staging() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config(&["alpha"]);
    config.datasources[0].output_staging = false;
    let repo = repository(&config);
    let out = repo.related_data_source("alpha").unwrap();

    let tx = TransactionContext::new("ex1", "alpha");
    out.setup_transaction(&tx).unwrap();
    let attempt = AttemptContext::new("ex1", "a0", "alpha");
    out.setup_attempt(&attempt).unwrap();
    write_output(&out, &attempt, "part-0", b"x");
    out.commit_attempt(&attempt).unwrap();

    assert!(env.production("alpha").join("result/part-0").exists());
    assert_eq!(out.commit_transaction(&tx).unwrap().files, 0);
    out.cleanup_transaction(&tx).unwrap();
}

#[test]
fn test_failed_attempt_leaves_no_trace() {
    let env = TestEnvironment::new().unwrap();
    let config = env.config(&["alpha"]);
    let repo = repository(&config);
    let out = repo.related_data_source("alpha").unwrap();

    let tx = TransactionContext::new("ex1", "alpha");
    out.setup_transaction(&tx).unwrap();
    let failed = AttemptContext::new("ex1", "a0", "alpha");
    out.setup_attempt(&failed).unwrap();
    write_output(&out, &failed, "part-0", b"broken");
    out.cleanup_attempt(&failed).unwrap();

    let retry = AttemptContext::new("ex1", "a1", "alpha");
    out.setup_attempt(&retry).unwrap();
    write_output(&out, &retry, "part-0", b"good");
    out.commit_attempt(&retry).unwrap();
    out.commit_transaction(&tx).unwrap();
    out.cleanup_transaction(&tx).unwrap();

    let production = env.production("alpha");
    assert_eq!(std::fs::read(production.join("result/part-0")).unwrap(), b"good");
    assert_eq!(env.count_files(&production), 1);
}

#[test]
fn test_commit_transaction_is_repeatable() {
    let env = TestEnvironment::new().unwrap();
    let repo = repository(&env.config(&["alpha"]));
    let out = repo.related_data_source("alpha").unwrap();

    let tx = TransactionContext::new("ex1", "alpha");
    out.setup_transaction(&tx).unwrap();
    let attempt = tx_attempt(&out, "a0");
    write_output(&out, &attempt, "part-0", b"x");
    out.commit_attempt(&attempt).unwrap();

    assert_eq!(out.commit_transaction(&tx).unwrap().files, 1);
    assert_eq!(out.commit_transaction(&tx).unwrap().files, 0);
    out.cleanup_transaction(&tx).unwrap();
    out.cleanup_transaction(&tx).unwrap();
    assert_eq!(out.commit_transaction(&tx).unwrap().files, 0);
    assert!(env.production("alpha").join("result/part-0").exists());
}

fn tx_attempt(out: &StagedOutput, attempt_id: &str) -> AttemptContext {
    let ctx = AttemptContext::new("ex1", attempt_id, "alpha");
    out.setup_attempt(&ctx).unwrap();
    ctx
}

#[test]
fn test_commit_replaces_existing_production_files() {
    let env = TestEnvironment::new().unwrap();
    let production = env.production("alpha");
    env.create_file(&production, "result/part-0", b"old").unwrap();
    env.create_file(&production, "result/keep", b"kept").unwrap();

    let repo = repository(&env.config(&["alpha"]));
    let out = repo.related_data_source("alpha").unwrap();
    let tx = TransactionContext::new("ex1", "alpha");
    out.setup_transaction(&tx).unwrap();
    let attempt = tx_attempt(&out, "a0");
    write_output(&out, &attempt, "part-0", b"new");
    out.commit_attempt(&attempt).unwrap();
    out.commit_transaction(&tx).unwrap();

    assert_eq!(std::fs::read(production.join("result/part-0")).unwrap(), b"new");
    assert_eq!(std::fs::read(production.join("result/keep")).unwrap(), b"kept");
}

#[test]
fn test_parallel_commit_from_config() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config(&["alpha"]);
    config.mover = MoverConfig { threads: Some(3) };
    let repo = repository(&config);
    let out = repo.related_data_source("alpha").unwrap();
    assert_eq!(out.profile().move_threads, 3);

    let tx = TransactionContext::new("ex1", "alpha");
    out.setup_transaction(&tx).unwrap();
    let attempt = tx_attempt(&out, "a0");
    for i in 0..40 {
        write_output(&out, &attempt, &format!("d{}/part-{}", i % 5, i), b"row\n");
    }
    assert_eq!(out.commit_attempt(&attempt).unwrap().files, 40);
    let stats = out.commit_transaction(&tx).unwrap();
    assert_eq!(stats.files, 40);
    assert_eq!(stats.bytes, 160);
    assert_eq!(env.count_files(&env.production("alpha")), 40);
}

#[test]
fn test_inputs_are_read_back_through_fragments() {
    let env = TestEnvironment::new().unwrap();
    let production = env.production("alpha");
    env.create_file(&production, "in/a.txt", b"hello ").unwrap();
    env.create_file(&production, "in/b.txt", b"world").unwrap();
    env.create_file(&production, "other/c.txt", b"skip").unwrap();

    let repo = repository(&env.config(&["alpha"]));
    let out = repo.related_data_source("alpha").unwrap();
    let fragments = out.find_input_fragments("in").unwrap();
    assert_eq!(fragments.len(), 2);

    let counter = Arc::new(ByteCounter::new());
    let mut text = String::new();
    for fragment in &fragments {
        out.open_input(fragment, counter.clone(), CancelToken::new())
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
    }
    assert_eq!(text, "hello world");
    assert_eq!(counter.get(), 11);
}

#[test]
fn test_list_and_delete_production() {
    let env = TestEnvironment::new().unwrap();
    let production = env.production("alpha");
    env.create_file(&production, "x/1", b"1").unwrap();
    env.create_file(&production, "x/y/2", b"2").unwrap();

    let repo = repository(&env.config(&["alpha"]));
    let out = repo.related_data_source("alpha").unwrap();

    let counter = ByteCounter::new();
    let entries = out.list("x", &counter).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(counter.get(), 3);

    assert!(out.delete("x", true, &ByteCounter::new()).unwrap());
    assert!(out.list("x", &ByteCounter::new()).unwrap().is_empty());
}

#[test]
fn test_recovery_applies_committed_transaction() {
    let env = TestEnvironment::new().unwrap();
    let config = env.config(&["alpha", "beta"]);
    let store: Arc<dyn FileStore> = Arc::new(LocalStore::new());
    let repo = Arc::new(DataSourceRepository::from_config(&config, Arc::clone(&store)).unwrap());
    let markers = CommitMarkerStore::from_config(&config, store);

    markers
        .create("ex1", &["batch=daily".to_string()])
        .unwrap();
    for id in ["alpha", "beta"] {
        let out = repo.related_data_source(id).unwrap();
        out.setup_transaction(&TransactionContext::new("ex1", id)).unwrap();
        let attempt = AttemptContext::new("ex1", "a0", id);
        out.setup_attempt(&attempt).unwrap();
        write_output(&out, &attempt, "part-0", id.as_bytes());
        out.commit_attempt(&attempt).unwrap();
    }

    // crash here: the driver never committed the transaction
    let coordinator = TransactionRecoveryCoordinator::new(Arc::clone(&repo), markers);
    let in_doubt = coordinator.list_in_doubt().unwrap();
    assert_eq!(in_doubt.len(), 1);
    assert_eq!(in_doubt[0].comment, vec!["batch=daily"]);

    assert!(coordinator.apply("ex1").unwrap());
    for id in ["alpha", "beta"] {
        let file = env.production(id).join("result/part-0");
        assert_eq!(std::fs::read(file).unwrap(), id.as_bytes());
        assert_eq!(env.count_files(&env.temporary(id)), 0);
    }
    assert!(coordinator.list_in_doubt().unwrap().is_empty());
    assert!(!coordinator.apply("ex1").unwrap());
}
