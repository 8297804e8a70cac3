//! Dispatch-order tests: class rank across queues, epoch order within a
//! class, FIFO tie-break, and allow-list behavior.


use proving_broker::{BrokerConfig, InMemoryJobStore, ProofClass, ProvingBroker};
use test_harness::job;

async fn broker() -> ProvingBroker<InMemoryJobStore> {
    ProvingBroker::start(InMemoryJobStore::new(), BrokerConfig::default())
        .await
        .expect("broker should start on an empty store")
}

#[tokio::test]
async fn higher_ranked_class_wins_over_lower_epoch() {
    let broker = broker().await;
    broker
        .enqueue(job("vm", ProofClass::PublicVm, 5))
        .await
        .unwrap();
    broker
        .enqueue(job("root", ProofClass::BlockRootRollup, 9))
        .await
        .unwrap();

    let first = broker
        .acquire(&ProofClass::ALL)
        .await
        .expect("two jobs are queued");
    assert_eq!(
        first.id.as_str(),
        "root",
        "block-root-rollup outranks public-vm regardless of epoch"
    );
}

#[tokio::test]
async fn lower_epoch_dispatches_first_within_a_class() {
    let broker = broker().await;
    broker
        .enqueue(job("late", ProofClass::MergeRollup, 7))
        .await
        .unwrap();
    broker
        .enqueue(job("early", ProofClass::MergeRollup, 3))
        .await
        .unwrap();

    let allow = [ProofClass::MergeRollup];
    let first = broker.acquire(&allow).await.unwrap();
    let second = broker.acquire(&allow).await.unwrap();
    assert_eq!(first.id.as_str(), "early");
    assert_eq!(second.id.as_str(), "late");
}

#[tokio::test]
async fn equal_epochs_dispatch_fifo() {
    let broker = broker().await;
    for name in ["first", "second", "third"] {
        broker
            .enqueue(job(name, ProofClass::BaseParity, 4))
            .await
            .unwrap();
    }

    let allow = [ProofClass::BaseParity];
    for expected in ["first", "second", "third"] {
        let got = broker.acquire(&allow).await.unwrap();
        assert_eq!(got.id.as_str(), expected, "epoch ties must be FIFO");
    }
}

#[tokio::test]
async fn full_class_rank_is_respected() {
    let broker = broker().await;
    // One job per class, all at the same epoch; dispatch must follow the
    // static preference order exactly.
    for class in ProofClass::ALL {
        broker
            .enqueue(job(&format!("{class}"), class, 1))
            .await
            .unwrap();
    }

    let expected = [
        "block-root-rollup",
        "block-merge-rollup",
        "root-rollup",
        "merge-rollup",
        "public-base-rollup",
        "private-base-rollup",
        "public-vm",
        "tube-proof",
        "root-parity",
        "base-parity",
        "empty-block-root-rollup",
        "private-kernel-empty",
    ];
    for name in expected {
        let got = broker.acquire(&ProofClass::ALL).await.unwrap();
        assert_eq!(got.id.as_str(), name);
    }
    assert!(broker.acquire(&ProofClass::ALL).await.is_none());
}

#[tokio::test]
async fn allow_list_restricts_dispatch() {
    let broker = broker().await;
    broker
        .enqueue(job("root", ProofClass::RootRollup, 1))
        .await
        .unwrap();

    assert!(
        broker.acquire(&[ProofClass::PublicVm]).await.is_none(),
        "a worker that only takes public-vm must not get rollup work"
    );
    assert!(broker.acquire(&[ProofClass::RootRollup]).await.is_some());
}

#[tokio::test]
async fn low_ranked_worker_still_gets_work() {
    let broker = broker().await;
    broker
        .enqueue(job("root", ProofClass::BlockRootRollup, 1))
        .await
        .unwrap();
    broker
        .enqueue(job("parity", ProofClass::BaseParity, 1))
        .await
        .unwrap();

    // A worker that does not accept the higher-ranked class drains the
    // lower-ranked queue.
    let got = broker.acquire(&[ProofClass::BaseParity]).await.unwrap();
    assert_eq!(got.id.as_str(), "parity");
}

#[tokio::test]
async fn acquire_on_empty_queues_returns_none() {
    let broker = broker().await;
    assert!(broker.acquire(&ProofClass::ALL).await.is_none());
    assert!(broker.acquire(&[]).await.is_none());
}

#[tokio::test]
async fn epochs_are_nondecreasing_over_a_monotone_workload() {
    let broker = broker().await;
    // Deliberately shuffled insertion order.
    for (name, epoch) in [("a", 8), ("b", 2), ("c", 5), ("d", 2), ("e", 9), ("f", 1)] {
        broker
            .enqueue(job(name, ProofClass::PublicVm, epoch))
            .await
            .unwrap();
    }

    let mut last = 0;
    while let Some(got) = broker.acquire(&[ProofClass::PublicVm]).await {
        assert!(
            got.epoch >= last,
            "dispatched epoch {} after {}",
            got.epoch,
            last
        );
        last = got.epoch;
    }
}

#[tokio::test]
async fn duplicate_classes_in_allow_list_are_harmless() {
    let broker = broker().await;
    broker
        .enqueue(job("only", ProofClass::TubeProof, 1))
        .await
        .unwrap();

    let allow = [
        ProofClass::TubeProof,
        ProofClass::TubeProof,
        ProofClass::TubeProof,
    ];
    assert!(broker.acquire(&allow).await.is_some());
    assert!(broker.acquire(&allow).await.is_none());
}
