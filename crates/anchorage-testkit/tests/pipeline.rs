//! End-to-end pipeline behaviour against in-memory backends.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use anchorage::{
    FailureKind, PipelineConfig, PipelineError, PipelineState, RejectReason,
};
use anchorage_core::{payload_digest, DeviceId, DevicePublicKey};
use anchorage_ledger::LedgerError;
use anchorage_store::StoreError;
use anchorage_testkit::{fast_settings, object, reference_payload, PipelineFixture, TestDevice};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn enrolled_fixture() -> (PipelineFixture, TestDevice) {
    init_tracing();
    let fixture = PipelineFixture::new();
    let device = TestDevice::with_seed("IOT-AB12CD34", [0x11; 32]);
    fixture.enroll(&device).await;
    (fixture, device)
}

#[tokio::test]
async fn reference_payload_is_anchored_and_retrievable() {
    let (fixture, device) = enrolled_fixture().await;
    let data = reference_payload();

    let result = fixture
        .pipeline
        .submit(&device.id, &data, &device.sign(&data))
        .await
        .unwrap();

    assert_eq!(result.device_id.as_str(), "IOT-AB12CD34");
    assert!(!result.cid.is_empty());
    let tx_hash = result.tx_hash.to_hex();
    assert_eq!(tx_hash.len(), 66);
    assert!(tx_hash.starts_with("0x"));

    assert_eq!(fixture.pipeline.get_commitment(0).await.unwrap(), result.cid);

    let commitment = &fixture.ledger.commitments().await[0];
    assert_eq!(&commitment.data_hash, payload_digest(&data).as_bytes());
    assert_eq!(commitment.tx_hash, result.tx_hash);
}

#[tokio::test]
async fn truncated_signature_never_reaches_storage() {
    let (fixture, device) = enrolled_fixture().await;
    let data = reference_payload();
    let signature = device.sign(&data);
    let truncated = &signature[..signature.len() / 2];

    let err = fixture
        .pipeline
        .submit(&device.id, &data, truncated)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Signature(_)));
    assert_eq!(fixture.store.puts(), 0);
    assert!(fixture.ledger.accepted().await.is_empty());
}

#[tokio::test]
async fn unregistered_device_short_circuits() {
    let (fixture, device) = enrolled_fixture().await;
    let stranger = TestDevice::new("IOT-99999999");
    let data = reference_payload();

    let err = fixture
        .pipeline
        .submit(&stranger.id, &data, &stranger.sign(&data))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Authentication(ref id) if id == &stranger.id));
    assert_eq!(
        err.outcome(),
        Some(PipelineState::Rejected(RejectReason::Unregistered))
    );
    assert_eq!(fixture.store.puts(), 0);
    assert!(fixture.ledger.accepted().await.is_empty());

    // A signature by a registered device does not authenticate someone else.
    let err = fixture
        .pipeline
        .submit(&stranger.id, &data, &device.sign(&data))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Authentication(_)));
}

#[tokio::test]
async fn resubmission_is_not_deduplicated() {
    let (fixture, device) = enrolled_fixture().await;
    let data = reference_payload();
    let signature = device.sign(&data);

    let first = fixture.pipeline.submit(&device.id, &data, &signature).await.unwrap();
    let second = fixture.pipeline.submit(&device.id, &data, &signature).await.unwrap();

    assert_ne!(first.cid, second.cid);
    assert_ne!(first.tx_hash, second.tx_hash);
    assert_eq!(first.data_hash, second.data_hash);
    assert_eq!(fixture.ledger.commitments().await.len(), 2);
    assert_eq!(fixture.pipeline.get_commitment(1).await.unwrap(), second.cid);
}

#[tokio::test]
async fn tampered_payload_rejected() {
    let (fixture, device) = enrolled_fixture().await;
    let signature = device.sign(&reference_payload());
    let tampered = object(json!({"temperature": 99.9, "humidity": 60, "timestamp": 1716000000}));

    let err = fixture
        .pipeline
        .submit(&device.id, &tampered, &signature)
        .await
        .unwrap_err();
    assert_eq!(
        err.outcome(),
        Some(PipelineState::Rejected(RejectReason::BadSignature))
    );
    assert_eq!(fixture.store.puts(), 0);
}

#[tokio::test]
async fn key_rotation_invalidates_old_signatures() {
    let (fixture, device) = enrolled_fixture().await;
    let data = reference_payload();
    let old_signature = device.sign(&data);

    let rotated = TestDevice::with_seed("IOT-AB12CD34", [0x22; 32]);
    fixture.enroll(&rotated).await;

    let err = fixture
        .pipeline
        .submit(&device.id, &data, &old_signature)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Signature(_)));

    fixture
        .pipeline
        .submit(&rotated.id, &data, &rotated.sign(&data))
        .await
        .unwrap();
}

#[tokio::test]
async fn storage_outage_is_classified_and_skips_ledger() {
    let (fixture, device) = enrolled_fixture().await;
    fixture.store.set_offline(true);
    let data = reference_payload();

    let err = fixture
        .pipeline
        .submit(&device.id, &data, &device.sign(&data))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Storage(StoreError::Unavailable(_))));
    assert_eq!(err.outcome(), Some(PipelineState::Failed(FailureKind::Storage)));
    assert!(fixture.ledger.accepted().await.is_empty());
}

#[tokio::test]
async fn reverted_anchor_leaves_orphaned_content() {
    let (fixture, device) = enrolled_fixture().await;
    fixture.ledger.set_revert(true);
    let data = reference_payload();

    let err = fixture
        .pipeline
        .submit(&device.id, &data, &device.sign(&data))
        .await
        .unwrap_err();

    match &err {
        PipelineError::Ledger {
            orphaned_cid: Some(cid),
            source: LedgerError::Reverted { .. },
        } => {
            let stored = fixture.pipeline.content().fetch(cid).await.unwrap();
            assert_eq!(stored.data, data);
        }
        other => panic!("expected reverted ledger error, got {other:?}"),
    }
    assert_eq!(err.outcome(), Some(PipelineState::Failed(FailureKind::Ledger)));
    assert_eq!(fixture.store.puts(), 1);
    assert!(fixture.ledger.commitments().await.is_empty());
}

#[tokio::test]
async fn receipt_timeout_is_classified() {
    let (fixture, device) = enrolled_fixture().await;
    fixture.ledger.set_withhold_receipts(true);
    let data = reference_payload();

    let err = fixture
        .pipeline
        .submit(&device.id, &data, &device.sign(&data))
        .await
        .unwrap_err();

    match err {
        PipelineError::Ledger {
            orphaned_cid: Some(_),
            source: LedgerError::Timeout { waited, .. },
        } => assert_eq!(waited, fast_settings().receipt_timeout),
        other => panic!("expected ledger timeout, got {other:?}"),
    }

    // The transaction was accepted; once mined, the commitment is readable.
    fixture.ledger.release_receipts().await;
    assert_eq!(fixture.ledger.accepted().await.len(), 1);
}

#[tokio::test]
async fn ledger_outage_is_connection_failure() {
    let (fixture, device) = enrolled_fixture().await;
    fixture.ledger.set_offline(true);
    let data = reference_payload();

    let err = fixture
        .pipeline
        .submit(&device.id, &data, &device.sign(&data))
        .await
        .unwrap_err();

    match &err {
        PipelineError::Ledger { source, .. } => assert_eq!(source.reason(), "connection"),
        other => panic!("expected ledger error, got {other:?}"),
    }
    assert!(err.orphaned_cid().is_some());
}

#[tokio::test]
async fn verify_commitment_detects_digest() {
    let (fixture, device) = enrolled_fixture().await;
    let data = reference_payload();
    let result = fixture
        .pipeline
        .submit(&device.id, &data, &device.sign(&data))
        .await
        .unwrap();

    let report = fixture.pipeline.verify_commitment(0).await.unwrap();
    assert_eq!(report.cid, result.cid);
    assert!(report.matches(&result.data_hash));
    assert_eq!(fixture.store.gets(), 1);
}

#[tokio::test]
async fn unknown_commitment_index() {
    let (fixture, _) = enrolled_fixture().await;
    let err = fixture.pipeline.get_commitment(7).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Ledger {
            source: LedgerError::CommitmentNotFound(7),
            ..
        }
    ));
}

#[tokio::test]
async fn registration_rejects_empty_key_and_enforces_prefix() {
    init_tracing();
    let fixture = PipelineFixture::with_config(
        PipelineConfig {
            device_id_prefix: Some("IOT-".into()),
            ..PipelineConfig::default()
        },
        fast_settings(),
    );

    let err = fixture
        .pipeline
        .register_device(
            &DeviceId::new("IOT-EMPTYKEY").unwrap(),
            &DevicePublicKey::from_bytes(Vec::new()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));

    let outsider = TestDevice::new("thermo-7");
    let err = fixture
        .pipeline
        .register_device(&outsider.id, &outsider.public_key())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_all_anchor() {
    const DEVICES: usize = 8;
    const PER_DEVICE: usize = 3;

    init_tracing();
    let fixture = Arc::new(PipelineFixture::new());
    let devices: Vec<_> = (0..DEVICES)
        .map(|i| TestDevice::with_seed(&format!("IOT-{i:08}"), [i as u8 + 1; 32]))
        .collect();
    for device in &devices {
        fixture.enroll(device).await;
    }

    let mut handles = Vec::new();
    for device in devices {
        for n in 0..PER_DEVICE {
            let fixture = fixture.clone();
            let device = device.clone();
            handles.push(tokio::spawn(async move {
                let data = object(json!({"reading": n, "device": device.id.as_str()}));
                fixture
                    .pipeline
                    .submit(&device.id, &data, &device.sign(&data))
                    .await
            }));
        }
    }

    let mut tx_hashes = HashSet::new();
    let mut cids = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(tx_hashes.insert(result.tx_hash));
        assert!(cids.insert(result.cid));
    }

    // Index order is the node's; every result is still found by cid.
    let mut anchored = HashSet::new();
    for index in 0..(DEVICES * PER_DEVICE) as u64 {
        anchored.insert(fixture.pipeline.get_commitment(index).await.unwrap());
    }
    assert_eq!(anchored, cids);

    let accepted = fixture.ledger.accepted().await;
    assert_eq!(accepted.len(), DEVICES * PER_DEVICE);
    let nonces: HashSet<u64> = accepted.iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, (0..(DEVICES * PER_DEVICE) as u64).collect());
}
