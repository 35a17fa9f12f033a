//! Concurrency and thread safety tests for FaceAuth

use std::sync::Arc;
use std::thread;

use faceauth::{AuthConfig, AuthDecision, FaceAuthService, IndexConfig, LivenessResult};

const DIM: usize = 64;

fn one_hot(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

#[test]
fn concurrent_enrollments_on_distinct_wallets_all_land() {
    let service = Arc::new(
        FaceAuthService::in_memory(
            IndexConfig::new().with_dimension(DIM),
            AuthConfig::default(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service
                    .enroll(&format!("0xwallet{i}"), &one_hot(i))
                    .expect("enroll should succeed")
            })
        })
        .collect();

    let receipts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(service.stats().enrolled_identities, 16);
    assert_eq!(service.stats().bound_wallets, 16);
    for (i, receipt) in receipts.iter().enumerate() {
        let binding = service.get_binding(&format!("0xwallet{i}")).unwrap();
        assert_eq!(binding.identity_id, receipt.identity_id, "wallet {i}");
    }
}

#[test]
fn concurrent_re_enrollment_keeps_one_vector_per_wallet() {
    let service = Arc::new(
        FaceAuthService::in_memory(
            IndexConfig::new().with_dimension(DIM),
            AuthConfig::default(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service
                    .enroll("0xshared", &one_hot(i))
                    .expect("enroll should succeed")
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(service.stats().enrolled_identities, 1);
    let binding = service.get_binding("0xshared").unwrap();
    assert_eq!(service.index().identities(), vec![binding.identity_id]);
}

#[test]
fn authentication_runs_alongside_enrollment() {
    let service = Arc::new(
        FaceAuthService::in_memory(
            IndexConfig::new().with_dimension(DIM),
            AuthConfig::default(),
        )
        .unwrap(),
    );
    let anchor = service.enroll("0xanchor", &one_hot(0)).unwrap();

    let writer = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for i in 1..32 {
                service.enroll(&format!("0xw{i}"), &one_hot(i)).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let expected = anchor.identity_id.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let res = service
                        .authenticate("0xanchor", Some(&one_hot(0)), &LivenessResult::live(1.0))
                        .unwrap();
                    assert_eq!(res.decision, AuthDecision::Authenticated);
                    assert_eq!(res.identity_id.as_deref(), Some(expected.as_str()));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(service.stats().enrolled_identities, 32);
}
