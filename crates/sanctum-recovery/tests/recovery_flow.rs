//! End-to-end setup and recovery flows against an in-memory vault.

mod common;

use common::*;
use sanctum_recovery::{
    setup_recovery, Answer, MemoryVaultStore, RecoveryError, RecoveryReconstructor,
    RecoverySecret, RecoveryVault, VaultStore,
};

fn build_vault() -> (RecoverySecret, RecoveryVault) {
    let secret = RecoverySecret::generate().unwrap();
    let vault = setup_recovery(&secret, &questions(), &all_answers(), test_kdf()).unwrap();
    (secret, vault)
}

/// The concrete scenario: a fixed secret, five answers, recovery with
/// keystone + two, a keystone-free attempt, and a tag flip.
#[tokio::test]
async fn concrete_recovery_scenario() {
    let (secret, vault) = build_vault();
    let reconstructor = RecoveryReconstructor::new(fast_guard());

    // Keystone plus two others returns the original 24 words.
    let recovered = reconstructor
        .recover_secret(
            &[answer("q3"), answer("q1"), answer("q4")],
            &vault,
            "user-a",
        )
        .await
        .unwrap()
        .expect("keystone plus two must recover");
    assert_eq!(recovered.words(), secret.words());

    // All four non-keystone answers (4 shares, keystone absent) is a
    // usage error before any cryptographic work.
    let no_keystone = reconstructor
        .recover_secret(
            &[answer("q1"), answer("q2"), answer("q4"), answer("q5")],
            &vault,
            "user-a",
        )
        .await;
    assert!(matches!(no_keystone, Err(RecoveryError::KeystoneMissing)));

    // Flip one bit of the keystone chunk's tag: the first call now fails
    // with an authentication-class error, never the original words.
    let mut tampered = vault.clone();
    tampered.chunks.get_mut("q3").unwrap().tag[0] ^= 0x01;
    let result = reconstructor
        .recover_secret(
            &[answer("q3"), answer("q1"), answer("q4")],
            &tampered,
            "user-b",
        )
        .await;
    assert!(matches!(result, Err(RecoveryError::StorageCorrupted(_))));
}

/// A wrong keystone answer yields no secret for every choice of correct
/// non-keystone answers.
#[tokio::test]
async fn keystone_is_mandatory_for_every_member_subset() {
    let (_, vault) = build_vault();
    let members = ["q1", "q2", "q4", "q5"];

    // All four members correct, keystone wrong: 4 shares, below 5.
    let reconstructor = RecoveryReconstructor::new(fast_guard());
    let mut answers: Vec<Answer> = members.map(answer).to_vec();
    answers.push(Answer::new("q3", "wrong city"));
    let result = reconstructor
        .recover_secret(&answers, &vault, "user-a")
        .await
        .unwrap();
    assert!(result.is_none());

    // Every 3-member subset plus a wrong keystone also fails.
    for skip in members {
        let reconstructor = RecoveryReconstructor::new(fast_guard());
        let mut answers: Vec<Answer> = members
            .iter()
            .filter(|&&m| m != skip)
            .map(|&m| answer(m))
            .collect();
        answers.push(Answer::new("q3", "wrong city"));
        let result = reconstructor
            .recover_secret(&answers, &vault, "user-b")
            .await
            .unwrap();
        assert!(result.is_none(), "subset without {skip} must fail");
    }
}

/// Keystone + exactly one other (4 shares) fails; keystone + any two
/// (5 shares) succeeds.
#[tokio::test]
async fn threshold_is_exact() {
    let (secret, vault) = build_vault();
    let members = ["q1", "q2", "q4", "q5"];

    for only in members {
        let reconstructor = RecoveryReconstructor::new(fast_guard());
        // Three answers supplied so the usage gate passes, but only the
        // keystone and one member are correct.
        let wrong = members.iter().find(|&&m| m != only).unwrap();
        let answers = vec![answer("q3"), answer(only), Answer::new(*wrong, "nope")];
        let result = reconstructor
            .recover_secret(&answers, &vault, "user-a")
            .await
            .unwrap();
        assert!(result.is_none(), "keystone + only {only} must fail");
    }

    for (i, a) in members.iter().enumerate() {
        for b in members.iter().skip(i + 1) {
            let reconstructor = RecoveryReconstructor::new(fast_guard());
            let recovered = reconstructor
                .recover_secret(&[answer("q3"), answer(a), answer(b)], &vault, "user-b")
                .await
                .unwrap()
                .unwrap_or_else(|| panic!("q3+{a}+{b} must recover"));
            assert_eq!(recovered, secret);
        }
    }
}

/// Flipping a single ciphertext bit in any chunk turns an otherwise
/// sufficient recovery into a fatal error, never a wrong secret.
#[tokio::test]
async fn any_single_bit_flip_is_detected() {
    let (_, vault) = build_vault();

    for target in ["q1", "q3", "q4"] {
        let mut tampered = vault.clone();
        tampered.chunks.get_mut(target).unwrap().ciphertext[0] ^= 0x01;

        let reconstructor = RecoveryReconstructor::new(fast_guard());
        let result = reconstructor
            .recover_secret(
                &[answer("q3"), answer("q1"), answer("q4")],
                &tampered,
                "user-a",
            )
            .await;
        assert!(
            matches!(result, Err(RecoveryError::StorageCorrupted(_))),
            "bit flip in {target} must be fatal"
        );
    }
}

/// Supplying more correct answers than needed still recovers.
#[tokio::test]
async fn overshoot_recovers() {
    let (secret, vault) = build_vault();
    let reconstructor = RecoveryReconstructor::new(fast_guard());

    let recovered = reconstructor
        .recover_secret(&all_answers(), &vault, "user-a")
        .await
        .unwrap()
        .expect("all five answers must recover");
    assert_eq!(recovered, secret);
}

/// The vault survives the remote store round trip and recovers identically.
#[tokio::test]
async fn vault_round_trips_through_remote_store() {
    let (secret, vault) = build_vault();
    let store = MemoryVaultStore::new();

    store.store("user-a", &vault).await.unwrap();
    let loaded = store.load("user-a").await.unwrap().unwrap();
    assert_eq!(loaded, vault);

    let reconstructor = RecoveryReconstructor::new(fast_guard());
    let recovered = reconstructor
        .recover_secret(&[answer("q3"), answer("q2"), answer("q5")], &loaded, "user-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered, secret);
}
