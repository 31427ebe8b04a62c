// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::Rng;
use crate::ratchet::RatchetError;

use super::{
    GroupCipher, MAX_SENDER_KEY_STATES, SenderKeyDistributionMessage, SenderKeyError,
    SenderKeyRecord,
};

#[test]
fn distribute_and_decrypt() {
    let rng = Rng::from_seed([1; 32]);

    let (alice, distribution) =
        GroupCipher::create_distribution(SenderKeyRecord::new(), &rng).unwrap();
    let bob = GroupCipher::process_distribution(SenderKeyRecord::new(), &distribution);

    let (alice, message_1) = GroupCipher::encrypt(alice, b"Hello, group!", &rng).unwrap();
    let (_alice, message_2) = GroupCipher::encrypt(alice, b"Still here", &rng).unwrap();

    let (bob, plaintext) = GroupCipher::decrypt(bob, &message_1).unwrap();
    assert_eq!(plaintext, b"Hello, group!");
    let (_bob, plaintext) = GroupCipher::decrypt(bob, &message_2).unwrap();
    assert_eq!(plaintext, b"Still here");
}

#[test]
fn distribution_reuses_existing_state() {
    let rng = Rng::from_seed([2; 32]);

    let (alice, first) = GroupCipher::create_distribution(SenderKeyRecord::new(), &rng).unwrap();
    let (alice, _) = GroupCipher::encrypt(alice, b"one", &rng).unwrap();
    let (alice, second) = GroupCipher::create_distribution(alice, &rng).unwrap();

    assert_eq!(alice.len(), 1);
    assert_eq!(first.key_id, second.key_id);
    assert_eq!(second.iteration, 1);
}

#[test]
fn processing_twice_is_idempotent() {
    let rng = Rng::from_seed([3; 32]);

    let (alice, distribution) =
        GroupCipher::create_distribution(SenderKeyRecord::new(), &rng).unwrap();
    let bob = GroupCipher::process_distribution(SenderKeyRecord::new(), &distribution);

    let (alice, message_1) = GroupCipher::encrypt(alice, b"one", &rng).unwrap();
    let (bob, _) = GroupCipher::decrypt(bob, &message_1).unwrap();

    // Applying the same distribution again does not rewind the chain.
    let bob = GroupCipher::process_distribution(bob, &distribution);
    assert_eq!(bob.len(), 1);
    assert_eq!(bob.latest().unwrap().iteration(), 1);

    let (_alice, message_2) = GroupCipher::encrypt(alice, b"two", &rng).unwrap();
    let (_bob, plaintext) = GroupCipher::decrypt(bob, &message_2).unwrap();
    assert_eq!(plaintext, b"two");
}

#[test]
fn forged_signature_fails() {
    let rng = Rng::from_seed([4; 32]);

    let (alice, distribution) =
        GroupCipher::create_distribution(SenderKeyRecord::new(), &rng).unwrap();
    let (mallory, _) = GroupCipher::create_distribution(SenderKeyRecord::new(), &rng).unwrap();
    let bob = GroupCipher::process_distribution(SenderKeyRecord::new(), &distribution);

    let (_alice, mut message) = GroupCipher::encrypt(alice, b"real", &rng).unwrap();
    let (_mallory, forged) = GroupCipher::encrypt(mallory, b"fake", &rng).unwrap();
    message.signature = forged.signature;

    assert!(matches!(
        GroupCipher::decrypt(bob, &message),
        Err(SenderKeyError::Signature(_))
    ));
}

#[test]
fn unknown_key_id() {
    let rng = Rng::from_seed([5; 32]);

    let (alice, _) = GroupCipher::create_distribution(SenderKeyRecord::new(), &rng).unwrap();
    let (_alice, message) = GroupCipher::encrypt(alice, b"hidden", &rng).unwrap();

    assert!(matches!(
        GroupCipher::decrypt(SenderKeyRecord::new(), &message),
        Err(SenderKeyError::UnknownKeyId(_))
    ));
}

#[test]
fn messages_before_distribution_are_unreadable() {
    let rng = Rng::from_seed([6; 32]);

    let (alice, _) = GroupCipher::create_distribution(SenderKeyRecord::new(), &rng).unwrap();
    let (alice, early) = GroupCipher::encrypt(alice, b"early", &rng).unwrap();
    let (alice, distribution) = GroupCipher::create_distribution(alice, &rng).unwrap();
    let bob = GroupCipher::process_distribution(SenderKeyRecord::new(), &distribution);

    assert!(matches!(
        GroupCipher::decrypt(bob.clone(), &early),
        Err(SenderKeyError::Ratchet(RatchetError::UnknownMessageKey(0, 1)))
    ));

    let (_alice, late) = GroupCipher::encrypt(alice, b"late", &rng).unwrap();
    let (_bob, plaintext) = GroupCipher::decrypt(bob, &late).unwrap();
    assert_eq!(plaintext, b"late");
}

#[test]
fn bounded_number_of_states() {
    let rng = Rng::from_seed([7; 32]);
    let mut record = SenderKeyRecord::new();

    for key_id in 0..(MAX_SENDER_KEY_STATES as u32 + 2) {
        record = GroupCipher::process_distribution(
            record,
            &SenderKeyDistributionMessage {
                key_id,
                iteration: 0,
                chain_key: rng.random_array().unwrap(),
                signing_key: crate::crypto::x25519::SecretKey::generate(&rng)
                    .unwrap()
                    .public_key(),
            },
        );
    }

    assert_eq!(record.len(), MAX_SENDER_KEY_STATES);
    assert!(record.state(0).is_none());
    assert_eq!(record.latest().unwrap().key_id(), MAX_SENDER_KEY_STATES as u32 + 1);
}
