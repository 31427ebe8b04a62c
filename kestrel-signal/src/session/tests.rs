// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::Rng;
use crate::key_bundle::{KeyPair, PreKeyRecord};
use crate::key_manager::{Credentials, KeyManager};
use crate::ratchet::RatchetError;

use super::{
    CiphertextMessage, LocalIdentity, MessageType, PreKeySignalMessage, SessionCipher,
    SessionError, SessionRecord, SignalMessage,
};

fn local(credentials: &Credentials) -> LocalIdentity<'_> {
    LocalIdentity {
        identity_key_pair: &credentials.identity_key_pair,
        registration_id: credentials.registration_id,
    }
}

fn expect_prekey(message: CiphertextMessage) -> PreKeySignalMessage {
    match message {
        CiphertextMessage::PreKey(message) => message,
        CiphertextMessage::Whisper(_) => panic!("expected pre-key message"),
    }
}

fn expect_whisper(message: CiphertextMessage) -> SignalMessage {
    match message {
        CiphertextMessage::Whisper(message) => message,
        CiphertextMessage::PreKey(_) => panic!("expected ordinary message"),
    }
}

struct Handshake {
    alice: SessionRecord,
    bob: SessionRecord,
}

/// Alice establishes a session with Bob's bundle and sends a first message which Bob accepts.
fn handshake(rng: &Rng, alice: &Credentials, bob: &Credentials) -> Handshake {
    let onetime = PreKeyRecord::generate(3, rng).unwrap();
    let bundle = bob.prekey_bundle(1, Some(onetime.public()));

    let alice_session = SessionCipher::initialize_outgoing(local(alice), &bundle, rng).unwrap();
    assert!(alice_session.has_pending_prekey());

    let (alice_session, message) = SessionCipher::encrypt(alice_session, b"Hello, Bob!").unwrap();
    assert_eq!(message.message_type(), MessageType::PreKey);
    let message = expect_prekey(message);
    assert_eq!(message.prekey_id, Some(3));
    assert_eq!(message.signed_prekey_id, bob.signed_prekey.id);

    let bob_session = SessionCipher::initialize_incoming(
        local(bob),
        &bob.signed_prekey.key_pair,
        Some(&onetime.key_pair),
        &message,
    )
    .unwrap();
    let (bob_session, plaintext) =
        SessionCipher::decrypt(bob_session, &message.message, rng).unwrap();
    assert_eq!(plaintext, b"Hello, Bob!");
    assert_eq!(bob_session.base_key(), alice_session.base_key());
    assert_eq!(bob_session.remote_identity(), &alice.identity_key());

    Handshake {
        alice: alice_session,
        bob: bob_session,
    }
}

#[test]
fn handshake_and_reply() {
    let rng = Rng::from_seed([1; 32]);
    let alice = KeyManager::init(&rng).unwrap();
    let bob = KeyManager::init(&rng).unwrap();

    let Handshake {
        alice: alice_session,
        bob: bob_session,
    } = handshake(&rng, &alice, &bob);

    // Until Alice hears back she keeps sending pre-key messages.
    let (alice_session, message) = SessionCipher::encrypt(alice_session, b"Still there?").unwrap();
    let message = expect_prekey(message);
    let (bob_session, plaintext) =
        SessionCipher::decrypt(bob_session, &message.message, &rng).unwrap();
    assert_eq!(plaintext, b"Still there?");

    let (bob_session, reply) = SessionCipher::encrypt(bob_session, b"Hi, Alice!").unwrap();
    let reply = expect_whisper(reply);
    let (alice_session, plaintext) = SessionCipher::decrypt(alice_session, &reply, &rng).unwrap();
    assert_eq!(plaintext, b"Hi, Alice!");
    assert!(!alice_session.has_pending_prekey());

    let (_alice_session, message) = SessionCipher::encrypt(alice_session, b"Great!").unwrap();
    let message = expect_whisper(message);
    let (_bob_session, plaintext) = SessionCipher::decrypt(bob_session, &message, &rng).unwrap();
    assert_eq!(plaintext, b"Great!");
}

#[test]
fn many_direction_changes() {
    let rng = Rng::from_seed([2; 32]);
    let alice = KeyManager::init(&rng).unwrap();
    let bob = KeyManager::init(&rng).unwrap();

    let Handshake {
        alice: mut alice_session,
        bob: mut bob_session,
    } = handshake(&rng, &alice, &bob);

    for round in 0..8u8 {
        let (session, message) = SessionCipher::encrypt(bob_session, &[round]).unwrap();
        let (next_alice, plaintext) = match message {
            CiphertextMessage::Whisper(message) => {
                SessionCipher::decrypt(alice_session, &message, &rng).unwrap()
            }
            CiphertextMessage::PreKey(_) => panic!("responder never sends pre-key messages"),
        };
        assert_eq!(plaintext, vec![round]);
        bob_session = session;

        let (next_alice, message) = SessionCipher::encrypt(next_alice, &[round, round]).unwrap();
        let (next_bob, plaintext) =
            SessionCipher::decrypt(bob_session, &expect_whisper(message), &rng).unwrap();
        assert_eq!(plaintext, vec![round, round]);
        alice_session = next_alice;
        bob_session = next_bob;
    }
}

#[test]
fn out_of_order_across_ratchet_steps() {
    let rng = Rng::from_seed([3; 32]);
    let alice = KeyManager::init(&rng).unwrap();
    let bob = KeyManager::init(&rng).unwrap();

    let Handshake {
        alice: alice_session,
        bob: bob_session,
    } = handshake(&rng, &alice, &bob);

    let (bob_session, reply_1) = SessionCipher::encrypt(bob_session, b"one").unwrap();
    let (_bob_session, reply_2) = SessionCipher::encrypt(bob_session, b"two").unwrap();

    let (alice_session, plaintext) =
        SessionCipher::decrypt(alice_session, &expect_whisper(reply_2), &rng).unwrap();
    assert_eq!(plaintext, b"two");
    let (_alice_session, plaintext) =
        SessionCipher::decrypt(alice_session, &expect_whisper(reply_1), &rng).unwrap();
    assert_eq!(plaintext, b"one");
}

#[test]
fn tampered_header_fails() {
    let rng = Rng::from_seed([4; 32]);
    let alice = KeyManager::init(&rng).unwrap();
    let bob = KeyManager::init(&rng).unwrap();

    let Handshake {
        alice: alice_session,
        bob: bob_session,
    } = handshake(&rng, &alice, &bob);

    let (_alice_session, message) = SessionCipher::encrypt(alice_session, b"secret").unwrap();
    let mut message = expect_prekey(message).message;
    message.previous_counter += 1;

    assert!(matches!(
        SessionCipher::decrypt(bob_session, &message, &rng),
        Err(SessionError::Ratchet(RatchetError::Aead(_)))
    ));
}

#[test]
fn wrong_signed_prekey_fails() {
    let rng = Rng::from_seed([5; 32]);
    let alice = KeyManager::init(&rng).unwrap();
    let bob = KeyManager::init(&rng).unwrap();

    let bundle = bob.prekey_bundle(1, None);
    let session = SessionCipher::initialize_outgoing(local(&alice), &bundle, &rng).unwrap();
    let (_session, message) = SessionCipher::encrypt(session, b"hello").unwrap();
    let message = expect_prekey(message);

    let other_prekey = KeyPair::generate(&rng).unwrap();
    let bob_session =
        SessionCipher::initialize_incoming(local(&bob), &other_prekey, None, &message).unwrap();
    assert!(SessionCipher::decrypt(bob_session, &message.message, &rng).is_err());
}

#[test]
fn rejects_forged_bundle() {
    let rng = Rng::from_seed([6; 32]);
    let alice = KeyManager::init(&rng).unwrap();
    let bob = KeyManager::init(&rng).unwrap();
    let mallory = KeyManager::init(&rng).unwrap();

    let mut bundle = bob.prekey_bundle(1, None);
    bundle.signed_prekey = mallory.signed_prekey.key_pair.public_key;

    assert!(matches!(
        SessionCipher::initialize_outgoing(local(&alice), &bundle, &rng),
        Err(SessionError::KeyBundle(_))
    ));
}
