//! A behavioral test suite for [`SessionStoreImplementation`]s.
//!
//! Backend authors should run [`assert_conformant`] against their backend in their tests.
//! It only uses fresh random session ids and auth ids, so it can be run against a store
//! that already contains sessions. It panics on the first violation.
//!
//! The concurrency checks run their operations as interleaved futures on the calling task.
//! They find races in backends that await between reading and writing.
//!
//! ```rust
//! # use server_session::{conformance, MemoryStore};
//! # async_std::task::block_on(async {
//! conformance::assert_conformant(&MemoryStore::new()).await;
//! # })
//! ```

use crate::{AuthId, Error, Session, SessionId, SessionMap, SessionStoreImplementation};
use chrono::{DateTime, Duration, DurationRound, Utc};
use futures::future::{join, join_all};
use rand::RngCore;

/// Runs every check of this module against `store`.
pub async fn assert_conformant<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    get_unknown_session(store).await;
    insert_then_get(store).await;
    insert_never_overwrites(store).await;
    replace_overwrites(store).await;
    replace_never_creates(store).await;
    delete_session(store).await;
    delete_all_sessions_of_auth_id(store).await;
    replace_moves_auth_id(store).await;
    concurrent_inserts_of_same_key(store).await;
    concurrent_replace_and_get(store).await;
    concurrent_replace_and_delete(store).await;
}

/// Reading a session that was never stored returns nothing.
pub async fn get_unknown_session<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let id = random_id();
    assert_eq!(get(store, &id).await, None);
}

/// An inserted session can be read back unchanged.
pub async fn insert_then_get<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let session = random_session(Some(random_auth_id()));
    ok(store.insert_session(&session).await);
    assert_eq!(get(store, &session.key).await, Some(session.clone()));

    let mut binary = random_session(None);
    binary
        .data
        .insert(String::new(), (0..=u8::MAX).collect::<Vec<_>>());
    ok(store.insert_session(&binary).await);
    assert_eq!(get(store, &binary.key).await, Some(binary));
}

/// Inserting a session with an existing key fails and keeps the existing session.
pub async fn insert_never_overwrites<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let session = random_session(None);
    ok(store.insert_session(&session).await);

    let mut colliding = random_session(Some(random_auth_id()));
    colliding.key = session.key;
    match store.insert_session(&colliding).await {
        Err(Error::SessionAlreadyExists { existing }) => assert_eq!(*existing, session),
        Err(error) => panic!("expected SessionAlreadyExists, got {error}"),
        Ok(()) => panic!("inserting a session with an existing key succeeded"),
    }
    assert_eq!(get(store, &session.key).await, Some(session));
}

/// Replacing a session overwrites it.
pub async fn replace_overwrites<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let session = random_session(None);
    ok(store.insert_session(&session).await);

    let mut replacement = random_session(Some(random_auth_id()));
    replacement.key = session.key;
    replacement.created_at = session.created_at;
    ok(store.replace_session(&replacement).await);
    assert_eq!(get(store, &session.key).await, Some(replacement));
}

/// Replacing a session that does not exist fails and does not create it.
pub async fn replace_never_creates<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let session = random_session(Some(random_auth_id()));
    match store.replace_session(&session).await {
        Err(Error::SessionDoesNotExist { session: rejected }) => assert_eq!(*rejected, session),
        Err(error) => panic!("expected SessionDoesNotExist, got {error}"),
        Ok(()) => panic!("replacing a session that does not exist succeeded"),
    }
    assert_eq!(get(store, &session.key).await, None);
}

/// Deleting removes exactly the given session, and deleting unknown sessions is no error.
pub async fn delete_session<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let deleted = random_session(None);
    let kept = random_session(None);
    ok(store.insert_session(&deleted).await);
    ok(store.insert_session(&kept).await);

    ok(store.delete_session(&deleted.key).await);
    assert_eq!(get(store, &deleted.key).await, None);
    assert_eq!(get(store, &kept.key).await, Some(kept));

    ok(store.delete_session(&deleted.key).await);
    ok(store.delete_session(&random_id()).await);
}

/// Deleting by auth id removes all sessions of that auth id and nothing else.
pub async fn delete_all_sessions_of_auth_id<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let auth_id = random_auth_id();
    let deleted: Vec<_> = (0..3)
        .map(|_| random_session(Some(auth_id.clone())))
        .collect();
    let kept = vec![
        random_session(Some(random_auth_id())),
        random_session(None),
    ];
    for session in deleted.iter().chain(&kept) {
        ok(store.insert_session(session).await);
    }

    ok(store.delete_all_sessions_of_auth_id(&auth_id).await);
    for session in &deleted {
        assert_eq!(get(store, &session.key).await, None);
    }
    for session in kept {
        assert_eq!(get(store, &session.key).await, Some(session));
    }

    ok(store.delete_all_sessions_of_auth_id(&random_auth_id()).await);
}

/// Replacing a session with one of another auth id moves it to the new auth id.
pub async fn replace_moves_auth_id<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let old_auth_id = random_auth_id();
    let new_auth_id = random_auth_id();
    let session = random_session(Some(old_auth_id.clone()));
    ok(store.insert_session(&session).await);

    let moved = Session {
        auth_id: Some(new_auth_id.clone()),
        ..session.clone()
    };
    ok(store.replace_session(&moved).await);

    ok(store.delete_all_sessions_of_auth_id(&old_auth_id).await);
    assert_eq!(get(store, &session.key).await, Some(moved));
    ok(store.delete_all_sessions_of_auth_id(&new_auth_id).await);
    assert_eq!(get(store, &session.key).await, None);
}

/// Of many concurrent inserts with the same key, exactly one succeeds and is stored.
pub async fn concurrent_inserts_of_same_key<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let key = random_id();
    let sessions: Vec<_> = (0..16u8)
        .map(|writer| {
            let mut session = random_session(None);
            session.key = key;
            session.data.insert("writer".to_owned(), vec![writer]);
            session
        })
        .collect();

    let results = join_all(sessions.iter().map(|session| store.insert_session(session))).await;
    let mut winners = Vec::new();
    for (session, result) in sessions.iter().zip(results) {
        match result {
            Ok(()) => winners.push(session.clone()),
            Err(Error::SessionAlreadyExists { existing }) => assert_eq!(existing.key, key),
            Err(error) => panic!("expected SessionAlreadyExists, got {error}"),
        }
    }
    assert_eq!(
        winners.len(),
        1,
        "exactly one concurrent insert of the same key must succeed"
    );
    assert_eq!(get(store, &key).await, winners.pop());
}

/// Reads racing with replaces always observe a complete session.
pub async fn concurrent_replace_and_get<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    let session = random_session(None);
    ok(store.insert_session(&session).await);
    let key = session.key;

    let writers = (0..4u32).map(|writer| {
        let mut session = session.clone();
        async move {
            for round in 0..50u32 {
                let value = (writer * 1000 + round).to_be_bytes().to_vec();
                session.data.insert("first".to_owned(), value.clone());
                session.data.insert("second".to_owned(), value);
                ok(store.replace_session(&session).await);
            }
        }
    });
    let readers = (0..4).map(|_| async move {
        for _ in 0..50 {
            let read = get(store, &key)
                .await
                .unwrap_or_else(|| panic!("session {key:?} vanished while being replaced"));
            assert_eq!(
                read.data.get("first"),
                read.data.get("second"),
                "read a partially replaced session"
            );
        }
    });
    join(join_all(writers), join_all(readers)).await;

    let read = get(store, &key).await;
    assert!(read.is_some(), "session {key:?} vanished while being replaced");
    ok(store.delete_session(&key).await);
}

/// A session deleted concurrently with a replace ends up deleted, never resurrected.
pub async fn concurrent_replace_and_delete<Implementation: SessionStoreImplementation>(
    store: &Implementation,
) {
    for _ in 0..10 {
        let session = random_session(None);
        ok(store.insert_session(&session).await);

        let (replaced, deleted) = join(
            store.replace_session(&session),
            store.delete_session(&session.key),
        )
        .await;
        ok(deleted);
        match replaced {
            Ok(()) | Err(Error::SessionDoesNotExist { .. }) => {}
            Err(error) => panic!("expected SessionDoesNotExist, got {error}"),
        }
        assert_eq!(get(store, &session.key).await, None);
    }
}

async fn get<Implementation: SessionStoreImplementation>(
    store: &Implementation,
    id: &SessionId,
) -> Option<Session> {
    ok(store.get_session(id).await)
}

fn ok<T, StorageError: std::error::Error>(result: Result<T, Error<StorageError>>) -> T {
    result.unwrap_or_else(|error| panic!("storage operation failed: {error}"))
}

fn random_id() -> SessionId {
    SessionId::generate(&mut rand::thread_rng())
}

fn random_auth_id() -> AuthId {
    let mut auth_id = vec![0; 16];
    rand::thread_rng().fill_bytes(&mut auth_id);
    auth_id
}

/// A session with random content. Timestamps are rounded to seconds, since not every backend
/// stores sub-second precision.
fn random_session(auth_id: Option<AuthId>) -> Session {
    let mut rng = rand::thread_rng();
    let now = truncated_now();
    let data: SessionMap = (0..rng.next_u32() % 4)
        .map(|index| (format!("key-{index}"), rng.next_u64().to_be_bytes().to_vec()))
        .collect();

    let mut session = Session::new(random_id(), auth_id, data, now - Duration::minutes(5));
    session.accessed_at = now;
    session
}

fn truncated_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::seconds(1)).unwrap_or(now)
}
