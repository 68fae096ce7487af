use async_std::task;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use server_session::{
    conformance, AuthId, Config, Error, MemoryStore, Operation, Session, SessionId,
    SessionStoreImplementation,
};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A backend that checks for an existing session, yields, and then writes unconditionally.
#[derive(Debug, Default)]
struct CheckThenWriteStore {
    inner: MemoryStore,
}

#[async_trait]
impl SessionStoreImplementation for CheckThenWriteStore {
    type Error = Infallible;

    async fn get_session(
        &self,
        id: &SessionId,
    ) -> server_session::Result<Option<Session>, Infallible> {
        self.inner.get_session(id).await
    }

    async fn insert_session(&self, session: &Session) -> server_session::Result<(), Infallible> {
        if let Some(existing) = self.inner.get_session(&session.key).await? {
            return Err(Error::SessionAlreadyExists {
                existing: Box::new(existing),
            });
        }
        task::yield_now().await;
        self.inner.delete_session(&session.key).await?;
        self.inner.insert_session(session).await
    }

    async fn replace_session(&self, session: &Session) -> server_session::Result<(), Infallible> {
        self.inner.replace_session(session).await
    }

    async fn delete_session(&self, id: &SessionId) -> server_session::Result<(), Infallible> {
        self.inner.delete_session(id).await
    }

    async fn delete_all_sessions_of_auth_id(
        &self,
        auth_id: &AuthId,
    ) -> server_session::Result<(), Infallible> {
        self.inner.delete_all_sessions_of_auth_id(auth_id).await
    }
}

fn random_session() -> Session {
    Session::new(
        SessionId::generate(&mut rand::thread_rng()),
        None,
        Default::default(),
        Utc::now(),
    )
}

#[async_std::test]
async fn test_conformance() {
    conformance::assert_conformant(&MemoryStore::new()).await;
}

#[async_std::test]
async fn test_conformance_of_concurrency() {
    let store = MemoryStore::new();
    conformance::concurrent_inserts_of_same_key(&store).await;
    conformance::concurrent_replace_and_get(&store).await;
    conformance::concurrent_replace_and_delete(&store).await;
    assert_eq!(store.len(), 1);
}

#[async_std::test]
#[should_panic(expected = "exactly one concurrent insert of the same key must succeed")]
async fn test_conformance_detects_racy_insert() {
    conformance::concurrent_inserts_of_same_key(&CheckThenWriteStore::default()).await;
}

#[async_std::test]
async fn test_conformance_of_populated_store() {
    let store = MemoryStore::new();
    for _ in 0..100 {
        store.insert_session(&random_session()).await.unwrap();
    }
    conformance::assert_conformant(&store).await;
    conformance::assert_conformant(&store).await;
}

#[async_std::test]
async fn test_clones_share_sessions() {
    let store = MemoryStore::new_with_logger();
    let clone = store.clone();
    let session = random_session();
    clone.insert_session(&session).await.unwrap();
    assert_eq!(store.get_session(&session.key).await.unwrap(), Some(session.clone()));
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.logged_operations(),
        &[
            Operation::InsertSession {
                session: session.clone()
            },
            Operation::GetSession { id: session.key },
        ]
    );

    store.clear();
    assert!(clone.is_empty());
}

#[async_std::test]
async fn test_cleanup_removes_expired_sessions() {
    let now = Utc::now();
    let config = Config::default();
    let store = MemoryStore::new();

    let fresh = random_session();
    let mut idle = random_session();
    idle.created_at = now - Duration::days(8);
    idle.accessed_at = idle.created_at;
    let mut old = random_session();
    old.created_at = now - Duration::days(61);
    for session in [&fresh, &idle, &old] {
        store.insert_session(session).await.unwrap();
    }

    assert_eq!(store.cleanup(now, &config), 2);
    let mut remaining = Vec::new();
    store.for_each(|session| remaining.push(session.clone()));
    assert_eq!(remaining, vec![fresh]);
    assert_eq!(store.cleanup(now, &config), 0);
}

/// Concurrent inserts of distinct sessions are never lost.
#[async_std::test]
async fn test_concurrent_inserts() {
    let store = MemoryStore::new();
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            task::spawn(async move {
                for _ in 0..50 {
                    store.insert_session(&random_session()).await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await;
    }
    assert_eq!(store.len(), 16 * 50);
}

/// Of many concurrent inserts with the same key, exactly one succeeds.
#[async_std::test]
async fn test_concurrent_inserts_of_same_key() {
    let store = MemoryStore::new();
    let key = random_session().key;
    let tasks: Vec<_> = (0..16u8)
        .map(|index| {
            let store = store.clone();
            task::spawn(async move {
                let mut session = random_session();
                session.key = key;
                session.data.insert("writer".to_owned(), vec![index]);
                store.insert_session(&session).await
            })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        match task.await {
            Ok(()) => successes += 1,
            Err(Error::SessionAlreadyExists { existing }) => assert_eq!(existing.key, key),
            Err(error) => panic!("unexpected error {error}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(store.len(), 1);
}

/// Readers racing with writers always observe a complete session.
#[async_std::test]
async fn test_concurrent_replace_and_get() {
    let store = MemoryStore::new();
    let session = random_session();
    store.insert_session(&session).await.unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..4u32)
        .map(|writer| {
            let store = store.clone();
            let mut session = session.clone();
            task::spawn(async move {
                for round in 0..200u32 {
                    let value = (writer * 1000 + round).to_be_bytes().to_vec();
                    session.data.insert("first".to_owned(), value.clone());
                    session.data.insert("second".to_owned(), value);
                    store.replace_session(&session).await.unwrap();
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let done = done.clone();
            let key = session.key;
            task::spawn(async move {
                while !done.load(Ordering::Acquire) {
                    let read = store.get_session(&key).await.unwrap().unwrap();
                    assert_eq!(read.data.get("first"), read.data.get("second"));
                    task::yield_now().await;
                }
            })
        })
        .collect();

    for writer in writers {
        writer.await;
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.await;
    }
    assert_eq!(store.len(), 1);
}

/// A session deleted concurrently with a replace is either deleted or replaced, never resurrected.
#[async_std::test]
async fn test_concurrent_replace_and_delete() {
    for _ in 0..50 {
        let store = MemoryStore::new();
        let session = random_session();
        store.insert_session(&session).await.unwrap();

        let replacer = {
            let store = store.clone();
            let session = session.clone();
            task::spawn(async move { store.replace_session(&session).await })
        };
        let deleter = {
            let store = store.clone();
            let key = session.key;
            task::spawn(async move { store.delete_session(&key).await })
        };

        deleter.await.unwrap();
        match replacer.await {
            Ok(()) | Err(Error::SessionDoesNotExist { .. }) => {}
            Err(error) => panic!("unexpected error {error}"),
        }
        assert!(store.get_session(&session.key).await.unwrap().is_none());
    }
}
