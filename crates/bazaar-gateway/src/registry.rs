use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::warn;
use uuid::Uuid;

use bazaar_db::Database;
use bazaar_types::events::ServerFrame;

/// Sender half of a connection's outbound frame channel. Replies and
/// broadcasts travel through the same channel, so a reply to an action
/// always precedes any broadcast that action triggered.
pub type FrameSender = mpsc::UnboundedSender<ServerFrame>;

/// The two independent session pools. Message sessions follow one chat
/// thread; chat-list sessions follow a user's chat overview. Audiences
/// and payloads differ, so membership is decided at subscription time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Messages,
    ChatList,
}

/// A pending connection: identity allocated, no pool entry yet. Becomes
/// a pool entry on successful `authorize`.
pub struct SessionHandle {
    conn_id: Uuid,
    pub tx: FrameSender,
}

impl SessionHandle {
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }
}

struct SessionEntry {
    user_id: i64,
    token: String,
    tx: FrameSender,
}

/// Tracks which live connections are authenticated, as which user, in
/// which pool, and fans mutation results out to them. The pools are
/// owned exclusively by the registry; nothing else reads or writes them.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    db: Arc<Database>,
    message_pool: RwLock<HashMap<Uuid, SessionEntry>>,
    chat_list_pool: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl Registry {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                db,
                message_pool: RwLock::new(HashMap::new()),
                chat_list_pool: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> Arc<Database> {
        self.inner.db.clone()
    }

    /// Accept a new connection: allocate its identity and frame channel.
    /// Unconditional; the connection holds no pool entry until it
    /// authorizes.
    pub fn register(&self) -> (SessionHandle, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SessionHandle {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Validate the handshake credentials against the store and, on
    /// success, insert the connection into `pool` and acknowledge.
    /// Idempotent per connection: a duplicate authorize does not create
    /// a second entry. A failed authorize adds nothing; the caller must
    /// close the connection.
    pub async fn authorize(
        &self,
        handle: &SessionHandle,
        user_id: i64,
        token: &str,
        pool: Pool,
    ) -> bool {
        let db = self.store();
        let key = token.to_string();
        let valid = tokio::task::spawn_blocking(move || db.validate_session(user_id, &key).is_ok())
            .await
            .unwrap_or_else(|e| {
                warn!("spawn_blocking join error: {}", e);
                false
            });

        if !valid {
            let _ = handle.tx.send(ServerFrame::unauthorized());
            return false;
        }

        self.pool(pool)
            .write()
            .await
            .entry(handle.conn_id)
            .or_insert_with(|| SessionEntry {
                user_id,
                token: token.to_string(),
                tx: handle.tx.clone(),
            });

        let _ = handle.tx.send(ServerFrame::authorized());
        true
    }

    /// Drop any entry this connection holds. Safe against both pools and
    /// against connections that never authorized.
    pub async fn deregister(&self, conn_id: Uuid) {
        self.inner.message_pool.write().await.remove(&conn_id);
        self.inner.chat_list_pool.write().await.remove(&conn_id);
    }

    /// Live entries in a pool, for logging and tests.
    pub async fn session_count(&self, pool: Pool) -> usize {
        self.pool(pool).read().await.len()
    }

    /// Resolve the chat's two participants through the store and deliver
    /// `frame` to every message session belonging to either of them.
    /// Matching is by user_id, not token: all of a user's open sessions
    /// converge on the same thread state.
    pub async fn broadcast_to_participants(
        &self,
        chat_id: i64,
        user_id: i64,
        token: &str,
        frame: ServerFrame,
    ) {
        let db = self.store();
        let key = token.to_string();
        let chat = match tokio::task::spawn_blocking(move || db.get_chat(chat_id, user_id, &key))
            .await
        {
            Ok(Ok(chat)) => chat,
            Ok(Err(e)) => {
                warn!("broadcast dropped, chat {} unresolved: {}", chat_id, e);
                return;
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                return;
            }
        };

        let pool = self.inner.message_pool.read().await;
        for entry in pool.values() {
            if chat.has_participant(entry.user_id) {
                // a dead receiver is cleaned up by its own deregister
                let _ = entry.tx.send(frame.clone());
            }
        }
    }

    /// Push a refreshed chat list to every chat-list session of either
    /// user, followed by a change notice. Each recipient's list is
    /// re-fetched with that session's own token — visibility may differ
    /// per viewer, so no payload is shared.
    pub async fn broadcast_chat_list_update(&self, user_from: i64, user_to: i64) {
        let targets: Vec<(i64, String, FrameSender)> = {
            let pool = self.inner.chat_list_pool.read().await;
            pool.values()
                .filter(|entry| entry.user_id == user_from || entry.user_id == user_to)
                .map(|entry| (entry.user_id, entry.token.clone(), entry.tx.clone()))
                .collect()
        };

        for (user_id, token, tx) in targets {
            let db = self.store();
            let chats = match tokio::task::spawn_blocking(move || db.get_chats(user_id, &token))
                .await
            {
                Ok(Ok(chats)) => chats,
                Ok(Err(e)) => {
                    warn!("chat list refresh for user {} failed: {}", user_id, e);
                    continue;
                }
                Err(e) => {
                    warn!("spawn_blocking join error: {}", e);
                    continue;
                }
            };

            let _ = tx.send(ServerFrame::Chats { chats });
            let _ = tx.send(ServerFrame::chats_updated());
        }
    }

    fn pool(&self, pool: Pool) -> &RwLock<HashMap<Uuid, SessionEntry>> {
        match pool {
            Pool::Messages => &self.inner.message_pool,
            Pool::ChatList => &self.inner.chat_list_pool,
        }
    }
}
