use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use bazaar_db::{StoreError, StoreResult};
use bazaar_types::events::{ChatListAction, Handshake, MessageAction, ServerFrame};

use crate::registry::{FrameSender, Pool, Registry};

/// How long a closing connection gets to flush queued outbound frames
/// before its forward task is aborted.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// A message-session connection: bound to chat threads.
pub async fn handle_message_socket(socket: WebSocket, registry: Registry) {
    run_connection(socket, registry, Pool::Messages).await;
}

/// A chat-list-session connection: bound to a user's chat overview.
pub async fn handle_chat_list_socket(socket: WebSocket, registry: Registry) {
    run_connection(socket, registry, Pool::ChatList).await;
}

/// Per-connection lifecycle: pending until the handshake authorizes,
/// then one action per inbound frame in strict arrival order, until the
/// transport closes. A handshake failure is fatal; an action failure is
/// acknowledged and the connection stays usable.
async fn run_connection(socket: WebSocket, registry: Registry, pool: Pool) {
    let (sender, mut receiver) = socket.split();
    let (handle, rx) = registry.register();
    let conn_id = handle.conn_id();

    let mut send_task = tokio::spawn(forward_frames(rx, sender));

    let mut authorized = false;
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        if !authorized {
            match serde_json::from_str::<Handshake>(&text) {
                Ok(hs) => {
                    if !registry.authorize(&handle, hs.user_id, &hs.v_key, pool).await {
                        break;
                    }
                    authorized = true;
                    info!("connection {} authorized as user {}", conn_id, hs.user_id);
                    if pool == Pool::ChatList {
                        send_initial_chat_list(&registry, &handle.tx, hs.user_id, &hs.v_key).await;
                    }
                }
                Err(_) => {
                    let _ = handle.tx.send(ServerFrame::unauthorized());
                    break;
                }
            }
            continue;
        }

        match pool {
            Pool::Messages => match serde_json::from_str::<MessageAction>(&text) {
                Ok(action) => process_message_action(&registry, &handle.tx, action).await,
                Err(_) => {
                    let _ = handle.tx.send(ServerFrame::nok("Unknown action"));
                }
            },
            Pool::ChatList => match serde_json::from_str::<ChatListAction>(&text) {
                Ok(action) => process_chat_list_action(&registry, &handle.tx, action).await,
                Err(_) => {
                    let _ = handle.tx.send(ServerFrame::nok("Unknown action"));
                }
            },
        }
    }

    // Only this connection's entry goes; other sessions are untouched.
    registry.deregister(conn_id).await;

    // Dropping the last sender lets the forward task drain what is
    // already queued (the Unauthorized notice on a failed handshake),
    // then end on its own.
    drop(handle);
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }

    info!("connection {} closed", conn_id);
}

/// Forward queued frames to the socket until the channel or the
/// transport closes.
async fn forward_frames(
    mut rx: UnboundedReceiver<ServerFrame>,
    mut sender: SplitSink<WebSocket, WsMessage>,
) {
    while let Some(frame) = rx.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!("frame serialization failed: {}", e);
                continue;
            }
        };
        if sender.send(WsMessage::Text(text.into())).await.is_err() {
            break;
        }
    }
    let _ = sender.close().await;
}

/// A freshly authorized chat-list session gets its current list right
/// away.
async fn send_initial_chat_list(registry: &Registry, tx: &FrameSender, user_id: i64, v_key: &str) {
    let db = registry.store();
    let key = v_key.to_string();
    match flatten(tokio::task::spawn_blocking(move || db.get_chats(user_id, &key)).await) {
        Ok(chats) => {
            let _ = tx.send(ServerFrame::Chats { chats });
        }
        Err(e) => {
            let _ = tx.send(ServerFrame::nok(&reason(&e)));
        }
    }
}

/// One message-pool action. The token is revalidated in the store on
/// every call; nothing is trusted from the handshake. A rejected write
/// is acknowledged negatively to this caller only and never broadcast.
pub(crate) async fn process_message_action(
    registry: &Registry,
    tx: &FrameSender,
    action: MessageAction,
) {
    match action {
        MessageAction::GetMessages {
            chat_id,
            user_id,
            v_key,
        } => {
            let db = registry.store();
            let key = v_key.clone();
            match flatten(
                tokio::task::spawn_blocking(move || db.get_messages(chat_id, user_id, &key)).await,
            ) {
                Ok(messages) => {
                    let _ = tx.send(ServerFrame::Messages { messages });
                }
                Err(e) => {
                    let _ = tx.send(ServerFrame::nok(&reason(&e)));
                }
            }
        }

        MessageAction::SendMessage {
            chat_id,
            message,
            timestamp,
            author_id,
            v_key,
        } => {
            let date = timestamp.unwrap_or_else(server_timestamp);
            let db = registry.store();
            let key = v_key.clone();
            let result = flatten(
                tokio::task::spawn_blocking(move || {
                    db.create_message(chat_id, &message, &date, author_id, &key)
                })
                .await,
            );
            match result {
                Ok(_) => {
                    let _ = tx.send(ServerFrame::ok());
                    refresh_thread(registry, chat_id, author_id, &v_key).await;
                }
                Err(e) => {
                    let _ = tx.send(ServerFrame::nok(&reason(&e)));
                }
            }
        }

        MessageAction::EditMessage {
            chat_id,
            message_id,
            message,
            author_id,
            v_key,
        } => {
            let db = registry.store();
            let key = v_key.clone();
            let result = flatten(
                tokio::task::spawn_blocking(move || {
                    db.update_message(message_id, &message, author_id, &key)
                })
                .await,
            );
            match result {
                Ok(()) => {
                    let _ = tx.send(ServerFrame::ok());
                    refresh_thread(registry, chat_id, author_id, &v_key).await;
                }
                Err(e) => {
                    let _ = tx.send(ServerFrame::nok(&reason(&e)));
                }
            }
        }

        MessageAction::DeleteMessage {
            chat_id,
            message_id,
            user_id,
            v_key,
        } => {
            let db = registry.store();
            let key = v_key.clone();
            let result = flatten(
                tokio::task::spawn_blocking(move || db.delete_message(message_id, user_id, &key))
                    .await,
            );
            match result {
                Ok(()) => {
                    let _ = tx.send(ServerFrame::ok());
                    refresh_thread(registry, chat_id, user_id, &v_key).await;
                }
                Err(e) => {
                    let _ = tx.send(ServerFrame::nok(&reason(&e)));
                }
            }
        }
    }
}

/// One chat-list-pool action.
pub(crate) async fn process_chat_list_action(
    registry: &Registry,
    tx: &FrameSender,
    action: ChatListAction,
) {
    match action {
        ChatListAction::GetChats { user_id, v_key } => {
            let db = registry.store();
            let key = v_key.clone();
            match flatten(tokio::task::spawn_blocking(move || db.get_chats(user_id, &key)).await) {
                Ok(chats) => {
                    let _ = tx.send(ServerFrame::Chats { chats });
                }
                Err(e) => {
                    let _ = tx.send(ServerFrame::nok(&reason(&e)));
                }
            }
        }

        ChatListAction::DeleteChat {
            chat_id,
            user_id,
            v_key,
        } => {
            let db = registry.store();
            let key = v_key.clone();
            let result = flatten(
                tokio::task::spawn_blocking(move || db.delete_chat(chat_id, user_id, &key)).await,
            );
            match result {
                Ok(chat) => {
                    let _ = tx.send(ServerFrame::ok());
                    // both former participants, not just the initiator
                    registry
                        .broadcast_chat_list_update(chat.user_from, chat.user_to)
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(ServerFrame::nok(&reason(&e)));
                }
            }
        }
    }
}

/// After a successful mutation: recompute the full thread once with the
/// actor's credentials and push it to every live session of both
/// participants. Full resend, no deltas.
async fn refresh_thread(registry: &Registry, chat_id: i64, user_id: i64, v_key: &str) {
    let db = registry.store();
    let key = v_key.to_string();
    match flatten(tokio::task::spawn_blocking(move || db.get_messages(chat_id, user_id, &key)).await)
    {
        Ok(messages) => {
            registry
                .broadcast_to_participants(chat_id, user_id, v_key, ServerFrame::Messages {
                    messages,
                })
                .await;
        }
        Err(e) => warn!("thread refresh for chat {} failed: {}", chat_id, e),
    }
}

fn flatten<T>(res: Result<StoreResult<T>, tokio::task::JoinError>) -> StoreResult<T> {
    match res {
        Ok(inner) => inner,
        Err(e) => Err(StoreError::Internal(format!("join error: {}", e))),
    }
}

/// What the caller gets to see; store detail stays in the logs.
fn reason(e: &StoreError) -> String {
    match e {
        StoreError::Unauthorized => "Unauthorized".into(),
        StoreError::NotFound => "Not found".into(),
        StoreError::Invalid(msg) => msg.clone(),
        _ => "Server error".into(),
    }
}

fn server_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::Pool;
    use bazaar_db::Database;
    use bazaar_types::events::Ack;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        registry: Registry,
        ana: i64,
        bob: i64,
        chat: i64,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let mut ids = vec![];
        for name in ["ana", "bob"] {
            let id = db
                .with_conn(|conn| {
                    conn.execute(
                        "INSERT INTO users (username, password_hash, email) VALUES (?1, 'x', ?2)",
                        (name, format!("{}@example.com", name)),
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .unwrap();
            ids.push(id);
        }
        let (ana, bob) = (ids[0], ids[1]);
        db.insert_validation_key(ana, "ak").unwrap();
        db.insert_validation_key(bob, "bk").unwrap();

        let item = db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO items (name, price, category_id, condition_id, image_path, author_id)
                     VALUES ('thing', 1.0, 'c', 'new', 'img', ?1)",
                    [bob],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .unwrap();
        let chat = db.create_chat(ana, bob, item, "ak").unwrap();

        Fixture {
            registry: Registry::new(db),
            ana,
            bob,
            chat,
        }
    }

    async fn session(
        fx: &Fixture,
        user_id: i64,
        vkey: &str,
        pool: Pool,
    ) -> (FrameSender, UnboundedReceiver<ServerFrame>) {
        let (handle, mut rx) = fx.registry.register();
        assert!(fx.registry.authorize(&handle, user_id, vkey, pool).await);
        rx.recv().await; // Authorized ack
        (handle.tx.clone(), rx)
    }

    fn expect_ok(frame: Option<ServerFrame>) {
        match frame {
            Some(ServerFrame::System { status, .. }) => assert_eq!(status, Some(Ack::Ok)),
            other => panic!("expected OK ack, got {:?}", other),
        }
    }

    fn expect_nok(frame: Option<ServerFrame>) -> String {
        match frame {
            Some(ServerFrame::System { status, message }) => {
                assert_eq!(status, Some(Ack::Nok));
                message.unwrap_or_default()
            }
            other => panic!("expected NOK ack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_message_acks_then_fans_out_to_both_participants() {
        let fx = fixture();
        let (ana_tx, mut ana_rx) = session(&fx, fx.ana, "ak", Pool::Messages).await;
        let (_bob_tx, mut bob_rx) = session(&fx, fx.bob, "bk", Pool::Messages).await;

        process_message_action(
            &fx.registry,
            &ana_tx,
            MessageAction::SendMessage {
                chat_id: fx.chat,
                message: "is it available?".into(),
                timestamp: Some("2024-11-02 10:00:00".into()),
                author_id: fx.ana,
                v_key: "ak".into(),
            },
        )
        .await;

        // the actor sees the reply before the broadcast
        expect_ok(ana_rx.recv().await);
        match ana_rx.recv().await {
            Some(ServerFrame::Messages { messages }) => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].message, "is it available?");
            }
            other => panic!("expected messages frame, got {:?}", other),
        }

        // the other participant only sees the refreshed thread
        match bob_rx.recv().await {
            Some(ServerFrame::Messages { messages }) => assert_eq!(messages.len(), 1),
            other => panic!("expected messages frame, got {:?}", other),
        }
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bad_token_on_send_is_nok_and_never_broadcast() {
        let fx = fixture();
        let (ana_tx, mut ana_rx) = session(&fx, fx.ana, "ak", Pool::Messages).await;
        let (_bob_tx, mut bob_rx) = session(&fx, fx.bob, "bk", Pool::Messages).await;

        process_message_action(
            &fx.registry,
            &ana_tx,
            MessageAction::SendMessage {
                chat_id: fx.chat,
                message: "spoofed".into(),
                timestamp: None,
                author_id: fx.ana,
                v_key: "bad".into(),
            },
        )
        .await;

        assert_eq!(expect_nok(ana_rx.recv().await), "Unauthorized");
        assert!(ana_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn edit_and_delete_are_author_only_and_refresh_the_thread() {
        let fx = fixture();
        let (ana_tx, mut ana_rx) = session(&fx, fx.ana, "ak", Pool::Messages).await;
        let (bob_tx, mut bob_rx) = session(&fx, fx.bob, "bk", Pool::Messages).await;

        let db = fx.registry.store();
        let id = db
            .create_message(fx.chat, "original", "2024-11-02 10:00:00", fx.ana, "ak")
            .unwrap();

        // bob cannot edit ana's message
        process_message_action(
            &fx.registry,
            &bob_tx,
            MessageAction::EditMessage {
                chat_id: fx.chat,
                message_id: id,
                message: "hijacked".into(),
                author_id: fx.bob,
                v_key: "bk".into(),
            },
        )
        .await;
        assert_eq!(expect_nok(bob_rx.recv().await), "Unauthorized");

        // ana deletes it; both sides converge on the empty thread
        process_message_action(
            &fx.registry,
            &ana_tx,
            MessageAction::DeleteMessage {
                chat_id: fx.chat,
                message_id: id,
                user_id: fx.ana,
                v_key: "ak".into(),
            },
        )
        .await;
        expect_ok(ana_rx.recv().await);
        match ana_rx.recv().await {
            Some(ServerFrame::Messages { messages }) => assert!(messages.is_empty()),
            other => panic!("expected messages frame, got {:?}", other),
        }
        match bob_rx.recv().await {
            Some(ServerFrame::Messages { messages }) => assert!(messages.is_empty()),
            other => panic!("expected messages frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_messages_returns_the_thread_to_the_caller_only() {
        let fx = fixture();
        let (ana_tx, mut ana_rx) = session(&fx, fx.ana, "ak", Pool::Messages).await;
        let (_bob_tx, mut bob_rx) = session(&fx, fx.bob, "bk", Pool::Messages).await;

        process_message_action(
            &fx.registry,
            &ana_tx,
            MessageAction::GetMessages {
                chat_id: fx.chat,
                user_id: fx.ana,
                v_key: "ak".into(),
            },
        )
        .await;

        assert!(matches!(
            ana_rx.recv().await,
            Some(ServerFrame::Messages { .. })
        ));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_chat_notifies_both_former_participants() {
        let fx = fixture();
        let (ana_tx, mut ana_rx) = session(&fx, fx.ana, "ak", Pool::ChatList).await;
        let (_bob_tx, mut bob_rx) = session(&fx, fx.bob, "bk", Pool::ChatList).await;

        process_chat_list_action(
            &fx.registry,
            &ana_tx,
            ChatListAction::DeleteChat {
                chat_id: fx.chat,
                user_id: fx.ana,
                v_key: "ak".into(),
            },
        )
        .await;

        // initiator: OK ack, then refreshed (now empty) list, then notice
        expect_ok(ana_rx.recv().await);
        match ana_rx.recv().await {
            Some(ServerFrame::Chats { chats }) => assert!(chats.is_empty()),
            other => panic!("expected chats frame, got {:?}", other),
        }
        assert!(matches!(
            ana_rx.recv().await,
            Some(ServerFrame::System { status: None, .. })
        ));

        // the other former participant gets the same refresh
        match bob_rx.recv().await {
            Some(ServerFrame::Chats { chats }) => assert!(chats.is_empty()),
            other => panic!("expected chats frame, got {:?}", other),
        }
        assert!(matches!(
            bob_rx.recv().await,
            Some(ServerFrame::System { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn delete_chat_by_non_participant_is_rejected() {
        let fx = fixture();
        let db = fx.registry.store();
        let eve = db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO users (username, password_hash, email) VALUES ('eve', 'x', 'eve@example.com')",
                    [],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .unwrap();
        db.insert_validation_key(eve, "ek").unwrap();

        let (eve_tx, mut eve_rx) = session(&fx, eve, "ek", Pool::ChatList).await;

        process_chat_list_action(
            &fx.registry,
            &eve_tx,
            ChatListAction::DeleteChat {
                chat_id: fx.chat,
                user_id: eve,
                v_key: "ek".into(),
            },
        )
        .await;

        assert_eq!(expect_nok(eve_rx.recv().await), "Unauthorized");
        // the chat is still there
        assert!(db.get_chat(fx.chat, fx.ana, "ak").is_ok());
    }
}
