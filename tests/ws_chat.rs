//! End-to-end chat scenarios over real WebSocket connections.

use chatroom::api::{serve_on, ApiConfig, AppState};
use chatroom::hub::{ChatHub, HubConfig, Message, MessageKind};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

struct TestServer {
    addr: SocketAddr,
    hub: ChatHub,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::with_config(HubConfig::default()).await
    }

    async fn with_config(config: HubConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = ChatHub::start(config);
        let state = AppState::new(hub.clone(), ApiConfig::new("127.0.0.1", addr.port()));

        let (shutdown, rx) = oneshot::channel::<()>();
        tokio::spawn(serve_on(listener, state, async {
            let _ = rx.await;
        }));

        Self {
            addr,
            hub,
            _shutdown: shutdown,
        }
    }

    async fn connect(&self) -> Client {
        let url = format!("ws://{}/ws", self.addr);
        let (ws, _) = connect_async(url).await.expect("websocket connect failed");
        Client { ws }
    }

    /// Connect, join as `name` and return the presence list received
    ///
    /// Broadcasts already in flight may reach the new connection before its
    /// presence reply, so anything ahead of it is skipped.
    async fn join(&self, name: &str) -> (Client, Vec<String>) {
        let mut client = self.connect().await;
        client.send_json(&format!(r#"{{"type":"join","name":"{}"}}"#, name)).await;

        let users = loop {
            let message = client.next().await.expect("no presence reply");
            if message.kind == MessageKind::Presence {
                break message.users;
            }
        };

        // Our own join notice marks the end of the handshake
        let own_notice = format!("{} 加入了聊天室", name);
        loop {
            let message = client.next().await.expect("no join notice");
            if message.kind == MessageKind::Join && message.content == own_notice {
                break;
            }
        }

        (client, users)
    }
}

struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    async fn send_json(&mut self, json: &str) {
        self.ws.send(WsMessage::Text(json.to_string())).await.unwrap();
    }

    async fn say(&mut self, content: &str) {
        self.send_json(&format!(r#"{{"type":"message","content":"{}"}}"#, content))
            .await;
    }

    /// Next chat message, or None once the server closed the connection
    async fn next(&mut self) -> Option<Message> {
        loop {
            let frame = timeout(Duration::from_secs(2), self.ws.next())
                .await
                .expect("receive timed out");

            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    return Some(serde_json::from_str(&text).expect("invalid message json"))
                }
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(other)) => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    async fn assert_silent(&mut self) {
        assert!(
            timeout(Duration::from_millis(150), self.ws.next()).await.is_err(),
            "expected no frame"
        );
    }
}

async fn wait_for_online(hub: &ChatHub, expected: &[&str]) {
    for _ in 0..50 {
        if hub.registry().online_users().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "online users never became {:?}, got {:?}",
        expected,
        hub.registry().online_users().await
    );
}

#[tokio::test]
async fn first_user_sees_empty_room() {
    let server = TestServer::start().await;

    let (_alice, users) = server.join("Alice").await;

    assert!(users.is_empty());
    wait_for_online(&server.hub, &["Alice"]).await;
}

#[tokio::test]
async fn second_user_sees_first_and_join_is_announced() {
    let server = TestServer::start().await;
    let (mut alice, _) = server.join("Alice").await;

    let (_bob, users) = server.join("Bob").await;
    assert_eq!(users, vec!["Alice"]);

    let notice = alice.next().await.unwrap();
    assert_eq!(notice.kind, MessageKind::Join);
    assert_eq!(notice.name, "");
    assert_eq!(notice.content, "Bob 加入了聊天室");
}

#[tokio::test]
async fn chat_reaches_everyone_including_sender() {
    let server = TestServer::start().await;
    let (mut alice, _) = server.join("Alice").await;
    let (mut bob, _) = server.join("Bob").await;
    alice.next().await.unwrap(); // Bob's join notice

    alice.say("hi").await;

    for client in [&mut alice, &mut bob] {
        let msg = client.next().await.unwrap();
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.name, "Alice");
        assert_eq!(msg.content, "hi");
    }
    alice.assert_silent().await;
    bob.assert_silent().await;
}

#[tokio::test]
async fn abrupt_disconnect_notifies_remaining_users() {
    let server = TestServer::start().await;
    let (alice, _) = server.join("Alice").await;
    let (mut bob, _) = server.join("Bob").await;

    drop(alice);

    let notice = bob.next().await.unwrap();
    assert_eq!(notice.kind, MessageKind::Leave);
    assert_eq!(notice.content, "Alice 離開了聊天室");

    let presence = bob.next().await.unwrap();
    assert_eq!(presence.kind, MessageKind::Presence);
    assert!(presence.users.is_empty());

    wait_for_online(&server.hub, &["Bob"]).await;
}

#[tokio::test]
async fn empty_name_is_closed_without_broadcast() {
    let server = TestServer::start().await;
    let (mut alice, _) = server.join("Alice").await;

    let mut anon = server.connect().await;
    anon.send_json(r#"{"type":"join","name":""}"#).await;

    assert!(anon.next().await.is_none());
    alice.assert_silent().await;
    assert_eq!(server.hub.registry().connection_count().await, 1);
}

#[tokio::test]
async fn malformed_handshake_is_closed() {
    let server = TestServer::start().await;

    let mut client = server.connect().await;
    client.send_json("not json").await;

    assert!(client.next().await.is_none());
    assert_eq!(server.hub.registry().connection_count().await, 0);
}

#[tokio::test]
async fn full_room_refuses_new_connections() {
    let server = TestServer::with_config(HubConfig {
        max_connections: 1,
        ..Default::default()
    })
    .await;
    let (mut alice, _) = server.join("Alice").await;

    let mut bob = server.connect().await;
    bob.send_json(r#"{"type":"join","name":"Bob"}"#).await;

    assert!(bob.next().await.is_none());
    alice.assert_silent().await;
}

#[tokio::test]
async fn churn_leaves_registry_consistent() {
    let server = TestServer::start().await;
    let (mut watcher, _) = server.join("Watcher").await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let url = format!("ws://{}/ws", server.addr);
        tasks.push(tokio::spawn(async move {
            let (mut ws, _) = connect_async(url).await.unwrap();
            let join = format!(r#"{{"type":"join","name":"guest{}"}}"#, i);
            ws.send(WsMessage::Text(join)).await.unwrap();
            // Wait for the presence reply, then hang up
            ws.next().await.unwrap().unwrap();
            let _ = ws.close(None).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    wait_for_online(&server.hub, &["Watcher"]).await;

    // Drain everything the watcher was sent during the churn
    let mut joins = 0;
    let mut leaves = 0;
    let mut presences = 0;
    while let Ok(Some(Ok(frame))) = timeout(Duration::from_millis(300), watcher.ws.next()).await {
        let WsMessage::Text(text) = frame else { continue };
        let msg: Message = serde_json::from_str(&text).unwrap();
        match msg.kind {
            MessageKind::Join => joins += 1,
            MessageKind::Leave => leaves += 1,
            MessageKind::Presence => {
                assert!(!msg.users.contains(&"Watcher".to_string()));
                presences += 1;
            }
            MessageKind::Chat => panic!("unexpected chat"),
        }
    }

    // Guests evicted by a failed send leave without a notice
    assert_eq!(joins, 8);
    assert_eq!(leaves, presences);
    assert!(leaves <= 8);
    assert_eq!(server.hub.registry().connection_count().await, 1);
}
