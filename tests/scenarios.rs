//! End-to-end scenario tests (S1-S6), run against a real `Session`/
//! `Registry` pair over a loopback `TcpListener`, exercising the socket
//! layer directly rather than mocking it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chatrelay::codec::{
    ChatMessage, DisconnectRequest, FileSendComplete, FileSendRequest, Packet, RegisterName,
    UpdateName, Whisper,
};
use chatrelay::connection::{Connection, OutboundHandle};
use chatrelay::filechunk::FileChunk;
use chatrelay::frame::{FrameType, RawFrame};
use chatrelay::{run_server, ChatError, Registry};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server() -> (SocketAddr, Arc<Registry>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(Registry::new());
    let server_registry = registry.clone();
    tokio::spawn(async move {
        run_server(listener, server_registry).await;
    });
    (addr, registry)
}

async fn connect(addr: SocketAddr) -> (Connection, OutboundHandle) {
    let socket = TcpStream::connect(addr).await.unwrap();
    Connection::new(socket)
}

async fn read_frame(conn: &mut Connection) -> RawFrame {
    conn.read_frame().await.unwrap().expect("connection closed unexpectedly")
}

async fn read_packet(conn: &mut Connection) -> Packet {
    let frame = read_frame(conn).await;
    assert_eq!(frame.frame_type, FrameType::Json);
    Packet::decode(&frame.payload).unwrap()
}

fn expect_register_success(packet: Packet) -> (String, String) {
    match packet {
        Packet::RegisterNameSuccess(body) => (body.id, body.name),
        other => panic!("expected REGISTER_NAME_SUCCESS, got {other:?}"),
    }
}

/// S1: register + broadcast.
#[tokio::test]
async fn register_and_broadcast() {
    let (addr, registry) = spawn_server().await;

    let (mut a_conn, a_out) = connect(addr).await;
    assert!(matches!(read_packet(&mut a_conn).await, Packet::ConnectSuccess(_)));

    let (mut b_conn, b_out) = connect(addr).await;
    assert!(matches!(read_packet(&mut b_conn).await, Packet::ConnectSuccess(_)));

    a_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
        .await
        .unwrap();
    let (id_a, name_a) = expect_register_success(read_packet(&mut a_conn).await);
    assert_eq!(name_a, "Alice");

    b_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Bob".into() }))
        .await
        .unwrap();

    match read_packet(&mut a_conn).await {
        Packet::UserEntered(body) => assert_eq!(body.name, "Bob"),
        other => panic!("expected USER_ENTERED, got {other:?}"),
    }
    let (id_b, name_b) = expect_register_success(read_packet(&mut b_conn).await);
    assert_eq!(name_b, "Bob");

    a_out
        .send_packet(&Packet::ChatMessage(ChatMessage { sender: String::new(), message: "hi".into() }))
        .await
        .unwrap();

    match read_packet(&mut b_conn).await {
        Packet::ChatMessage(body) => {
            assert_eq!(body.sender, "Alice");
            assert_eq!(body.message, "hi");
        }
        other => panic!("expected CHAT_MESSAGE, got {other:?}"),
    }

    let alice = registry.lookup(&id_a).unwrap();
    let bob = registry.lookup(&id_b).unwrap();
    assert_eq!(alice.data.sent(), 1);
    assert_eq!(bob.data.received(), 1);
}

/// S2: duplicate name.
#[tokio::test]
async fn duplicate_name_is_rejected() {
    let (addr, registry) = spawn_server().await;

    let (mut a_conn, a_out) = connect(addr).await;
    read_packet(&mut a_conn).await;
    a_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
        .await
        .unwrap();
    let (id_a, _) = expect_register_success(read_packet(&mut a_conn).await);

    let (mut b_conn, b_out) = connect(addr).await;
    read_packet(&mut b_conn).await;
    b_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
        .await
        .unwrap();

    match read_packet(&mut b_conn).await {
        Packet::NameCannotBeDuplicated(_) => {}
        other => panic!("expected NAME_CANNOT_BE_DUPLICATED, got {other:?}"),
    }

    let alice = registry.find_by_name("Alice").unwrap();
    assert_eq!(alice.data.id, id_a);
}

/// S3: rename.
#[tokio::test]
async fn rename_broadcasts_to_everyone() {
    let (addr, _registry) = spawn_server().await;

    let (mut a_conn, a_out) = connect(addr).await;
    read_packet(&mut a_conn).await;
    a_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
        .await
        .unwrap();
    expect_register_success(read_packet(&mut a_conn).await);

    let (mut b_conn, b_out) = connect(addr).await;
    read_packet(&mut b_conn).await;
    b_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Bob".into() }))
        .await
        .unwrap();
    assert!(matches!(read_packet(&mut a_conn).await, Packet::UserEntered(_)));
    expect_register_success(read_packet(&mut b_conn).await);

    a_out
        .send_packet(&Packet::UpdateName(UpdateName { new_name: "Alicia".into() }))
        .await
        .unwrap();

    match read_packet(&mut a_conn).await {
        Packet::UpdateNameSuccess(body) => {
            assert_eq!(body.old_name, "Alice");
            assert_eq!(body.new_name, "Alicia");
        }
        other => panic!("expected UPDATE_NAME_SUCCESS, got {other:?}"),
    }
    match read_packet(&mut b_conn).await {
        Packet::UpdateNameSuccess(body) => {
            assert_eq!(body.old_name, "Alice");
            assert_eq!(body.new_name, "Alicia");
        }
        other => panic!("expected UPDATE_NAME_SUCCESS, got {other:?}"),
    }
}

/// S4: whisper to an absent user.
#[tokio::test]
async fn whisper_to_absent_user() {
    let (addr, registry) = spawn_server().await;

    let (mut a_conn, a_out) = connect(addr).await;
    read_packet(&mut a_conn).await;
    a_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
        .await
        .unwrap();
    let (id_a, _) = expect_register_success(read_packet(&mut a_conn).await);

    a_out
        .send_packet(&Packet::Whisper(Whisper {
            sender: String::new(),
            target: "Ghost".into(),
            message: "hey".into(),
        }))
        .await
        .unwrap();

    match read_packet(&mut a_conn).await {
        Packet::UserNotExists(_) => {}
        other => panic!("expected USER_NOT_EXISTS, got {other:?}"),
    }

    let alice = registry.lookup(&id_a).unwrap();
    assert_eq!(alice.data.sent(), 0);
    assert_eq!(alice.data.received(), 0);
}

/// S5: file relay, with a chat message interleaved mid-transfer.
#[tokio::test]
async fn file_relay_preserves_order_and_bytes() {
    let (addr, _registry) = spawn_server().await;

    let (mut a_conn, a_out) = connect(addr).await;
    read_packet(&mut a_conn).await;
    a_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
        .await
        .unwrap();
    expect_register_success(read_packet(&mut a_conn).await);

    let (mut b_conn, b_out) = connect(addr).await;
    read_packet(&mut b_conn).await;
    b_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Bob".into() }))
        .await
        .unwrap();
    assert!(matches!(read_packet(&mut a_conn).await, Packet::UserEntered(_)));
    expect_register_success(read_packet(&mut b_conn).await);

    a_out
        .send_packet(&Packet::FileSendRequest(FileSendRequest {
            target: "Bob".into(),
            transfer_id: "T1".into(),
            file_name: "x.bin".into(),
            file_size: 131072,
        }))
        .await
        .unwrap();

    a_out
        .send_packet(&Packet::ChatMessage(ChatMessage {
            sender: String::new(),
            message: "sending now".into(),
        }))
        .await
        .unwrap();

    let chunk0 = FileChunk { transfer_id: "T1".into(), seq: 0, data: vec![0xAAu8; 65536].into() };
    let chunk1 = FileChunk { transfer_id: "T1".into(), seq: 1, data: vec![0xBBu8; 65536].into() };
    a_out.send_file_chunk(&chunk0).await.unwrap();
    a_out.send_file_chunk(&chunk1).await.unwrap();

    a_out
        .send_packet(&Packet::FileSendComplete(FileSendComplete { transfer_id: "T1".into() }))
        .await
        .unwrap();

    match read_packet(&mut b_conn).await {
        Packet::FileSendRequest(body) => {
            assert_eq!(body.target, "Bob");
            assert_eq!(body.transfer_id, "T1");
            assert_eq!(body.file_size, 131072);
        }
        other => panic!("expected FILE_SEND_REQUEST, got {other:?}"),
    }

    match read_packet(&mut b_conn).await {
        Packet::ChatMessage(body) => assert_eq!(body.message, "sending now"),
        other => panic!("expected interleaved CHAT_MESSAGE, got {other:?}"),
    }

    let frame0 = read_frame(&mut b_conn).await;
    assert_eq!(frame0.frame_type, FrameType::FileChunk);
    let decoded0 = FileChunk::decode(frame0.payload).unwrap();
    assert_eq!(decoded0.seq, 0);
    assert_eq!(decoded0.data.as_ref(), chunk0.data.as_ref());

    let frame1 = read_frame(&mut b_conn).await;
    assert_eq!(frame1.frame_type, FrameType::FileChunk);
    let decoded1 = FileChunk::decode(frame1.payload).unwrap();
    assert_eq!(decoded1.seq, 1);
    assert_eq!(decoded1.data.as_ref(), chunk1.data.as_ref());

    match read_packet(&mut b_conn).await {
        Packet::FileSendComplete(body) => assert_eq!(body.transfer_id, "T1"),
        other => panic!("expected FILE_SEND_COMPLETE, got {other:?}"),
    }
}

/// S6: disconnect accounting.
#[tokio::test]
async fn disconnect_reports_accurate_counters() {
    let (addr, registry) = spawn_server().await;

    let (mut a_conn, a_out) = connect(addr).await;
    read_packet(&mut a_conn).await;
    a_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
        .await
        .unwrap();
    let (id_a, _) = expect_register_success(read_packet(&mut a_conn).await);

    let (mut b_conn, b_out) = connect(addr).await;
    read_packet(&mut b_conn).await;
    b_out
        .send_packet(&Packet::RegisterName(RegisterName { name: "Bob".into() }))
        .await
        .unwrap();
    assert!(matches!(read_packet(&mut a_conn).await, Packet::UserEntered(_)));
    expect_register_success(read_packet(&mut b_conn).await);

    for i in 0..3 {
        a_out
            .send_packet(&Packet::ChatMessage(ChatMessage {
                sender: String::new(),
                message: format!("msg {i}"),
            }))
            .await
            .unwrap();
        assert!(matches!(read_packet(&mut b_conn).await, Packet::ChatMessage(_)));
    }

    for i in 0..2 {
        b_out
            .send_packet(&Packet::Whisper(Whisper {
                sender: String::new(),
                target: "Alice".into(),
                message: format!("psst {i}"),
            }))
            .await
            .unwrap();
        assert!(matches!(read_packet(&mut a_conn).await, Packet::WhisperToTarget(_)));
        assert!(matches!(read_packet(&mut b_conn).await, Packet::WhisperToSender(_)));
    }

    let alice = registry.lookup(&id_a).unwrap();
    assert_eq!(alice.data.sent(), 3);
    assert_eq!(alice.data.received(), 2);

    a_out.send_packet(&Packet::DisconnectRequest(DisconnectRequest::default())).await.unwrap();

    match read_packet(&mut b_conn).await {
        Packet::DisconnectInfo(body) => {
            assert_eq!(body.target, "Alice");
            assert_eq!(body.sent, 3);
            assert_eq!(body.received, 2);
        }
        other => panic!("expected DISCONNECT_INFO, got {other:?}"),
    }

    // Give the session's teardown a moment to remove it from the registry.
    for _ in 0..50 {
        if registry.lookup(&id_a).is_none() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(registry.lookup(&id_a).is_none());
}

/// Concurrent registration race (§4.4, §8 invariant 2): N clients all try
/// to claim the same name at once. The scan-then-assign must happen under
/// one lock acquisition in the registry, so exactly one wins and the rest
/// see `NAME_CANNOT_BE_DUPLICATED` — never two successes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_of_same_name_has_one_winner() {
    let (addr, _registry) = spawn_server().await;
    const CONTENDERS: usize = 8;

    let mut conns = Vec::new();
    for _ in 0..CONTENDERS {
        let (mut conn, out) = connect(addr).await;
        assert!(matches!(read_packet(&mut conn).await, Packet::ConnectSuccess(_)));
        conns.push((conn, out));
    }

    let mut tasks = Vec::new();
    for (_, out) in &conns {
        let out = out.clone();
        tasks.push(tokio::spawn(async move {
            out.send_packet(&Packet::RegisterName(RegisterName { name: "Alice".into() }))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut successes = 0;
    let mut duplicates = 0;
    for (mut conn, _) in conns {
        match read_packet(&mut conn).await {
            Packet::RegisterNameSuccess(body) => {
                assert_eq!(body.name, "Alice");
                successes += 1;
            }
            Packet::NameCannotBeDuplicated(_) => duplicates += 1,
            other => panic!("unexpected reply to REGISTER_NAME: {other:?}"),
        }
    }

    assert_eq!(successes, 1, "exactly one contender should win the name");
    assert_eq!(duplicates, CONTENDERS - 1);
}

/// BACKPRESSURE (§7): when a peer stops reading, enqueuing onto its
/// outbound queue eventually times out as `BACKPRESSURE`. Exercises
/// `OutboundHandle::close()` directly: the writer task is almost certainly
/// parked mid-`write_frame` (blocked on a full send buffer), not in its
/// `select!`, when `close()` runs — so the notification must not be lost.
#[tokio::test]
async fn backpressure_close_actually_closes_the_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let a_socket = TcpStream::connect(addr).await.unwrap();
    let mut b_socket = accept.await.unwrap();

    let (_a_conn, a_out) = Connection::new(a_socket);

    // Flood chunks without B ever reading, until the writer genuinely
    // can't keep up and a send times out as BACKPRESSURE.
    let payload = Bytes::from(vec![0xABu8; 64 * 1024]);
    let mut saw_backpressure = false;
    for _ in 0..4096 {
        match a_out.send_raw_chunk(payload.clone()).await {
            Ok(()) => {}
            Err(ChatError::Backpressure) => {
                saw_backpressure = true;
                break;
            }
            Err(other) => panic!("unexpected error before backpressure: {other}"),
        }
    }
    assert!(saw_backpressure, "expected a send to eventually time out as BACKPRESSURE");

    a_out.close();

    // If the close notification were lost (the pre-fix `notify_waiters`
    // behavior), this read would hang forever; bound it so a regression
    // fails the test instead of the suite.
    let mut buf = [0u8; 4096];
    let closed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let n = b_socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "peer socket did not close after OutboundHandle::close()");
}
