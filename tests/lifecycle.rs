//! Server state machine, bind failures and the drain deadline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{app, get, localhost, read_reply, send, start};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use waypost::{Error, Request, ServerConfig, ServerState, echo, handler_fn};

#[tokio::test]
async fn start_on_busy_address_fails() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = occupied.local_addr().unwrap();

    let mut server = waypost::Server::new(ServerConfig::new(addr));
    let err = server.start(app(false, handler_fn(echo::correlation_id))).await.unwrap_err();

    assert!(matches!(err, Error::Bind { addr: failed, .. } if failed == addr), "{err}");
    assert_eq!(server.state(), ServerState::Failed);
    assert_eq!(server.local_addr(), None);

    let again = server.start(app(false, handler_fn(echo::correlation_id))).await.unwrap_err();
    assert!(matches!(again, Error::IllegalState { state: ServerState::Failed, .. }));
    assert!(matches!(server.stop().await, Err(Error::IllegalState { .. })));
}

#[tokio::test]
async fn second_start_is_illegal() {
    let (mut server, addr) = start(app(false, handler_fn(echo::correlation_id)), localhost()).await;
    assert_eq!(server.state(), ServerState::Listening);
    assert_eq!(server.local_addr(), Some(addr));
    assert_ne!(addr.port(), 0);

    let err = server.start(app(false, handler_fn(echo::correlation_id))).await.unwrap_err();
    assert!(matches!(
        err,
        Error::IllegalState { operation: "start", state: ServerState::Listening }
    ));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn second_stop_is_illegal() {
    let (mut server, _) = start(app(false, handler_fn(echo::correlation_id)), localhost()).await;

    server.stop().await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);

    let err = server.stop().await.unwrap_err();
    assert!(matches!(
        err,
        Error::IllegalState { operation: "stop", state: ServerState::Stopped }
    ));
    assert!(matches!(server.wait().await, Err(Error::IllegalState { .. })));
}

#[tokio::test]
async fn stopped_server_refuses_connections() {
    let (mut server, addr) = start(app(false, handler_fn(echo::correlation_id)), localhost()).await;
    assert_eq!(get(addr, &[]).await.unwrap().status, 200);

    server.stop().await.unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn stop_drains_in_flight_requests() {
    let started = Arc::new(Notify::new());
    let slow = {
        let started = Arc::clone(&started);
        handler_fn(move |req: Request| {
            let started = Arc::clone(&started);
            async move {
                started.notify_one();
                tokio::time::sleep(Duration::from_millis(200)).await;
                echo::correlation_id(req).await
            }
        })
    };
    let config = localhost().grace_period(Duration::from_secs(5));
    let (mut server, addr) = start(app(false, slow), config).await;

    let client = tokio::spawn(async move { get(addr, &[("X-Request-ID", "slow")]).await });
    started.notified().await;

    server.stop().await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);

    let reply = client.await.unwrap().unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(reply.text(), "My Request-Id: slow\n");
}

#[tokio::test]
async fn idle_connections_do_not_hold_up_shutdown() {
    let config = localhost().grace_period(Duration::from_secs(5));
    let (mut server, addr) = start(app(false, handler_fn(echo::correlation_id)), config).await;

    let _idle = TcpStream::connect(addr).await.unwrap();
    tokio::task::yield_now().await;

    let stop = tokio::time::timeout(Duration::from_secs(2), server.stop()).await;
    assert!(matches!(stop, Ok(Ok(()))));
}

#[tokio::test]
async fn stop_times_out_on_a_stuck_handler() {
    let started = Arc::new(Notify::new());
    let stuck = {
        let started = Arc::clone(&started);
        handler_fn(move |_req: Request| {
            let started = Arc::clone(&started);
            async move {
                started.notify_one();
                std::future::pending::<&'static str>().await
            }
        })
    };
    let grace = Duration::from_millis(200);
    let (mut server, addr) = start(app(false, stuck), localhost().grace_period(grace)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, &[]).await.unwrap();
    started.notified().await;

    let err = server.stop().await.unwrap_err();
    assert!(matches!(err, Error::ShutdownTimeout(d) if d == grace), "{err}");
    assert_eq!(server.state(), ServerState::Stopped);

    // The connection was closed under the client without a response.
    assert!(read_reply(&mut stream).await.is_err());
}
