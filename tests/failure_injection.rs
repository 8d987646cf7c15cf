//! Failure injection tests: broken upstreams and unrenderable headers must
//! degrade into error responses, never take the gateway down.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tower::ServiceExt;

use subgate::Shutdown;

mod common;
use common::*;

async fn serve(gateway: subgate::GatewayServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        let _ = gateway.run(listener, &stop).await;
    });
    settle().await;
    (addr, shutdown)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        (200, "too late".to_string())
    })
    .await;
    let (addr, shutdown) = serve(gateway(&format!(
        "[timeouts]\nrequest_secs = 1\n\n[upstreams.app]\nurl = \"http://{backend}\"\n"
    )))
    .await;

    let res = client()
        .get(format!("http://{addr}/"))
        .header("host", "app.example.com")
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 504);

    shutdown.trigger();
}

#[tokio::test]
async fn silent_websocket_upstream_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    let (addr, shutdown) = serve(gateway(&format!(
        "[timeouts]\nrequest_secs = 1\n\n[upstreams.chat]\nwebsocket = \"ws://{backend}\"\n"
    )))
    .await;

    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("host", "chat.example.com".parse().unwrap());
    let attempt = tokio::time::timeout(
        Duration::from_secs(5),
        tokio_tungstenite::connect_async(request),
    )
    .await
    .expect("gateway never answered the upgrade");
    match attempt {
        Err(tokio_tungstenite::tungstenite::Error::Http(res)) => {
            assert_eq!(res.status(), 504)
        }
        other => panic!("unexpected handshake result: {:?}", other.map(|(_, res)| res.status())),
    }

    shutdown.trigger();
}

#[tokio::test]
async fn upstream_hangup_is_bad_gateway() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.write_all(b"garbage\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    });
    let (addr, shutdown) = serve(gateway(&format!(
        "[upstreams.app]\nurl = \"http://{backend}\"\n"
    )))
    .await;

    let res = client()
        .get(format!("http://{addr}/"))
        .header("host", "app.example.com")
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 502);

    // The gateway keeps serving after upstream failures.
    let res = client()
        .get(format!("http://{addr}/"))
        .header("host", "nope.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);

    shutdown.trigger();
}

#[tokio::test]
async fn unrenderable_header_is_internal_error() {
    let (backend, recorded) = start_recording_backend("ok").await;
    let gateway = gateway(&format!(
        "[upstreams.app]\nurl = \"http://{backend}\"\nauth = true\n\n[upstreams.app.headers]\n\"X-User\" = [\"{{{{ session.user }}}}\"]\n"
    ));

    let res = gateway
        .router()
        .oneshot(get("app.example.com", "/", None))
        .await
        .unwrap();
    let state = oauth_state(&location(&res));
    let pending = cookie_pair(&res);
    let res = gateway
        .router()
        .oneshot(get(
            "oauth.example.com",
            &format!("/authorized?code=crlf&state={state}"),
            Some(&pending),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    let cookie = cookie_pair(&res);

    let res = gateway
        .router()
        .oneshot(get("app.example.com", "/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(recorded.lock().unwrap().is_empty());
}
