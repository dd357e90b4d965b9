//! End-to-end tests over real TCP connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use predictwire::codec::{Codec, MsgPackCodec};
use predictwire::handler::{ApiService, Route};
use predictwire::protocol::{build_frame, flags, Content, FrameBuffer, Header, Response};
use predictwire::value::{ArrayData, Json, NdArray, Value};
use predictwire::{PredictClient, ServeError, Server};

fn service() -> ApiService {
    ApiService::new("integration test service")
        .route(Route::unary("/echo", |v: Value| Ok(v)))
        .route(Route::unary("/kind", |v: Value| Ok(v.kind())))
        .route(Route::nullary("/fail", || -> anyhow::Result<String> {
            bail!("model weights not loaded")
        }))
        .route(
            Route::variadic("/sum", &["a", "b"], |args: Vec<Value>| {
                let mut total = 0.0;
                for arg in args {
                    let Value::Json(v) = arg else {
                        bail!("expected json argument");
                    };
                    total += v.as_f64().unwrap_or_default();
                }
                Ok(json!(total))
            })
            .output_codec(Codec::Json),
        )
        .route(
            Route::unary("/scale", |a: NdArray| {
                let (shape, data) = a.into_parts();
                let ArrayData::F64(values) = data else {
                    bail!("expected float64 input");
                };
                let scaled = values.into_iter().map(|x| x * 10.0).collect::<Vec<_>>();
                Ok(NdArray::new(shape, ArrayData::F64(scaled))?)
            })
            .output_codec(Codec::NumericArray),
        )
        .route(Route::unary("/sleep", |ms: Json<u64>| {
            std::thread::sleep(Duration::from_millis(ms.0));
            Ok(format!("slept {}", ms.0))
        }))
}

async fn start(service: ApiService) -> (Arc<Server>, PredictClient) {
    let server = Arc::new(Server::builder().service(service).build().unwrap());
    let addr = server.start("127.0.0.1", 0).await.unwrap();
    let client = PredictClient::connect(addr).await.unwrap();
    (server, client)
}

fn text(s: &str) -> Content {
    Content::Text(s.to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_echo_text() {
    let (server, client) = start(service()).await;

    let response = client.call("/echo", text("hi")).await.unwrap();
    assert_eq!(response.code, 0);
    assert_eq!(response.msg, "Succ");
    assert_eq!(response.content, text("hi"));

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_path_lists_known_paths() {
    let (server, client) = start(service()).await;

    let response = client.call("/missing", text("hi")).await.unwrap();
    assert_eq!(response.code, -1);
    assert!(response.content.is_empty());
    assert!(response.msg.contains("/missing"));
    assert!(response.msg.contains("/echo"));

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_root_serves_description() {
    let (server, client) = start(service()).await;

    let response = client.call("/", Content::Empty).await.unwrap();
    assert_eq!(response.content, text("integration test service"));

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_does_not_affect_next_request() {
    let (server, client) = start(service()).await;

    let failed = client.call("/fail", Content::Empty).await.unwrap();
    assert_eq!(failed.code, -1);
    assert_eq!(failed.msg, "model weights not loaded");
    assert!(failed.content.is_empty());

    let ok = client.call("/echo", text("still alive")).await.unwrap();
    assert_eq!(ok, Response::success(text("still alive")));

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_codec_inference() {
    let (server, client) = start(service()).await;

    let array = NdArray::new(vec![2], ArrayData::I32(vec![1, 2])).unwrap();
    let tensor = Codec::NumericArray.encode(Value::Array(array)).unwrap();
    let response = client.call("/kind", tensor).await.unwrap();
    assert_eq!(response.content, text("array"));

    let response = client.call("/kind", Content::Empty).await.unwrap();
    assert_eq!(response.content, text("json"));

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tensor_roundtrip_through_handler() {
    let (server, client) = start(service()).await;

    let input = NdArray::new(vec![2, 2], ArrayData::F64(vec![0.5, 1.0, -2.0, 3.25])).unwrap();
    let content = Codec::NumericArray.encode(Value::Array(input)).unwrap();
    let response = client.call("/scale", content).await.unwrap();
    assert!(response.is_success(), "{}", response.msg);

    let expected = NdArray::new(vec![2, 2], ArrayData::F64(vec![5.0, 10.0, -20.0, 32.5])).unwrap();
    assert_eq!(
        Codec::NumericArray.decode(response.content).unwrap(),
        Value::Array(expected)
    );

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_named_and_positional_arguments() {
    let (server, client) = start(service()).await;

    let named = client
        .call("/sum", Content::Json(json!({"a": 1.5, "b": 2}).to_string()))
        .await
        .unwrap();
    assert_eq!(named.content, Content::Json("3.5".into()));

    let positional = client
        .call("/sum", Content::Json(json!([1.5, 2]).to_string()))
        .await
        .unwrap();
    assert_eq!(positional.content, Content::Json("3.5".into()));

    let wrong = client
        .call("/sum", Content::Json(json!([1]).to_string()))
        .await
        .unwrap();
    assert_eq!(wrong.code, -1);

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pipelined_responses_complete_out_of_order() {
    let (server, client) = start(service()).await;
    let slow = async {
        let response = client.call("/sleep", Content::Json("300".into())).await.unwrap();
        (response, Instant::now())
    };
    let fast = async {
        let response = client.call("/echo", text("fast")).await.unwrap();
        (response, Instant::now())
    };
    let ((slow, slow_done), (fast, fast_done)) = tokio::join!(slow, fast);

    assert_eq!(slow.content, text("slept 300"));
    assert_eq!(fast.content, text("fast"));
    assert!(fast_done < slow_done);

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_bounds_concurrency() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let route = {
        let active = active.clone();
        let peak = peak.clone();
        Route::nullary("/work", move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok("done")
        })
    };

    let server = Arc::new(Server::builder().route(route).max_workers(2).build().unwrap());
    let addr = server.start("127.0.0.1", 0).await.unwrap();
    let client = Arc::new(PredictClient::connect(addr).await.unwrap());

    let calls: Vec<_> = (0..6)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.call("/work", Content::Empty).await })
        })
        .collect();
    for call in calls {
        assert!(call.await.unwrap().unwrap().is_success());
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_lets_in_flight_request_finish() {
    let (server, client) = start(service()).await;
    let addr = server.local_addr().unwrap();

    let in_flight = tokio::spawn(async move { client.call("/sleep", Content::Json("200".into())).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.stop();
    server.wait().await.unwrap();
    assert!(!server.is_running());

    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.content, text("slept 200"));

    assert!(PredictClient::connect(addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_call_after_server_stopped_reports_closed() {
    let (server, client) = start(service()).await;
    assert!(client.call("/echo", text("before")).await.unwrap().is_success());

    server.stop();
    server.wait().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(3), client.call("/echo", text("after")))
        .await
        .expect("call after stop must not hang");
    assert!(matches!(result, Err(ServeError::ConnectionClosed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_drops_request_waiting_for_worker() {
    let server = Arc::new(
        Server::builder()
            .service(service())
            .max_workers(1)
            .build()
            .unwrap(),
    );
    let addr = server.start("127.0.0.1", 0).await.unwrap();
    let client = Arc::new(PredictClient::connect(addr).await.unwrap());

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call("/sleep", Content::Json("300".into())).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let queued = {
        let client = client.clone();
        tokio::spawn(async move { client.call("/echo", text("queued")).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    server.stop();
    tokio::time::timeout(Duration::from_secs(5), server.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(slow.await.unwrap().unwrap().content, text("slept 300"));
    assert!(matches!(
        queued.await.unwrap(),
        Err(ServeError::ConnectionClosed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_returns_after_stop() {
    let server = Arc::new(Server::builder().service(service()).build().unwrap());

    let runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run("127.0.0.1", 0).await })
    };
    while server.local_addr().is_none() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    server.stop();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_method_answered_with_failure() {
    let (server, _client) = start(service()).await;
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();

    let header = Header::new(7, flags::REQUEST, 42, 0);
    stream.write_all(&build_frame(&header, &[])).await.unwrap();

    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 4096];
    let frame = loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before response");
        if let Some(frame) = frames.push(&buf[..n]).unwrap().into_iter().next() {
            break frame;
        }
    };

    assert_eq!(frame.method_id(), 7);
    assert_eq!(frame.request_id(), 42);
    assert!(frame.is_response());
    let response: Response = MsgPackCodec::decode(&frame.payload).unwrap();
    assert_eq!(response.code, -1);
    assert_eq!(response.msg, "Unknown method id: 7");

    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_protocol_error_closes_only_that_connection() {
    let (server, client) = start(service()).await;
    let mut bad = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();

    // Method id 0 is reserved.
    let header = Header::new(0, flags::REQUEST, 1, 0);
    bad.write_all(&build_frame(&header, &[])).await.unwrap();

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), bad.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    let response = client.call("/echo", text("unaffected")).await.unwrap();
    assert_eq!(response.content, text("unaffected"));

    server.stop();
}
