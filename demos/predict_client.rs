//! Calls every route of the `echo_server` demo and prints the responses.

use predictwire::codec::Codec;
use predictwire::protocol::Content;
use predictwire::value::{ArrayData, NdArray, Value};
use predictwire::PredictClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = PredictClient::connect("127.0.0.1:8500").await?;

    let array = NdArray::new(vec![2, 3], ArrayData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))?;
    let calls = [
        ("/", Content::Empty),
        ("/echo", Content::Text("hello".into())),
        ("/stats", Codec::NumericArray.encode(Value::Array(array))?),
        (
            "/greet",
            Content::Json(r#"{"name": "world", "greeting": "hello"}"#.into()),
        ),
        ("/greet", Content::Json(r#"["there", "hi"]"#.into())),
        ("/greet", Content::Json(r#"{"name": "nobody"}"#.into())),
        ("/nope", Content::Empty),
    ];

    for (path, content) in calls {
        let response = client.call(path, content).await?;
        println!(
            "{path:<8} code={:<3} msg={:?} content={:?}",
            response.code, response.msg, response.content
        );
    }
    Ok(())
}
