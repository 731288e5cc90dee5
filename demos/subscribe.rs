use futures_util::StreamExt;
use graphql_ws_session::{ws::message::SubscribePayload, Client, TungsteniteTransport};

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let endpoint = std::env::var("GRAPHQL_WS_URL")
        .map_err(|_| {
            println!("No GRAPHQL_WS_URL env var or invalid");
            std::process::exit(1);
        })
        .unwrap();

    let query = std::env::var("GRAPHQL_QUERY").unwrap_or_else(|_| "subscription { count }".into());

    let transport = TungsteniteTransport::new(&endpoint).unwrap();
    let client = Client::builder(transport)
        .connection_params(serde_json::json!({}))
        .build();

    let ack = client.start().unwrap().await.unwrap();
    println!("Session acknowledged, payload: {:?}", ack);

    let mut subscription = client.subscribe(SubscribePayload::new(query));
    println!("Subscribed as {}", subscription.id());

    let mut received = 0;
    while let Some(item) = subscription.next().await {
        match item {
            Ok(result) => println!("{}", result.data),
            Err(err) => {
                println!("Subscription failed: {}", err);
                break;
            }
        }

        received += 1;
        if received == 10 {
            subscription.cancel();
        }
    }

    println!("Subscription ended with status {:?}", subscription.status());

    client.stop();
}
