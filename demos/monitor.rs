use std::env;
use std::time::Duration;

use daikin_lan::{Credentials, MessageLogMode, Reading, Resolver};

fn show<T: std::fmt::Display>(reading: Reading<T>) -> String {
    match reading {
        Reading::Value(v) => v.to_string(),
        Reading::Absent => "-".to_string(),
        Reading::Unsupported => "n/a".to_string(),
    }
}

#[tokio::main]
async fn main() -> daikin_lan::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args
        .get(1)
        .expect("usage: monitor <host> [--key KEY] [--password PASS] [--log FILE]");
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let credentials = Credentials {
        key: flag("--key"),
        password: flag("--password"),
        uuid: None,
    };
    let mut builder = Resolver::builder()
        .credentials(credentials)
        .on_change(|change| {
            println!(
                "{} [{}]: {} -> {}",
                change.field,
                change.resource,
                change.old.as_deref().unwrap_or("-"),
                change.new,
            );
        });
    if let Some(path) = flag("--log") {
        builder = builder.message_log(MessageLogMode::Diffed, path);
    }
    let resolver = builder.build();

    println!("Resolving {host}...");
    let mut session = resolver.resolve(host).await?;
    println!("Resolved as {:?} at {}", session.dialect(), session.base_url());

    loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        if let Err(e) = session.refresh().await {
            eprintln!("Refresh error: {e}");
            continue;
        }
        println!(
            "[{}] mode: {} | inside: {} | outside: {} | target: {} | fan: {} | power: {} kW",
            show(session.name()),
            show(session.mode()),
            show(session.inside_temperature()),
            show(session.outside_temperature()),
            show(session.target_temperature()),
            show(session.fan_rate()),
            show(session.current_total_power()),
        );
    }
}
