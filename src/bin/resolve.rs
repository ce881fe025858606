//! `uni-resolve`: show the request a model/task pair resolves to.
//!
//! Usage:
//!
//! ```text
//! uni-resolve <model> --task <task> [--provider <name|auto>] [--endpoint-url <url>]
//!             [--inputs <text>] [--args <json object>] [--send]
//! ```
//!
//! Without `--send` nothing is sent to the provider; hub lookups (mapping,
//! default model, pipeline tag) still happen. Credential headers are
//! redacted in the printed request.

use std::process;
use uni_inference::api::{InferenceTask, Options, ProviderPolicy, RequestArgs};
use uni_inference::client::InferenceClient;
use uni_inference::error::HttpRequestSnapshot;
use uni_inference::transport::Body;

fn print_usage() {
    eprintln!("Usage: uni-resolve <model> --task <task> [OPTIONS]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <model>                Hub model id (omit with --endpoint-url)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --task <task>          Task name, e.g. conversational, text-to-image");
    eprintln!("  --provider <name>      Provider name or 'auto' (default)");
    eprintln!("  --endpoint-url <url>   Send to a dedicated endpoint instead of a model");
    eprintln!("  --inputs <text>        Value of the `inputs` argument");
    eprintln!("  --args <json>          Extra arguments, merged at the top level");
    eprintln!("  --send                 Also run the request and print the output");
    eprintln!("  --help                 Show this message");
    eprintln!();
    eprintln!("Environment: HF_TOKEN, HF_ENDPOINT, HF_ROUTER_URL");
}

fn value_of(flag: &str, argv: &mut impl Iterator<Item = String>) -> anyhow::Result<String> {
    argv.next()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut argv = std::env::args().skip(1);
    let mut model: Option<String> = None;
    let mut task: Option<InferenceTask> = None;
    let mut provider: Option<ProviderPolicy> = None;
    let mut endpoint_url: Option<String> = None;
    let mut inputs: Option<String> = None;
    let mut extra: Option<serde_json::Map<String, serde_json::Value>> = None;
    let mut send = false;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--send" => send = true,
            "--task" => {
                let name = value_of("--task", &mut argv)?;
                task = Some(
                    name.parse()
                        .map_err(|_| anyhow::anyhow!("Unknown task: {name}"))?,
                );
            }
            "--provider" => provider = Some(value_of("--provider", &mut argv)?.parse()?),
            "--endpoint-url" => endpoint_url = Some(value_of("--endpoint-url", &mut argv)?),
            "--inputs" => inputs = Some(value_of("--inputs", &mut argv)?),
            "--args" => {
                let raw = value_of("--args", &mut argv)?;
                extra = Some(
                    serde_json::from_str(&raw)
                        .map_err(|e| anyhow::anyhow!("--args must be a JSON object: {e}"))?,
                );
            }
            _ if arg.starts_with('-') => anyhow::bail!("Unknown option: {arg}"),
            _ => {
                if model.is_some() {
                    anyhow::bail!("Unexpected argument: {arg}");
                }
                model = Some(arg);
            }
        }
    }

    if model.is_none() && endpoint_url.is_none() && task.is_none() {
        print_usage();
        anyhow::bail!("Give a model, an endpoint URL, or a task");
    }

    let mut args = RequestArgs::new();
    if let Some(extra) = extra {
        args = args.json(extra);
    }
    if let Some(model) = model {
        args = args.model(model);
    }
    if let Some(url) = endpoint_url {
        args = args.endpoint_url(url);
    }
    if let Some(provider) = provider {
        args = args.provider(provider);
    }
    if let Some(inputs) = inputs {
        args = args.inputs(inputs);
    }

    let client = InferenceClient::from_env()?;
    let options = Options::default();
    let (provider, _) = client.provider_helper(&args, task, &options).await?;
    let resolved = client.make_request_options(&args, task, &options).await?;

    let snapshot = HttpRequestSnapshot::new(&resolved.url, resolved.init.method.as_str())
        .with_headers(&resolved.init.headers)
        .with_body(resolved.init.body.as_ref().and_then(Body::as_json));
    let body = match (&snapshot.body, &resolved.init.body) {
        (Some(json), _) => json.clone(),
        (None, Some(body)) => serde_json::json!(format!("<{} bytes>", body.to_bytes().len())),
        (None, None) => serde_json::Value::Null,
    };
    let report = serde_json::json!({
        "provider": provider.as_str(),
        "task": task.map(|t| t.as_str()),
        "url": snapshot.url,
        "method": snapshot.method,
        "headers": snapshot.headers,
        "body": body,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if send {
        let output = client.request(&args, task, &options).await?;
        println!("{}", serde_json::to_string_pretty(&output.into_json())?);
    }
    Ok(())
}
