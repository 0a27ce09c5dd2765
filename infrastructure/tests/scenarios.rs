//! End-to-end scenarios: real sessions over in-memory pipes (and, on unix,
//! a real child process) driven by a scripted LLM adapter.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex, split};
use tokio_util::sync::CancellationToken;
use wrp_application::{AdapterError, ExecutionParams, LlmAdapter, Orchestrator, ToolRegistry};
use wrp_domain::{
    AdapterReply, AdvertisedTool, Conversation, ProviderKind, ToolCall, ToolFailure, ToolOutput,
    Turn,
};
use wrp_infrastructure::{
    Framing, Gateway, ProcessSupervisor, ServerResolver, ServerSpec, SessionOptions,
    SupervisorOptions, Transport,
};

// ==================== Fake MCP server ====================

enum Reply {
    Result(Value),
    /// Bytes written verbatim instead of a response
    Raw(&'static str),
}

type Handler = Arc<dyn Fn(&str, &Map<String, Value>) -> Reply + Send + Sync>;

#[derive(Default)]
struct Stats {
    list_calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

fn text_result(text: impl Into<String>) -> Reply {
    Reply::Result(json!({"content": [{"type": "text", "text": text.into()}]}))
}

fn tool(name: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": {"type": "object", "properties": properties, "required": required},
    })
}

/// Answer newline-delimited JSON-RPC until the client hangs up.
async fn serve(
    name: &'static str,
    stream: DuplexStream,
    tools: Vec<Value>,
    stats: Arc<Stats>,
    handler: Handler,
) {
    let (read, mut write) = split(stream);
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let message: Value = serde_json::from_str(&line).unwrap();
        let Some(id) = message.get("id").cloned() else {
            continue;
        };
        let reply = match message["method"].as_str().unwrap_or_default() {
            "initialize" => Reply::Result(json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": name, "version": "1.0.0"},
            })),
            "tools/list" => {
                stats.list_calls.fetch_add(1, Ordering::SeqCst);
                Reply::Result(json!({"tools": tools}))
            }
            "tools/call" => {
                let tool = message["params"]["name"].as_str().unwrap_or_default().to_string();
                let args = message["params"]["arguments"]
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                stats.log.lock().unwrap().push(format!("start {name}:{tool}"));
                if let Some(ms) = args.get("delay_ms").and_then(|v| v.as_u64()) {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                stats.log.lock().unwrap().push(format!("end {name}:{tool}"));
                handler(&tool, &args)
            }
            _ => Reply::Result(json!({})),
        };

        let bytes = match reply {
            Reply::Result(result) => {
                format!("{}\n", json!({"jsonrpc": "2.0", "id": id, "result": result}))
            }
            Reply::Raw(raw) => raw.to_string(),
        };
        if write.write_all(bytes.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Start a fake server and return the client end as a transport.
fn fake_server(
    name: &'static str,
    tools: Vec<Value>,
    handler: Handler,
) -> (Transport, Arc<Stats>, tokio::task::JoinHandle<()>) {
    let (client, server) = duplex(64 * 1024);
    let stats = Arc::new(Stats::default());
    let task = tokio::spawn(serve(name, server, tools, Arc::clone(&stats), handler));
    let (read, write) = split(client);
    (
        Transport::new(read, write, Framing::NewlineDelimited),
        stats,
        task,
    )
}

fn echo_handler() -> Handler {
    Arc::new(|tool, args| match tool {
        "ping" => text_result(args.get("x").map(|x| x.to_string()).unwrap_or_default()),
        _ => text_result(Value::Object(args.clone()).to_string()),
    })
}

fn gateway() -> Gateway {
    let supervisor = ProcessSupervisor::new(
        ServerResolver::new(Vec::<ServerSpec>::new()),
        SupervisorOptions::default(),
    );
    let registry = Arc::new(ToolRegistry::new(Duration::from_secs(5)));
    Gateway::new(supervisor, registry, SessionOptions::default())
}

// ==================== Scripted adapter ====================

struct ScriptedAdapter {
    kind: ProviderKind,
    replies: Mutex<VecDeque<AdapterReply>>,
    seen: Mutex<Vec<Conversation>>,
    advertised: Mutex<Vec<Vec<String>>>,
}

impl ScriptedAdapter {
    fn new(kind: ProviderKind, replies: Vec<AdapterReply>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            advertised: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[AdvertisedTool],
    ) -> Result<AdapterReply, AdapterError> {
        self.seen.lock().unwrap().push(conversation.clone());
        self.advertised
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| AdapterReply::text("done")))
    }
}

fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name).with_arguments(args.as_object().cloned().unwrap_or_default())
}

fn tool_results(conversation: &Conversation) -> Vec<(String, ToolOutput)> {
    conversation
        .turns()
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult(r) => Some((r.call_id.clone(), r.output.clone())),
            _ => None,
        })
        .collect()
}

fn params() -> ExecutionParams {
    ExecutionParams::default()
        .with_retry_base_delay(Duration::from_millis(1))
        .with_tool_call_timeout(Duration::from_secs(5))
}

fn ping_tool() -> Vec<Value> {
    vec![tool("ping", json!({"x": {"type": "integer"}}), &["x"])]
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_echo_ping_round_trip() {
    let gateway = gateway();
    let (transport, _stats, _task) = fake_server("Echo", ping_tool(), echo_handler());
    gateway.attach("Echo", transport).await.unwrap();

    let adapter = ScriptedAdapter::new(
        ProviderKind::OpenAi,
        vec![
            AdapterReply::tool_calls(None, vec![call("c1", "ping", json!({"x": 7}))]),
            AdapterReply::text("The server answered 7."),
        ],
    );
    let mut orchestrator =
        Orchestrator::new(adapter.clone(), Arc::clone(gateway.registry())).with_params(params());

    let answer = orchestrator
        .run("ping 7", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(answer, "The server answered 7.");
    assert_eq!(
        tool_results(orchestrator.conversation()),
        vec![("c1".to_string(), ToolOutput::success("7"))]
    );
    assert_eq!(adapter.advertised.lock().unwrap()[0], vec!["ping".to_string()]);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_call_on_terminated_session_fails_fast() {
    let gateway = gateway();
    let (transport, _stats, task) = fake_server("Echo", ping_tool(), echo_handler());
    let server = gateway.attach("Echo", transport).await.unwrap();

    // Server goes away after discovery.
    task.abort();
    for _ in 0..100 {
        if !server.session().is_ready() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!server.session().is_ready());

    let adapter = ScriptedAdapter::new(
        ProviderKind::Anthropic,
        vec![AdapterReply::tool_calls(None, vec![call("c1", "Echo__ping", json!({"x": 1}))])],
    );
    let mut orchestrator =
        Orchestrator::new(adapter, Arc::clone(gateway.registry())).with_params(params());

    let answer = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.run("ping 1", &CancellationToken::new()),
    )
    .await
    .expect("call on a closed session must not hang")
    .unwrap();
    assert_eq!(answer, "done");

    let results = tool_results(orchestrator.conversation());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1.failure, Some(ToolFailure::SessionClosed));
}

#[tokio::test]
async fn test_calls_to_two_servers_in_one_turn() {
    let gateway = gateway();
    let (alpha_transport, alpha, _a) = fake_server(
        "alpha",
        vec![tool("status", json!({"delay_ms": {"type": "integer"}}), &[])],
        Arc::new(|_, _| text_result("alpha idle")),
    );
    let (beta_transport, beta, _b) = fake_server(
        "beta",
        vec![tool("queue", json!({"delay_ms": {"type": "integer"}}), &[])],
        Arc::new(|_, _| text_result("beta: 3 jobs")),
    );
    gateway.attach("alpha", alpha_transport).await.unwrap();
    gateway.attach("beta", beta_transport).await.unwrap();

    let adapter = ScriptedAdapter::new(
        ProviderKind::Gemini,
        vec![
            AdapterReply::tool_calls(
                Some("Checking both.".into()),
                vec![
                    call("a", "status", json!({"delay_ms": 100})),
                    call("b", "queue", json!({"delay_ms": 100})),
                ],
            ),
            AdapterReply::text("alpha is idle and beta has 3 jobs"),
        ],
    );
    let mut orchestrator =
        Orchestrator::new(adapter.clone(), Arc::clone(gateway.registry())).with_params(params());

    let started = std::time::Instant::now();
    orchestrator
        .run("status of both", &CancellationToken::new())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(190));

    assert_eq!(
        alpha.log.lock().unwrap().as_slice(),
        ["start alpha:status", "end alpha:status"]
    );
    assert_eq!(
        beta.log.lock().unwrap().as_slice(),
        ["start beta:queue", "end beta:queue"]
    );

    // Both results are in the history the adapter sees next.
    let seen = adapter.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        tool_results(&seen[1]),
        vec![
            ("a".to_string(), ToolOutput::success("alpha idle")),
            ("b".to_string(), ToolOutput::success("beta: 3 jobs")),
        ]
    );
}

#[tokio::test]
async fn test_malformed_frame_closes_only_that_session() {
    let gateway = gateway();
    let (broken_transport, _broken, _b) = fake_server(
        "broken",
        vec![tool("explode", json!({}), &[])],
        Arc::new(|_, _| Reply::Raw("{\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"cont\n")),
    );
    let (echo_transport, _echo, _e) = fake_server("Echo", ping_tool(), echo_handler());
    let broken = gateway.attach("broken", broken_transport).await.unwrap();
    let echo = gateway.attach("Echo", echo_transport).await.unwrap();

    let adapter = ScriptedAdapter::new(
        ProviderKind::OpenAi,
        vec![
            AdapterReply::tool_calls(None, vec![call("c1", "explode", json!({}))]),
            AdapterReply::tool_calls(None, vec![call("c2", "ping", json!({"x": 5}))]),
            AdapterReply::text("ok"),
        ],
    );
    let mut orchestrator =
        Orchestrator::new(adapter, Arc::clone(gateway.registry())).with_params(params());
    orchestrator
        .run("break one", &CancellationToken::new())
        .await
        .unwrap();

    let results = tool_results(orchestrator.conversation());
    assert_eq!(results[0].1.failure, Some(ToolFailure::SessionClosed));
    assert_eq!(results[1].1, ToolOutput::success("5"));

    assert!(!broken.session().is_ready());
    assert!(
        broken
            .session()
            .close_reason()
            .unwrap()
            .contains("protocol error")
    );
    assert!(echo.session().is_ready());
}

#[tokio::test]
async fn test_switching_provider_reuses_discovered_tools() {
    let gateway = gateway();
    let (transport, stats, _task) = fake_server("Echo", ping_tool(), echo_handler());
    gateway.attach("Echo", transport).await.unwrap();
    assert_eq!(stats.list_calls.load(Ordering::SeqCst), 1);

    let first = ScriptedAdapter::new(
        ProviderKind::OpenAi,
        vec![
            AdapterReply::tool_calls(None, vec![call("c1", "ping", json!({"x": 1}))]),
            AdapterReply::text("1"),
        ],
    );
    let mut orchestrator =
        Orchestrator::new(first, Arc::clone(gateway.registry())).with_params(params());
    orchestrator.run("ping 1", &CancellationToken::new()).await.unwrap();

    // Switch backend, carrying the history over.
    let second = ScriptedAdapter::new(
        ProviderKind::Ollama,
        vec![
            AdapterReply::tool_calls(None, vec![call("c2", "ping", json!({"x": 2}))]),
            AdapterReply::text("2"),
        ],
    );
    let history = orchestrator.into_conversation();
    let mut orchestrator = Orchestrator::new(second.clone(), Arc::clone(gateway.registry()))
        .with_params(params())
        .with_conversation(history);
    orchestrator.run("ping 2", &CancellationToken::new()).await.unwrap();

    assert_eq!(stats.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.advertised.lock().unwrap()[0], vec!["ping".to_string()]);
    assert_eq!(tool_results(orchestrator.conversation()).len(), 2);
}

#[cfg(unix)]
mod process {
    use super::*;

    /// A minimal MCP server in POSIX shell: one `ping` tool echoing `x`.
    const ECHO_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"Echo","version":"1.0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"ping","description":"Echo x","inputSchema":{"type":"object","properties":{"x":{"type":"integer"}},"required":["x"]}}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      x=$(printf '%s' "$line" | sed -n 's/.*"x":\(-\{0,1\}[0-9]*\).*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$x" ;;
  esac
done
"#;

    #[tokio::test]
    async fn test_echo_ping_over_child_process() {
        let spec =
            ServerSpec::named("Echo").with_command("sh", vec!["-c".into(), ECHO_SERVER.into()]);
        let supervisor = ProcessSupervisor::new(
            ServerResolver::new([spec]),
            SupervisorOptions::default().with_grace_period(Duration::from_millis(500)),
        );
        let registry = Arc::new(ToolRegistry::new(Duration::from_secs(5)));
        let gateway = Gateway::new(supervisor, Arc::clone(&registry), SessionOptions::default());

        let report = gateway.connect_all().await;
        assert_eq!(report.connected, vec!["Echo".to_string()]);

        let adapter = ScriptedAdapter::new(
            ProviderKind::Anthropic,
            vec![
                AdapterReply::tool_calls(None, vec![call("c1", "ping", json!({"x": 7}))]),
                AdapterReply::text("7"),
            ],
        );
        let mut orchestrator = Orchestrator::new(adapter, registry).with_params(params());
        orchestrator.run("ping 7", &CancellationToken::new()).await.unwrap();

        assert_eq!(
            tool_results(orchestrator.conversation()),
            vec![("c1".to_string(), ToolOutput::success("7"))]
        );

        gateway.shutdown().await;
        assert!(gateway.server("Echo").is_none());
    }
}
