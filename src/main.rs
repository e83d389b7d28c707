use clap::{value_parser, Arg, ArgAction, Command};
use goalguard_kernel::clock::SystemClock;
use goalguard_kernel::collaborators::{InMemoryStateStore, InMemoryToolRegistry};
use goalguard_kernel::crv::validators::SchemaShapeValidator;
use goalguard_kernel::crv::{CrvGate, CrvGateConfig};
use goalguard_kernel::effort::{EffortEvaluator, ObservedMetrics};
use goalguard_kernel::executor::{IntegratedExecutor, IntegratedRequest};
use goalguard_kernel::idempotency::outbox::Outbox;
use goalguard_kernel::policy::PolicyGate;
use goalguard_kernel::telemetry::InMemoryTelemetry;
use goalguard_kernel::tool::{ToolExecutionContext, ToolWrapper};
use goalguard_kernel::types::{
    Action, CorrelationIds, Permission, Principal, PrincipalKind, RiskTier, StepId, TaskId, ToolSpec, WorkflowId,
};
use goalguard_kernel::{run_simulator, SimulatorConfig};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Command::new("goalguard-kernel")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Policy, CRV, idempotency, reliability, and reflexion kernel for agentic tool execution")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Run the randomized invariant simulator")
                .arg(
                    Arg::new("operations")
                        .long("ops")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop on the first invariant violation"),
                ),
        )
        .subcommand(Command::new("demo").about("Run seed scenarios S1-S3 against an in-memory kernel and print the trace"))
        .subcommand(Command::new("verify-audit").about("Replay a demo audit log and report its tamper status"));

    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let operations = *args.get_one::<u64>("operations").unwrap();
            let seed = *args.get_one::<u64>("seed").unwrap();
            let stop_on_violation = args.get_flag("stop-on-violation");

            println!("Running invariant simulator...");
            println!("Operations: {operations}");
            println!("Seed: {seed}");
            println!();

            let config = SimulatorConfig {
                seed,
                total_operations: operations,
                stop_on_first_violation: stop_on_violation,
                ..Default::default()
            };
            let report = run_simulator(&config);

            println!("Operations run: {}", report.operations_run);
            println!("Violations: {}", report.violations.len());
            for violation in &report.violations {
                println!("  [{}] {}", violation.operation_index, violation.description);
            }

            std::process::exit(if report.violations.is_empty() { 0 } else { 1 });
        }
        Some(("demo", _)) => run_demo().await,
        Some(("verify-audit", _)) => run_verify_audit(),
        _ => unreachable!("clap enforces a subcommand via arg_required_else_help"),
    }
}

fn new_gate() -> PolicyGate {
    PolicyGate::new(Arc::new(SystemClock), Arc::new(InMemoryTelemetry::new()))
}

fn correlation_ids() -> CorrelationIds {
    CorrelationIds {
        workflow_id: WorkflowId::new(),
        task_id: TaskId::new(),
        step_id: StepId::new(),
    }
}

/// Runs a few representative scenarios against a freshly wired in-memory
/// kernel: a low-risk read, a high-risk write gated on approval, and an
/// idempotent retry.
async fn run_demo() {
    println!("== S1: low-risk read succeeds end-to-end ==");
    {
        let policy = Arc::new(new_gate());
        let crv = Arc::new(CrvGate::new(
            vec![Box::new(SchemaShapeValidator::new(vec!["title".to_string()]))],
            CrvGateConfig::default(),
        ));
        let registry = Arc::new(InMemoryToolRegistry::new());
        let mut spec = ToolSpec::new("fetch-report", "Fetch report");
        spec.required_params = vec!["report_id".to_string()];
        registry.register(spec);
        let tool = Arc::new(ToolWrapper::new(registry));
        let telemetry = Arc::new(InMemoryTelemetry::new());

        let executor = IntegratedExecutor {
            effort: None,
            policy,
            crv,
            tool,
            telemetry: telemetry.clone(),
        };

        let principal = Principal::new(PrincipalKind::Human)
            .with_permission(Permission::new("read", "data"));
        let action = Action::new("read-report", RiskTier::Low).requiring(Permission::new("read", "data"));
        let ids = correlation_ids();
        let ctx = ToolExecutionContext {
            ids,
            telemetry: telemetry.clone(),
            outbox: None,
            cache: None,
        };

        let request = IntegratedRequest {
            principal: &principal,
            action: &action,
            tool_id: "fetch-report",
            params: json!({"report_id": "r42"}),
            ids,
            world_model_value_score: 0.8,
            observed_metrics: ObservedMetrics::default(),
        };

        let result = executor
            .execute(request, &ctx, |_params| async { Ok(json!({"title": "Q3"})) })
            .await
            .expect("low-risk read never returns a kernel error");

        println!("success={} data={:?}", result.success, result.data);
    }

    println!();
    println!("== S2: high-risk write gates for approval, then approves ==");
    {
        let gate = new_gate();
        let principal = Principal::new(PrincipalKind::Human).with_permission(Permission::new("write", "data"));
        let action = Action::new("delete-record", RiskTier::High);
        let decision = gate.evaluate(&principal, &action, None, None).unwrap();
        println!(
            "first evaluate: allowed={} requires_human_approval={}",
            decision.allowed, decision.requires_human_approval
        );
        let token = decision.approval_token.expect("HIGH risk always issues a token");
        println!("approve(token): {}", gate.approve(action.id, &token));
        println!("approve(same token again): {}", gate.approve(action.id, &token));
        println!("audit entries: {}", gate.audit.len());
    }

    println!();
    println!("== S3: idempotent retry replays without reinvoking the tool ==");
    {
        let registry = Arc::new(InMemoryToolRegistry::new());
        let mut spec = ToolSpec::new("post-payment", "Post payment");
        spec.required_params = vec!["amount".to_string(), "ref".to_string()];
        spec.has_side_effects = true;
        registry.register(spec);
        let tool = ToolWrapper::new(registry);
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let outbox = Arc::new(Outbox::new(Arc::new(InMemoryStateStore::new())));
        let ids = correlation_ids();
        let ctx = ToolExecutionContext {
            ids,
            telemetry: telemetry.clone(),
            outbox: Some(outbox),
            cache: None,
        };

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let params = json!({"amount": 100, "ref": "x"});

        let invoke = {
            let calls = calls.clone();
            move |_params: serde_json::Value| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!({"id": "p1"}))
                }
            }
        };
        let first = tool.execute("post-payment", params.clone(), &ctx, invoke.clone()).await;
        let second = tool.execute("post-payment", params, &ctx, invoke).await;

        println!("first: success={} data={:?}", first.success, first.data);
        println!("second (replay): success={} data={:?}", second.success, second.data);
        println!("tool invocations: {}", calls.load(std::sync::atomic::Ordering::SeqCst));
    }
}

fn run_verify_audit() {
    let gate = new_gate();
    let principal = Principal::new(PrincipalKind::Human).with_permission(Permission::new("read", "data"));
    let action = Action::new("read-report", RiskTier::Low).requiring(Permission::new("read", "data"));
    let _ = gate.evaluate(&principal, &action, None, None);

    let valid = gate.audit.verify_integrity();
    println!("entries: {}", gate.audit.len());
    println!("hash chain intact: {valid}");
    std::process::exit(if valid { 0 } else { 1 });
}
