//! The script engine: OXC lowering plus a tree-walking async
//! interpreter with budgets.

mod ast;
mod builtins;
mod interp;
mod lower;
mod value;

pub use builtins::sanitize_identifier;
pub use interp::{Engine, Interrupt};
pub use lower::{lower, LowerError};
pub use value::Value;

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use islet_core::{ErrorKind, ErrorRecord, ToolDescriptor};
    use serde_json::{json, Value as Json};

    use crate::broker::HostServices;
    use crate::protocol::{BindingSurface, EngineLimits, FsOperation};

    use super::*;

    #[derive(Default)]
    struct MockServices {
        logs: Mutex<Vec<String>>,
        tool_calls: Mutex<Vec<(String, Json)>>,
        violations: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HostServices for MockServices {
        async fn tool_call(&self, qualified_name: &str, params: Json) -> Result<Json, ErrorRecord> {
            self.tool_calls
                .lock()
                .unwrap()
                .push((qualified_name.to_string(), params.clone()));
            match qualified_name {
                "github:get_issue" => Ok(json!({"id": 1, "title": "a bug"})),
                "flaky:boom" => Err(ErrorRecord::new(ErrorKind::Downstream, "tool exploded")
                    .with_source("flaky:boom")),
                _ => Ok(Json::Null),
            }
        }

        async fn binding_call(
            &self,
            binding: &str,
            method: &str,
            _args: Json,
        ) -> Result<Json, ErrorRecord> {
            Ok(json!({ "binding": binding, "method": method }))
        }

        async fn network_call(
            &self,
            url: &str,
            method: &str,
            _headers: Option<std::collections::BTreeMap<String, String>>,
            _body: Option<String>,
        ) -> Result<Json, ErrorRecord> {
            if url.contains("blocked") {
                return Err(ErrorRecord::new(ErrorKind::PolicyDenied, "denied by policy"));
            }
            Ok(json!({"status": 200, "status_text": "OK", "headers": {}, "body": format!("{method} {url}")}))
        }

        async fn fs_call(&self, operation: FsOperation) -> Result<Json, ErrorRecord> {
            match operation {
                FsOperation::Read { path } => Ok(json!(format!("contents of {path}"))),
                FsOperation::Exists { .. } => Ok(json!(true)),
                _ => Ok(Json::Null),
            }
        }

        fn log(&self, line: String) {
            self.logs.lock().unwrap().push(line);
        }

        fn security_violation(&self, description: String) {
            self.violations.lock().unwrap().push(description);
        }
    }

    async fn run(code: &str) -> (Option<Json>, Vec<String>, Option<ErrorRecord>) {
        run_with(code, EngineLimits::default()).await
    }

    async fn run_with(
        code: &str,
        limits: EngineLimits,
    ) -> (Option<Json>, Vec<String>, Option<ErrorRecord>) {
        let services = Arc::new(MockServices::default());
        let engine = Engine::new(services, limits);
        let program = lower(code).expect("lowering failed");
        let tools = vec![
            ToolDescriptor::new("github", "get_issue"),
            ToolDescriptor::new("flaky", "boom"),
        ];
        let bindings = vec![BindingSurface {
            name: "jira".into(),
            methods: vec!["search".into()],
        }];
        engine.run(&program, &tools, &bindings).await
    }

    #[tokio::test]
    async fn test_arithmetic_and_return() {
        let (value, _, error) = run("const x = 2 + 3 * 4;\nreturn x;").await;
        assert!(error.is_none());
        assert_eq!(value, Some(json!(14.0)));
    }

    #[tokio::test]
    async fn test_no_return_yields_no_value() {
        let (value, _, error) = run("const x = 1;").await;
        assert!(error.is_none());
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_console_log_order() {
        let (_, logs, error) = run(
            r#"console.log("first", 1);
               console.log("second");
               console.error("third");"#,
        )
        .await;
        assert!(error.is_none());
        assert_eq!(logs, vec!["first 1", "second", "third"]);
    }

    #[tokio::test]
    async fn test_tool_call_roundtrip() {
        let (value, _, error) =
            run("const issue = await github.get_issue({ id: 1 });\nreturn issue.title;").await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("a bug")));
    }

    #[tokio::test]
    async fn test_binding_call() {
        let (value, _, error) = run(
            r#"const r = await jira.search({ q: "x" });
               return r.method;"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("search")));
    }

    #[tokio::test]
    async fn test_fetch_roundtrip() {
        let (value, _, error) = run(
            r#"const resp = await fetch("https://api.example.com/v1");
               return resp.body;"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("GET https://api.example.com/v1")));
    }

    #[tokio::test]
    async fn test_policy_denial_is_catchable() {
        let (value, _, error) = run(
            r#"try {
                 await fetch("https://blocked.invalid/");
                 return "unreachable";
               } catch (e) {
                 return e.kind + ": " + e.message;
               }"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("policy_denied: denied by policy")));
    }

    #[tokio::test]
    async fn test_uncaught_tool_error_carries_source() {
        let (_, _, error) = run("await flaky.boom({});").await;
        let error = error.expect("terminal error");
        assert_eq!(error.kind, ErrorKind::Downstream);
        assert_eq!(error.source.as_deref(), Some("flaky:boom"));
    }

    #[tokio::test]
    async fn test_forbidden_property_blocked_and_reported() {
        let services = Arc::new(MockServices::default());
        let engine = Engine::new(services.clone(), EngineLimits::default());
        // The static analyzer would reject this; the engine is the
        // runtime backstop for anything that slips through.
        let program = lower(r#"const o = {}; const c = o["__pro" + "to__"]; return c;"#)
            .expect("lowering failed");
        let (_, _, error) = engine.run(&program, &[], &[]).await;
        assert!(error.is_some());
        assert_eq!(services.violations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_instruction_budget_enforced() {
        let limits = EngineLimits {
            instruction_budget: 1_000,
            ..EngineLimits::default()
        };
        let (_, _, error) = run_with("while (true) { const x = 1; }", limits).await;
        let error = error.expect("budget error");
        assert_eq!(error.kind, ErrorKind::ResourceExhaustion);
    }

    #[tokio::test]
    async fn test_call_depth_enforced() {
        let (_, _, error) = run("function f(n) { return f(n + 1); }\nreturn f(0);").await;
        let error = error.expect("depth error");
        assert_eq!(error.kind, ErrorKind::ResourceExhaustion);
    }

    #[tokio::test]
    async fn test_closures_and_array_methods() {
        let (value, _, error) = run(
            r#"const xs = [1, 2, 3, 4];
               const doubled = xs.map(x => x * 2);
               const big = doubled.filter(x => x > 4);
               return big.join("-");"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("6-8")));
    }

    #[tokio::test]
    async fn test_for_of_and_conditionals() {
        let (value, _, error) = run(
            r#"let total = 0;
               for (const n of [1, 2, 3, 4, 5]) {
                 if (n % 2 === 0) { continue; }
                 total += n;
               }
               return total;"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!(9.0)));
    }

    #[tokio::test]
    async fn test_files_namespace_brokered() {
        let (value, _, error) = run(
            r#"const text = await files.readFile("notes.txt");
               return text;"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("contents of notes.txt")));
    }

    #[tokio::test]
    async fn test_json_and_template_literals() {
        let (value, _, error) = run(
            r#"const obj = JSON.parse('{"n": 2}');
               return `n is ${obj.n + 1}`;"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("n is 3")));
    }

    #[tokio::test]
    async fn test_throw_and_finally() {
        let (value, logs, error) = run(
            r#"try {
                 throw { message: "boom", kind: "downstream" };
               } catch (e) {
                 console.log("caught " + e.message);
               } finally {
                 console.log("cleanup");
               }
               return "done";"#,
        )
        .await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("done")));
        assert_eq!(logs, vec!["caught boom", "cleanup"]);
    }

    #[tokio::test]
    async fn test_result_must_be_serializable() {
        let (value, _, error) = run("return () => 1;").await;
        assert!(value.is_none());
        assert!(error.expect("error").message.contains("not serializable"));
    }

    #[tokio::test]
    async fn test_sanitized_namespace_surface() {
        let services = Arc::new(MockServices::default());
        let engine = Engine::new(services.clone(), EngineLimits::default());
        let tools = vec![ToolDescriptor::new("my-server", "do:thing")];
        let program = lower("return typeof my_server.do_thing;").expect("lowering failed");
        let (value, _, error) = engine.run(&program, &tools, &[]).await;
        assert!(error.is_none(), "{error:?}");
        assert_eq!(value, Some(json!("function")));
    }
}
