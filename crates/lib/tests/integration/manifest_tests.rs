//! Graph files driving the built-in steps.

use stepwise_lib::{ExecuteConfig, NodeStatus, execute, manifest};

use super::common::{TestEnv, read};

const COPY_GRAPH: &str = r#"{
  "nodes": [
    { "kind": "source", "id": "docs", "path": "docs" },
    { "kind": "source", "id": "assets", "path": "assets" },
    {
      "kind": "step",
      "id": "site",
      "dependencies": ["docs", "assets"],
      "step": { "type": "copy" }
    }
  ]
}"#;

#[tokio::test]
async fn copy_step_merges_and_tracks_removals() {
  let env = TestEnv::new();
  env.write_file("graph.json", COPY_GRAPH);
  env.write_file("docs/index.md", "hello");
  env.write_file("docs/guide/intro.md", "intro");
  env.write_file("assets/logo.svg", "<svg/>");

  let graph = manifest::load(&env.temp.path().join("graph.json")).unwrap();
  let first = execute(&graph, &env.config()).await.unwrap();
  let site = first.folder("site").unwrap().to_path_buf();
  assert_eq!(read(&site.join("guide/intro.md")), "intro");
  assert_eq!(read(&site.join("logo.svg")), "<svg/>");

  std::fs::remove_file(env.temp.path().join("docs/guide/intro.md")).unwrap();
  env.write_file("docs/index.md", "hello again");
  let second = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(second.status("site"), Some(NodeStatus::Executed));
  assert_eq!(read(&site.join("index.md")), "hello again");
  assert!(!site.join("guide/intro.md").exists());
  assert_eq!(read(&site.join("logo.svg")), "<svg/>");

  let third = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(third.status("site"), Some(NodeStatus::Skipped));
}

#[tokio::test]
async fn incremental_copy_matches_a_full_rebuild() {
  let env = TestEnv::new();
  env.write_file(
    "graph.json",
    r#"{
      "nodes": [
        { "kind": "source", "id": "a", "path": "a" },
        { "kind": "source", "id": "b", "path": "b" },
        { "kind": "step", "id": "merge", "dependencies": ["a", "b"], "step": { "type": "copy" } }
      ]
    }"#,
  );
  env.write_file("a/f", "from-a");
  env.write_file("b/f", "from-b");
  env.write_file("b/only-b", "b");

  let graph = manifest::load(&env.temp.path().join("graph.json")).unwrap();
  let first = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&first.folder("merge").unwrap().join("f")), "from-b");

  env.write_file("a/f", "from-a-v2");
  env.write_file("a/only-b", "a");
  std::fs::remove_file(env.temp.path().join("b/only-b")).unwrap();
  let incremental = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(incremental.status("merge"), Some(NodeStatus::Executed));

  let fresh_root = env.temp.path().join("fresh-root");
  let full = execute(&graph, &ExecuteConfig::new(fresh_root)).await.unwrap();

  let merged = incremental.folder("merge").unwrap();
  let rebuilt = full.folder("merge").unwrap();
  assert_eq!(read(&merged.join("f")), "from-b");
  assert_eq!(read(&merged.join("only-b")), "a");
  assert_eq!(incremental.get("merge").unwrap().checksums, full.get("merge").unwrap().checksums);
  assert_eq!(read(&merged.join("f")), read(&rebuilt.join("f")));
}

#[cfg(unix)]
#[tokio::test]
async fn exec_steps_chain_through_placeholders() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  env.write_file(
    "graph.json",
    r#"{
      "nodes": [
        { "kind": "source", "id": "S", "path": "src" },
        {
          "kind": "step",
          "id": "A",
          "dependencies": [{ "id": "S", "as": "input" }],
          "step": { "type": "exec", "command": "printf '%s' \"$(cat $${dep:input}/value)bar\" > value" }
        },
        {
          "kind": "step",
          "id": "B",
          "dependencies": ["A"],
          "step": { "type": "exec", "command": "printf '%s' \"$(cat $${dep:A}/value)$SUFFIX\" > $${out}/value", "env": { "SUFFIX": "qux" } }
        }
      ]
    }"#,
  );

  let graph = manifest::load(&env.temp.path().join("graph.json")).unwrap();
  let first = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&first.folder("B").unwrap().join("value")), "foobarqux");

  let second = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(second.names_with(NodeStatus::Skipped), vec!["A", "B"]);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_command_names_the_step() {
  let env = TestEnv::new();
  env.write_file(
    "graph.json",
    r#"{ "nodes": [{ "kind": "step", "id": "broken", "step": { "type": "exec", "command": "exit 7" } }] }"#,
  );

  let graph = manifest::load(&env.temp.path().join("graph.json")).unwrap();
  let err = execute(&graph, &env.config()).await.unwrap_err();
  assert_eq!(err.to_string(), "failed to build broken");
  let chain = format!("{:?}", error_chain(&err));
  assert!(chain.contains("exit code Some(7)"), "{chain}");
}

fn error_chain(error: &dyn std::error::Error) -> Vec<String> {
  let mut chain = vec![error.to_string()];
  let mut source = error.source();
  while let Some(cause) = source {
    chain.push(cause.to_string());
    source = cause.source();
  }
  chain
}
