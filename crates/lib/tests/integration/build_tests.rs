//! Incremental execution: idempotence, change propagation, atomicity, drift.

use std::fs;

use stepwise_lib::execute::{NodeError, NodeStore};
use stepwise_lib::{BuildEvent, ExecuteError, Graph, HashAlgorithm, Identity, NodeStatus, execute};

use super::common::{Append, FailAfterWrite, Recorder, ReusePrevious, TestEnv, read};

fn foobarqux(env: &TestEnv) -> Graph {
  let source = env.source();
  Graph::define(move |graph| {
    graph.add_source("S", source)?;
    graph.add_step("A", Append("bar"), ["S"])?;
    graph.add_step("B", Append("qux"), ["A"])?;
    Ok(())
  })
  .unwrap()
}

#[tokio::test]
async fn second_run_skips_everything() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let graph = foobarqux(&env);

  let first = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&first.folder("B").unwrap().join("value")), "foobarqux");
  assert_eq!(first.names_with(NodeStatus::Executed), vec!["A", "B"]);

  let second = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(second.names_with(NodeStatus::Skipped), vec!["A", "B"]);
  assert_eq!(second.count(NodeStatus::Executed), 0);
  assert_eq!(read(&second.folder("B").unwrap().join("value")), "foobarqux");
  assert_eq!(second.get("B").unwrap().checksums, first.get("B").unwrap().checksums);
}

#[tokio::test]
async fn source_change_reruns_only_its_dependents() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  env.write_file("other/value", "x");
  let source = env.source();
  let other = env.temp.path().join("other");
  let graph = Graph::define(move |graph| {
    graph.add_source("S", source)?;
    graph.add_source("T", other)?;
    graph.add_step("A", Append("bar"), ["S"])?;
    graph.add_step("B", Append("qux"), ["A"])?;
    graph.add_step("C", Append("y"), ["T"])?;
    Ok(())
  })
  .unwrap();

  execute(&graph, &env.config()).await.unwrap();
  env.write_file("src/value", "fox");

  let rerun = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(rerun.names_with(NodeStatus::Executed), vec!["A", "B"]);
  assert_eq!(rerun.names_with(NodeStatus::Skipped), vec!["C"]);
  assert_eq!(read(&rerun.folder("B").unwrap().join("value")), "foxbarqux");
}

#[tokio::test]
async fn failed_step_keeps_published_output() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let source = env.source();
  let good = Graph::define({
    let source = source.clone();
    move |graph| {
      graph.add_source("S", source)?;
      graph.add_step("A", Append("bar"), ["S"])?;
      Ok(())
    }
  })
  .unwrap();
  let published = execute(&good, &env.config()).await.unwrap();
  let output = published.folder("A").unwrap().to_path_buf();

  let bad = Graph::define(move |graph| {
    graph.add_source("S", source)?;
    graph.add_step("A", FailAfterWrite, ["S"])?;
    Ok(())
  })
  .unwrap();
  let err = execute(&bad, &env.config()).await.unwrap_err();

  assert_eq!(err.to_string(), "failed to build A");
  assert!(matches!(err, ExecuteError::Node { source: NodeError::Step(_), .. }));
  assert_eq!(read(&output.join("value")), "foobar");

  let store = NodeStore::new(&env.root(), &Identity::parse("A").unwrap());
  let leftovers = fs::read_dir(store.dir())
    .unwrap()
    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
    .filter(|name| name.starts_with(".next-"))
    .count();
  assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn tampered_output_is_rebuilt() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let graph = foobarqux(&env);

  let first = execute(&graph, &env.config()).await.unwrap();
  fs::write(first.folder("B").unwrap().join("value"), "tampered").unwrap();

  let second = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(second.status("A"), Some(NodeStatus::Skipped));
  assert_eq!(second.status("B"), Some(NodeStatus::Executed));
  assert_eq!(read(&second.folder("B").unwrap().join("value")), "foobarqux");
}

#[tokio::test]
async fn reuse_needs_a_previous_output() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let source = env.source();
  let graph = Graph::define(move |graph| {
    graph.add_source("S", source)?;
    graph.add_step("keep", ReusePrevious, ["S"])?;
    Ok(())
  })
  .unwrap();

  let err = execute(&graph, &env.config()).await.unwrap_err();
  assert_eq!(err.identity().map(Identity::as_str), Some("keep"));
  assert!(matches!(
    err,
    ExecuteError::Node {
      source: NodeError::ReuseWithoutPrevious,
      ..
    }
  ));
}

#[tokio::test]
async fn events_follow_each_node() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let graph = foobarqux(&env);
  let recorder = Recorder::default();
  let config = recorder.attach(env.config());

  execute(&graph, &config).await.unwrap();
  execute(&graph, &config).await.unwrap();

  let events = recorder.events();
  let skipped: Vec<_> = events
    .iter()
    .filter(|event| matches!(event, BuildEvent::Skipped { .. }))
    .map(|event| event.identity().to_string())
    .collect();
  assert_eq!(skipped.len(), 2);
  assert!(skipped.contains(&"A".to_string()) && skipped.contains(&"B".to_string()));

  // Every node starts before it finishes.
  for identity in ["S", "A", "B"] {
    let positions: Vec<_> = events
      .iter()
      .enumerate()
      .filter(|(_, event)| event.identity().as_str() == identity)
      .map(|(index, event)| (index, matches!(event, BuildEvent::Started { .. })))
      .collect();
    assert_eq!(positions.len(), 4);
    assert!(positions[0].1 && !positions[1].1 && positions[2].1 && !positions[3].1);
  }
}

#[tokio::test]
async fn size_hash_ignores_same_length_edits() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let graph = foobarqux(&env);
  let config = env.config().with_hash(HashAlgorithm::Size);

  execute(&graph, &config).await.unwrap();
  env.write_file("src/value", "fox");
  let same_size = execute(&graph, &config).await.unwrap();
  assert_eq!(same_size.names_with(NodeStatus::Skipped), vec!["A", "B"]);

  env.write_file("src/value", "foxes");
  let longer = execute(&graph, &config).await.unwrap();
  assert_eq!(longer.names_with(NodeStatus::Executed), vec!["A", "B"]);
  assert_eq!(read(&longer.folder("B").unwrap().join("value")), "foxesbarqux");
}
