//! Splicing steps into an already registered pipeline.

use stepwise_lib::{Graph, NodeStatus, execute};

use super::common::{Append, TestEnv, read};

#[tokio::test]
async fn prepend_runs_between_a_step_and_its_dependencies() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let source = env.source();
  let graph = Graph::define(move |graph| {
    graph.add_source("S", source)?;
    graph.add_step("A", Append("bar"), ["S"])?;
    graph.add_step("B", Append("qux"), ["A"])?;
    graph.prepend_step("B", "mid", Append("baz"))?;
    Ok(())
  })
  .unwrap();

  let result = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&result.folder("B").unwrap().join("value")), "foobarbazqux");
  for name in ["A", "mid", "B"] {
    assert_eq!(result.status(name), Some(NodeStatus::Executed), "{name}");
  }
}

#[tokio::test]
async fn append_redirects_existing_dependents() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let source = env.source();
  let graph = Graph::define(move |graph| {
    graph.add_source("S", source)?;
    graph.add_step("A", Append("bar"), ["S"])?;
    graph.add_step("B", Append("qux"), ["A"])?;
    graph.append_step("A", "A-inner", Append("-post"))?;
    Ok(())
  })
  .unwrap();

  let result = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&result.folder("A-inner").unwrap().join("value")), "foobar");
  assert_eq!(read(&result.folder("A").unwrap().join("value")), "foobar-post");
  assert_eq!(read(&result.folder("B").unwrap().join("value")), "foobar-postqux");
}

#[tokio::test]
async fn replace_keeps_dependency_edges() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let source = env.source();
  let graph = Graph::define(move |graph| {
    graph.add_source("S", source)?;
    graph.add_step("A", Append("bar"), ["S"])?;
    graph.replace_step("A", Append("BAR"))?;
    Ok(())
  })
  .unwrap();

  let result = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&result.folder("A").unwrap().join("value")), "fooBAR");
}
