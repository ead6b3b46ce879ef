//! Modules, synonyms and export resolution, executed end to end.

use stepwise_lib::{Dependency, Graph, NodeStatus, RegistrationError, execute};

use super::common::{Append, TestEnv, read};

#[tokio::test]
async fn export_resolver_shapes_the_result() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let source = env.source();
  let graph = Graph::define(move |graph| {
    graph.add_source("source", source)?;
    graph.add_module_with_exports(
      "module",
      ["source"],
      |name| match name {
        "hidden" => None,
        "main" => Some(String::new()),
        "source" => Some("renamed/source".to_string()),
        other => Some(other.to_string()),
      },
      |module, _| {
        module.add_step("source", Append(""), ["../source"])?;
        module.add_step("hidden", Append("-hidden"), ["source"])?;
        module.add_step("main", Append("-main"), ["hidden"])?;
        Ok(())
      },
    )?;
    Ok(())
  })
  .unwrap();

  let result = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(
    result.nodes.keys().map(String::as_str).collect::<Vec<_>>(),
    ["module", "module/renamed/source", "source"]
  );
  assert_eq!(read(&result.folder("module").unwrap().join("value")), "foo-hidden-main");
  assert!(result.get("module/hidden").is_none());
}

#[test]
fn redundant_root_dependency_is_rejected() {
  let err = Graph::define(|graph| {
    graph.add_source("x/y", "unused")?;
    graph.add_step("step", Append(""), ["x/y", "x"])?;
    Ok(())
  })
  .unwrap_err();

  match err {
    RegistrationError::RedundantRootDependency { dependency, .. } => assert_eq!(dependency, "x"),
    other => panic!("expected a redundant root dependency, got {other}"),
  }
}

#[tokio::test]
async fn synonyms_key_the_step_arguments() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  env.write_file("second/value", "zzz");
  let source = env.source();
  let second = env.temp.path().join("second");
  let graph = Graph::define(move |graph| {
    graph.add_source("b-source", source)?;
    graph.add_source("a-source", second)?;
    // Arguments are read in key order, so the synonyms decide the order.
    graph.add_step(
      "step",
      Append("!"),
      [Dependency::on("b-source").alias("first"), Dependency::on("a-source").alias("second")],
    )?;
    Ok(())
  })
  .unwrap();

  let result = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&result.folder("step").unwrap().join("value")), "foozzz!");
}

#[tokio::test]
async fn nested_synonyms_stay_observed_across_runs() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  env.write_file("second/value", "zzz");
  let source = env.source();
  let second = env.temp.path().join("second");
  let graph = Graph::define(move |graph| {
    graph.add_source("b", source)?;
    graph.add_source("a", second)?;
    // `x/tmp` and `x` share a snapshot file-name prefix.
    graph.add_step("s", Append("!"), [("b", "x/tmp"), ("a", "x")])?;
    Ok(())
  })
  .unwrap();

  let first = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(first.status("s"), Some(NodeStatus::Executed));
  assert_eq!(read(&first.folder("s").unwrap().join("value")), "zzzfoo!");

  let second = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(second.status("s"), Some(NodeStatus::Skipped));
}

#[tokio::test]
async fn nested_modules_inherit_through_hops() {
  let env = TestEnv::new();
  env.write_file("src/value", "foo");
  let source = env.source();
  let graph = Graph::define(move |graph| {
    graph.add_source("source", source)?;
    graph.add_module("outer", ["source"], |outer, _| {
      outer.add_module("inner", ["../source"], |inner, _| {
        inner.add_step("step", Append("bar"), ["../../source"])?;
        Ok(())
      })
    })?;
    Ok(())
  })
  .unwrap();

  let first = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(read(&first.folder("outer/inner/step").unwrap().join("value")), "foobar");
  assert!(env.root().join("outer/inner/step/output/value").is_file());

  env.write_file("src/value", "baz");
  let second = execute(&graph, &env.config()).await.unwrap();
  assert_eq!(second.status("outer/inner/step"), Some(NodeStatus::Executed));
  assert_eq!(read(&second.folder("outer/inner/step").unwrap().join("value")), "bazbar");
}
